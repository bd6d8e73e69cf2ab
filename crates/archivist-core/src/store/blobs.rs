//! Content writes and reads.

use std::io::{Read, Write};

use archivist_domain::timestamp::format_date_time;
use archivist_domain::FileEntry;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::*;
use crate::effects::FileSystem;

impl ArchiveStore {
    /// Stores `bytes` under `checksum` unless a blob with that checksum
    /// already exists, then binds the entry to it for every distribution in
    /// `distributions`. Runs in one committed transaction.
    ///
    /// An existing blob is trusted as-is; its size and payload are not
    /// compared against `bytes`.
    pub fn record_entry(
        &mut self,
        entry: &FileEntry,
        checksum: Checksum,
        bytes: &[u8],
        distributions: &[DistributionCode],
    ) -> Result<RecordOutcome> {
        let backend = self.backend;
        self.with_immediate_tx(|tx| {
            let (fileid, blob_created) = match find_blob(tx, checksum)? {
                Some(fileid) => (fileid, false),
                None => {
                    let created = insert_blob(tx, backend, checksum, bytes, entry.key())?;
                    let fileid =
                        find_blob(tx, checksum)?.ok_or(StoreError::MissingBlob { checksum })?;
                    (fileid, created)
                }
            };

            let date = entry.date().map(format_date_time);
            let mut memberships = Vec::with_capacity(distributions.len());
            for dist in distributions {
                let changed = tx
                    .execute(
                        "INSERT OR IGNORE INTO files(distribution, patch, path, date, fileid) \
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            dist.as_str(),
                            i64::from(entry.patch()),
                            entry.path(),
                            date,
                            fileid.0
                        ],
                    )
                    .with_context(|| {
                        format!("failed to record {} for distribution {dist}", entry.path())
                    })?;
                memberships.push((dist.clone(), changed > 0));
            }

            Ok(RecordOutcome {
                fileid,
                checksum,
                blob_created,
                memberships,
            })
        })
    }

    /// Returns the original bytes of a blob, inflating embedded payloads or
    /// reading external keys relative to `archive_root` through `fs`.
    pub fn read_blob(
        &self,
        fs: &dyn FileSystem,
        fileid: BlobId,
        archive_root: &Path,
    ) -> Result<Vec<u8>> {
        let row = self
            .conn
            .query_row(
                "SELECT uncompressed_size, data, key FROM filedata WHERE id = ?1",
                params![fileid.0],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<Vec<u8>>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()
            .context("failed to query blob")?;
        let Some((size, data, key)) = row else {
            return Err(StoreError::UnknownBlob(fileid).into());
        };

        match (data, key) {
            (Some(compressed), _) => {
                let mut bytes = Vec::with_capacity(usize::try_from(size).unwrap_or_default());
                ZlibDecoder::new(compressed.as_slice())
                    .read_to_end(&mut bytes)
                    .with_context(|| format!("failed to inflate blob {fileid}"))?;
                Ok(bytes)
            }
            (None, Some(key)) => {
                let path = archive_root.join(&key);
                fs.read(&path)
                    .with_context(|| format!("failed to read blob {fileid} from external key"))
            }
            (None, None) => Err(StoreError::EmptyBlob(fileid).into()),
        }
    }
}

fn insert_blob(
    conn: &Connection,
    backend: BackendKind,
    checksum: Checksum,
    bytes: &[u8],
    key: &str,
) -> Result<bool> {
    let (data, key) = match backend {
        BackendKind::Embedded => (Some(compress(bytes)?), None),
        BackendKind::External => (None, Some(key)),
    };
    let size = i64::try_from(bytes.len()).context("file too large to index")?;
    let changed = conn
        .execute(
            "INSERT OR IGNORE INTO filedata(checksum, uncompressed_size, data, key) \
             VALUES (?1, ?2, ?3, ?4)",
            params![i64::from(checksum.value()), size, data, key],
        )
        .with_context(|| format!("failed to insert blob {checksum}"))?;
    Ok(changed > 0)
}

fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
    encoder.write_all(bytes).context("failed to compress blob")?;
    encoder.finish().context("failed to compress blob")
}
