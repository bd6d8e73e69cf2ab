//! Membership history queries: snapshots, patch normalisation, carry-forward.

use archivist_domain::timestamp::parse_date_time;
use archivist_domain::Membership;

use super::*;

/// Latest membership per path at or below a patch threshold.
///
/// Ties on the patch number break on the smaller blob id. The primary key
/// makes such ties impossible within one distribution, but the order is
/// part of the query contract regardless.
const LATEST_PER_PATH: &str = "\
    SELECT path, patch, date, fileid, \
           ROW_NUMBER() OVER (PARTITION BY path ORDER BY patch DESC, fileid ASC) AS row_rank \
    FROM files \
    WHERE distribution = ?1 AND patch <= ?2";

/// One logical file of a distribution as of a patch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SnapshotFile {
    pub path: String,
    /// The patch that last changed this path.
    pub patch: u16,
    #[serde(with = "index_date_time::option")]
    pub date: Option<PrimitiveDateTime>,
    pub fileid: BlobId,
    pub checksum: Checksum,
    pub uncompressed_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DistributionStats {
    pub distribution: String,
    pub memberships: u64,
    pub paths: u64,
    pub latest_patch: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub blobs: u64,
    pub uncompressed_bytes: u64,
    pub embedded_bytes: u64,
    pub distributions: Vec<DistributionStats>,
}

impl ArchiveStore {
    /// The highest recorded patch of `distribution`, if it has any rows.
    pub fn latest_patch(&self, distribution: &DistributionCode) -> Result<Option<u16>> {
        let latest: Option<i64> = self
            .conn
            .query_row(
                "SELECT MAX(patch) FROM files WHERE distribution = ?1",
                params![distribution.as_str()],
                |row| row.get(0),
            )
            .context("failed to query latest patch")?;
        Ok(latest.map(to_patch))
    }

    /// The highest recorded patch of `distribution` at or below `patch`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingPatch`] when no such patch exists.
    pub fn normalize_patch(&self, distribution: &DistributionCode, patch: u16) -> Result<u16> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT MAX(patch) FROM files WHERE distribution = ?1 AND patch <= ?2",
                params![distribution.as_str(), i64::from(patch)],
                |row| row.get(0),
            )
            .context("failed to normalize patch")?;
        found.map(to_patch).ok_or_else(|| {
            StoreError::MissingPatch {
                distribution: distribution.clone(),
                patch,
            }
            .into()
        })
    }

    /// Every logical path of `distribution` as of `patch`, each with the
    /// content from its most recent patch at or below `patch`. Ordered by path.
    pub fn snapshot(
        &self,
        distribution: &DistributionCode,
        patch: u16,
    ) -> Result<Vec<SnapshotFile>> {
        let sql = format!(
            "SELECT f.path, f.patch, f.date, d.id, d.checksum, d.uncompressed_size, d.key \
             FROM ({LATEST_PER_PATH}) AS f \
             JOIN filedata d ON d.id = f.fileid \
             WHERE f.row_rank = 1 \
             ORDER BY f.path"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![distribution.as_str(), i64::from(patch)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, Option<String>>(6)?,
            ))
        })?;

        let mut files = Vec::new();
        for row in rows {
            let (path, patch, date, fileid, checksum, size, key) = row?;
            files.push(SnapshotFile {
                date: parse_stored_date(date.as_deref())?,
                path,
                patch: to_patch(patch),
                fileid: BlobId(fileid),
                checksum: stored_checksum(checksum),
                uncompressed_size: to_u64(size),
                key,
            });
        }
        Ok(files)
    }

    /// Projects `from`'s state as of `through` (default: its latest patch) as
    /// patch 0 of `to`.
    ///
    /// Existing patch-0 rows of `to` for a projected path are replaced, since
    /// the projection supersedes any earlier baseline. Paths that `from`
    /// never carried keep their existing rows. Returns the number of rows
    /// written; zero when `from` has no history.
    pub fn carry_forward(
        &mut self,
        from: &DistributionCode,
        to: &DistributionCode,
        through: Option<u16>,
    ) -> Result<usize> {
        let through = match through {
            Some(patch) => patch,
            None => match self.latest_patch(from)? {
                Some(patch) => patch,
                None => return Ok(0),
            },
        };
        let sql = format!(
            "INSERT INTO files(distribution, patch, path, date, fileid) \
             SELECT ?3, 0, path, date, fileid FROM ({LATEST_PER_PATH}) \
             WHERE row_rank = 1 \
             ON CONFLICT(distribution, patch, path) \
             DO UPDATE SET date = excluded.date, fileid = excluded.fileid"
        );
        self.with_immediate_tx(|tx| {
            tx.execute(
                &sql,
                params![from.as_str(), i64::from(through), to.as_str()],
            )
            .with_context(|| format!("failed to carry {from} forward into {to}"))
        })
    }

    /// All membership rows of a distribution ordered by patch, then path.
    pub fn memberships(&self, distribution: &DistributionCode) -> Result<Vec<Membership>> {
        let mut stmt = self.conn.prepare(
            "SELECT patch, path, date, fileid FROM files \
             WHERE distribution = ?1 ORDER BY patch, path",
        )?;
        let rows = stmt.query_map(params![distribution.as_str()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        let mut memberships = Vec::new();
        for row in rows {
            let (patch, path, date, fileid) = row?;
            memberships.push(Membership {
                distribution: distribution.clone(),
                patch: to_patch(patch),
                path,
                date: parse_stored_date(date.as_deref())?,
                fileid: BlobId(fileid),
            });
        }
        Ok(memberships)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let (blobs, uncompressed, embedded): (i64, i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(uncompressed_size), 0), \
                    COALESCE(SUM(LENGTH(data)), 0) \
             FROM filedata",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT distribution, COUNT(*), COUNT(DISTINCT path), MAX(patch) \
             FROM files GROUP BY distribution ORDER BY distribution",
        )?;
        let distributions = stmt
            .query_map([], |row| {
                Ok(DistributionStats {
                    distribution: row.get(0)?,
                    memberships: to_u64(row.get(1)?),
                    paths: to_u64(row.get(2)?),
                    latest_patch: to_patch(row.get(3)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(StoreStats {
            blobs: to_u64(blobs),
            uncompressed_bytes: to_u64(uncompressed),
            embedded_bytes: to_u64(embedded),
            distributions,
        })
    }
}

fn parse_stored_date(value: Option<&str>) -> Result<Option<PrimitiveDateTime>> {
    value
        .map(|text| {
            parse_date_time(text).with_context(|| format!("invalid date '{text}' in archive index"))
        })
        .transpose()
}

fn stored_checksum(value: i64) -> Checksum {
    Checksum::from_value(u32::try_from(value).unwrap_or_default())
}
