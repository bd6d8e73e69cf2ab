//! Connection setup, schema, and meta-table enforcement.

use super::*;

pub(super) fn connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open archive index at {}", path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL for archive index")?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys for archive index")?;
    Ok(conn)
}

pub(super) fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS filedata (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            checksum INTEGER NOT NULL UNIQUE,
            uncompressed_size INTEGER NOT NULL,
            data BLOB,
            key TEXT
        );
        CREATE TABLE IF NOT EXISTS files (
            distribution TEXT NOT NULL,
            patch INTEGER NOT NULL,
            path TEXT NOT NULL,
            date TEXT,
            fileid INTEGER NOT NULL REFERENCES filedata(id),
            PRIMARY KEY (distribution, patch, path)
        );
        CREATE INDEX IF NOT EXISTS files_by_fileid ON files(fileid);
        "#,
    )
    .context("failed to initialize archive index schema")?;
    Ok(())
}

pub(super) fn ensure_meta(conn: &mut Connection, backend: BackendKind) -> Result<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to start archive meta transaction")?;
    tx.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params![META_KEY_SCHEMA_VERSION, SCHEMA_VERSION.to_string()],
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params![META_KEY_BACKEND, backend.as_str()],
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params![META_KEY_CREATED_BY, ARCHIVIST_VERSION],
    )?;
    tx.commit()?;

    enforce_schema_version(conn)?;
    enforce_meta_value(conn, META_KEY_BACKEND, backend.as_str())?;
    Ok(())
}

pub(super) fn meta_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM meta WHERE key = ?1",
        params![key],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .map_err(Into::into)
}

pub(super) fn enforce_schema_version(conn: &Connection) -> Result<()> {
    enforce_meta_value(conn, META_KEY_SCHEMA_VERSION, &SCHEMA_VERSION.to_string())
}

fn enforce_meta_value(conn: &Connection, key: &str, expected: &str) -> Result<()> {
    let found = meta_value(conn, key)?.ok_or_else(|| StoreError::MissingMeta(key.to_string()))?;
    if found != expected {
        return Err(StoreError::IncompatibleIndex {
            key: key.to_string(),
            expected: expected.to_string(),
            found,
        }
        .into());
    }
    Ok(())
}
