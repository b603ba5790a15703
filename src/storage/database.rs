use rusqlite::{Connection, Result as SqlResult};
use std::path::Path;

/// Owns the single SQLite connection behind the persistent store and tracks
/// the schema version in `PRAGMA user_version`.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("SQLite journal mode: {mode}");
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> SqlResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> SqlResult<i64> {
        self.conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
    }

    pub fn set_schema_version(&self, version: i64) -> SqlResult<()> {
        self.conn.pragma_update(None, "user_version", version)
    }
}
