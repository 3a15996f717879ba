// SQLite-backed key-value slot

use crate::record::now_ms;
use crate::slot::{Slot, validate_key};
use eyre::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Database file created inside the store directory
pub const DB_FILE: &str = "todostore.db";

/// Slot stored as one row of a `slots` table
pub struct SqliteSlot {
    key: String,
    db: Connection,
}

impl SqliteSlot {
    /// Open (or create) `{dir}/todostore.db` and bind to `key`
    pub fn open<P: AsRef<Path>>(dir: P, key: &str) -> Result<Self> {
        validate_key(key)?;

        let dir = dir.as_ref();
        fs::create_dir_all(dir).context("Failed to create store directory")?;

        let db = Connection::open(dir.join(DB_FILE)).context("Failed to open SQLite database")?;
        Self::with_connection(db, key)
    }

    /// Bind to `key` in an already-open database
    pub fn with_connection(db: Connection, key: &str) -> Result<Self> {
        validate_key(key)?;

        let slot = Self {
            key: key.to_string(),
            db,
        };
        slot.create_schema()?;
        Ok(slot)
    }

    /// In-memory database, mostly useful for tests
    pub fn open_in_memory(key: &str) -> Result<Self> {
        let db = Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::with_connection(db, key)
    }

    fn create_schema(&self) -> Result<()> {
        debug!("Creating slot schema");

        self.db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS slots (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }
}

impl Slot for SqliteSlot {
    fn key(&self) -> &str {
        &self.key
    }

    fn read(&self) -> Result<Option<String>> {
        let value = self
            .db
            .query_row("SELECT value FROM slots WHERE key = ?1", [&self.key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .context("Failed to read slot row")?;
        Ok(value)
    }

    fn write(&mut self, contents: &str) -> Result<()> {
        self.db
            .execute(
                "INSERT INTO slots (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![&self.key, contents, now_ms()],
            )
            .context("Failed to write slot row")?;

        debug!(key = %self.key, bytes = contents.len(), "Wrote slot row");
        Ok(())
    }
}
