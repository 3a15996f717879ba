// Named key-value slots holding a serialized todo snapshot

use crate::record::Todo;
use eyre::{Context, Result, eyre};
use fs2::FileExt;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default slot name, shared with browser clients' local storage key
pub const DEFAULT_KEY: &str = "todos";

/// A single named entry in some key-value storage.
///
/// Slots are read once when a store opens and overwritten wholesale after
/// every mutation. There are no partial updates.
pub trait Slot {
    /// Name of the entry
    fn key(&self) -> &str;

    /// Current contents, or `None` if the slot has never been written
    fn read(&self) -> Result<Option<String>>;

    /// Replace the contents
    fn write(&mut self, contents: &str) -> Result<()>;
}

/// Serialize todos into the snapshot format (a JSON array)
pub fn encode_snapshot(todos: &[Todo]) -> Result<String> {
    serde_json::to_string(todos).context("Failed to serialize todo snapshot")
}

/// Todos decoded from a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub todos: Vec<Todo>,
    /// Entries that were present but didn't decode as a todo
    pub skipped: usize,
}

/// Parse a snapshot back into todos.
///
/// The document must be a JSON array. Entries that don't decode as a todo
/// are skipped and counted, the rest are kept in order.
pub fn decode_snapshot(contents: &str) -> Result<Snapshot> {
    let value: Value = serde_json::from_str(contents).context("Snapshot is not valid JSON")?;

    let Value::Array(entries) = value else {
        return Err(eyre!("Snapshot is not a JSON array"));
    };

    let mut snapshot = Snapshot {
        todos: Vec::with_capacity(entries.len()),
        skipped: 0,
    };
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<Todo>(entry) {
            Ok(todo) => snapshot.todos.push(todo),
            Err(e) => {
                debug!(index, error = ?e, "Failed to parse todo entry, skipping");
                snapshot.skipped += 1;
            }
        }
    }

    Ok(snapshot)
}

/// Check that a key is usable as a file stem and table key
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(eyre!("Slot key cannot be empty"));
    }
    if key.len() > 64 {
        return Err(eyre!("Slot key too long: {} (max 64 chars)", key));
    }
    if !key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(eyre!("Invalid slot key: {} (must be alphanumeric with _/-)", key));
    }
    Ok(())
}

// ============================================================================
// In-memory slot
// ============================================================================

/// Slot kept in process memory
#[derive(Debug, Clone)]
pub struct MemorySlot {
    key: String,
    contents: Option<String>,
    writes: usize,
    fail_writes: bool,
}

impl MemorySlot {
    /// Empty slot under the default key
    pub fn new() -> Self {
        Self {
            key: DEFAULT_KEY.to_string(),
            contents: None,
            writes: 0,
            fail_writes: false,
        }
    }

    /// Slot that already holds `contents`
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Some(contents.into()),
            ..Self::new()
        }
    }

    pub fn contents(&self) -> Option<&str> {
        self.contents.as_deref()
    }

    /// Number of successful writes since creation
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Make subsequent writes fail, simulating unavailable storage
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl Default for MemorySlot {
    fn default() -> Self {
        Self::new()
    }
}

impl Slot for MemorySlot {
    fn key(&self) -> &str {
        &self.key
    }

    fn read(&self) -> Result<Option<String>> {
        Ok(self.contents.clone())
    }

    fn write(&mut self, contents: &str) -> Result<()> {
        if self.fail_writes {
            return Err(eyre!("Slot {} is not writable", self.key));
        }
        self.contents = Some(contents.to_string());
        self.writes += 1;
        Ok(())
    }
}

// ============================================================================
// File slot
// ============================================================================

/// Slot stored as `{dir}/{key}.json`
#[derive(Debug)]
pub struct FileSlot {
    key: String,
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileSlot {
    /// Open (creating the directory if needed) the slot `key` under `dir`
    pub fn open<P: AsRef<Path>>(dir: P, key: &str) -> Result<Self> {
        validate_key(key)?;

        let dir = dir.as_ref();
        fs::create_dir_all(dir).context("Failed to create store directory")?;

        Ok(Self {
            key: key.to_string(),
            path: dir.join(format!("{}.json", key)),
            lock_path: dir.join(format!("{}.lock", key)),
        })
    }

    /// Location of the snapshot file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Slot for FileSlot {
    fn key(&self) -> &str {
        &self.key
    }

    fn read(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path).context("Failed to read slot file")?;
        Ok(Some(contents))
    }

    fn write(&mut self, contents: &str) -> Result<()> {
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .context("Failed to open slot lock file")?;

        // Acquire exclusive lock before writing
        lock.lock_exclusive().context("Failed to acquire file lock")?;

        // Write a sibling file and rename it over the slot so readers never
        // observe a half-written snapshot
        let tmp_path = self.path.with_extension("json.tmp");
        let written = File::create(&tmp_path)
            .context("Failed to create temporary slot file")
            .and_then(|mut tmp| {
                tmp.write_all(contents.as_bytes())?;
                tmp.sync_all()?;
                Ok(())
            })
            .and_then(|()| fs::rename(&tmp_path, &self.path).context("Failed to replace slot file"));

        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                debug!(path = ?tmp_path, error = ?cleanup, "Failed to remove temporary slot file");
            }
            return Err(e);
        }
        debug!(path = ?self.path, bytes = contents.len(), "Wrote slot file");

        // Lock is automatically released when file is dropped
        Ok(())
    }
}
