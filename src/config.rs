// Configuration: where the todo slot lives and how it is stored

use crate::slot::{DEFAULT_KEY, FileSlot, Slot, validate_key};
use crate::sqlite::SqliteSlot;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding `store_dir`
pub const STORE_DIR_ENV: &str = "TODOSTORE_DIR";

const APP_DIR: &str = "todostore";
const CONFIG_FILE: &str = "config.yml";

/// Storage backend for the slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// One JSON file per key
    #[default]
    File,
    /// One row per key in a SQLite database
    Sqlite,
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store_dir: PathBuf,
    pub key: String,
    pub backend: Backend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            key: DEFAULT_KEY.to_string(),
            backend: Backend::default(),
        }
    }
}

/// Platform data directory, falling back to `./.todostore`
pub fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join(format!(".{}", APP_DIR)))
}

/// `{config_dir}/todostore/config.yml`, if the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

impl Config {
    /// Parse a YAML config file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_yaml(&contents).with_context(|| format!("Invalid config file {:?}", path))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document parses as null
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Load configuration.
    ///
    /// Precedence: `explicit` file if given, else the default config file when
    /// it exists, else defaults. `TODOSTORE_DIR` then overrides `store_dir`.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(path)?,
                None => Self::default(),
            },
        };

        if let Some(dir) = std::env::var_os(STORE_DIR_ENV) {
            config.store_dir = PathBuf::from(dir);
        }

        debug!(?config, "Loaded configuration");
        Ok(config)
    }

    /// Replace `store_dir` when an override is given
    pub fn with_store_dir(mut self, store_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = store_dir {
            self.store_dir = dir;
        }
        self
    }

    /// Open the configured slot
    pub fn open_slot(&self) -> Result<Box<dyn Slot>> {
        validate_key(&self.key)?;

        let slot: Box<dyn Slot> = match self.backend {
            Backend::File => Box::new(FileSlot::open(&self.store_dir, &self.key)?),
            Backend::Sqlite => Box::new(SqliteSlot::open(&self.store_dir, &self.key)?),
        };
        Ok(slot)
    }
}

impl Slot for Box<dyn Slot> {
    fn key(&self) -> &str {
        (**self).key()
    }

    fn read(&self) -> Result<Option<String>> {
        (**self).read()
    }

    fn write(&mut self, contents: &str) -> Result<()> {
        (**self).write(contents)
    }
}
