//! Run configuration for PTF import and export.
//!
//! Every field is optional in YAML; anything omitted falls back to the
//! built-in default. Command-line flags override both.
//!
//! # Example YAML
//!
//! ```yaml
//! db_file: build/part_table.db
//! ptf_dir: tables/
//! recursive: true
//! ptf_file: build/part_table.ptf
//! extension: ptf
//! ```

use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const DEFAULT_DB_FILE: &str = "part_table.db";
pub const DEFAULT_PTF_DIR: &str = ".";
pub const DEFAULT_PTF_FILE: &str = "part_table.ptf";
pub const DEFAULT_EXTENSION: &str = "ptf";

/// Defaults for the `import` and `export` operations.
///
/// # Examples
///
/// ```
/// use ptf_core::ManagerConfig;
///
/// let config = ManagerConfig::from_yaml_str("recursive: true\n").unwrap();
/// assert!(config.recursive);
/// assert_eq!(config.db_file.to_str(), Some("part_table.db"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// SQLite database the tables live in.
    pub db_file: PathBuf,
    /// Directory scanned for PTF files on import.
    pub ptf_dir: PathBuf,
    /// Descend into subdirectories of `ptf_dir`.
    pub recursive: bool,
    /// Destination of `export`.
    pub ptf_file: PathBuf,
    /// File extension (without the dot) recognized as PTF on import.
    pub extension: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            db_file: PathBuf::from(DEFAULT_DB_FILE),
            ptf_dir: PathBuf::from(DEFAULT_PTF_DIR),
            recursive: false,
            ptf_file: PathBuf::from(DEFAULT_PTF_FILE),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl ManagerConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::PtfError::IoError) if the file cannot be
    /// read, or [`ConfigError`](crate::PtfError::ConfigError) if parsing
    /// fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config = serde_yaml::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Whether `path` carries the configured PTF extension.
    pub fn is_ptf_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.extension)
    }
}
