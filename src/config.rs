//! Backup configuration
//!
//! [`BackupConfig`] is the fully-resolved, immutable configuration value that
//! every core function receives. It can be built in code with
//! [`BackupConfigBuilder`] or loaded from a YAML or JSON file.
//!
//! ## File lookup
//!
//! [`load`] resolves a configuration in this order:
//!
//! 1. An explicitly given file (format chosen by its extension)
//! 2. `config.yaml`, `config.yml`, then `config.json` in the working directory
//! 3. Built-in defaults
//!
//! Missing keys always fall back to their defaults, so a file containing
//! only `source_folder` and `backup_folder` is valid.
//!
//! ## Example
//!
//! ```yaml
//! source_folder: /home/me/notes
//! backup_folder: /mnt/backup/notes
//! file_extensions: [".txt", ".md", ".csv"]
//! ignore_files: ["scratch.txt"]
//! ignore_patterns: ["*.bak", "temp*", "*~"]
//! max_zips: 20
//! ```

use crate::error::{FlatbakError, Result};
use crate::types::META_DIR_NAME;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default number of snapshot archives to keep
pub const DEFAULT_MAX_ZIPS: i64 = 20;

/// Config files probed in the working directory, in order
pub const DEFAULT_CONFIG_FILES: &[&str] = &["config.yaml", "config.yml", "config.json"];

/// Configuration for a backup run
///
/// # Examples
///
/// ```rust
/// use flatbak::BackupConfig;
///
/// let config: BackupConfig = serde_json::from_str(
///     r#"{"source_folder": "src", "backup_folder": "bak"}"#
/// ).unwrap();
/// assert_eq!(config.max_zips, 20);
/// assert_eq!(config.file_extensions, vec![".txt".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory tree to back up
    pub source_folder: PathBuf,
    /// Directory tree receiving the mirror and the metadata subtree
    pub backup_folder: PathBuf,
    /// Allowed file-name extensions, each starting with `.`
    pub file_extensions: Vec<String>,
    /// Exact base names to skip
    pub ignore_files: Vec<String>,
    /// Wildcard patterns (`*`, `?`) matched against base names
    pub ignore_patterns: Vec<String>,
    /// Maximum number of snapshot archives to keep (`<= 0` keeps none)
    pub max_zips: i64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            source_folder: PathBuf::from("./source"),
            backup_folder: PathBuf::from("./backup"),
            file_extensions: vec![".txt".to_string()],
            ignore_files: Vec::new(),
            ignore_patterns: Vec::new(),
            max_zips: DEFAULT_MAX_ZIPS,
        }
    }
}

impl BackupConfig {
    /// Start building a configuration for the given roots
    pub fn builder(source: impl Into<PathBuf>, backup: impl Into<PathBuf>) -> BackupConfigBuilder {
        BackupConfigBuilder::new(source, backup)
    }

    /// Metadata subtree inside the backup root
    pub fn meta_dir(&self) -> PathBuf {
        self.backup_folder.join(META_DIR_NAME)
    }

    /// Return a copy with every extension prefixed by a dot
    ///
    /// Empty entries are dropped.
    pub fn normalized(mut self) -> Self {
        self.file_extensions = self
            .file_extensions
            .into_iter()
            .map(|ext| ext.trim().to_string())
            .filter(|ext| !ext.is_empty())
            .map(|ext| if ext.starts_with('.') { ext } else { format!(".{}", ext) })
            .collect();
        self
    }

    /// Check the invariants that must hold before any file I/O
    ///
    /// # Errors
    ///
    /// - [`FlatbakError::SameSourceAndBackup`] if both roots resolve to the same place
    /// - [`FlatbakError::SourceMissing`] if the source root is not a directory
    /// - [`FlatbakError::InvalidConfiguration`] if no extension is configured
    pub fn validate(&self) -> Result<()> {
        if same_location(&self.source_folder, &self.backup_folder) {
            return Err(FlatbakError::SameSourceAndBackup(self.source_folder.clone()));
        }
        if !self.source_folder.is_dir() {
            return Err(FlatbakError::SourceMissing(self.source_folder.clone()));
        }
        if self.file_extensions.is_empty() {
            return Err(FlatbakError::InvalidConfiguration(
                "file_extensions must list at least one extension".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Builder for [`BackupConfig`]
///
/// # Examples
///
/// ```rust
/// use flatbak::BackupConfig;
///
/// let config = BackupConfig::builder("./notes", "./notes-backup")
///     .file_extensions(vec![".md".to_string(), "txt".to_string()])
///     .ignore_patterns(vec!["*.bak".to_string()])
///     .max_zips(5)
///     .build();
/// assert_eq!(config.file_extensions, vec![".md", ".txt"]);
/// ```
#[derive(Debug)]
pub struct BackupConfigBuilder {
    config: BackupConfig,
}

impl BackupConfigBuilder {
    /// Create a builder with default options for the given roots
    pub fn new(source: impl Into<PathBuf>, backup: impl Into<PathBuf>) -> Self {
        Self {
            config: BackupConfig {
                source_folder: source.into(),
                backup_folder: backup.into(),
                ..BackupConfig::default()
            },
        }
    }

    /// Set the extension allow-list
    pub fn file_extensions(mut self, extensions: Vec<String>) -> Self {
        self.config.file_extensions = extensions;
        self
    }

    /// Set exact base names to ignore
    pub fn ignore_files(mut self, names: Vec<String>) -> Self {
        self.config.ignore_files = names;
        self
    }

    /// Set wildcard ignore patterns
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.ignore_patterns = patterns;
        self
    }

    /// Set the number of archives to keep
    pub fn max_zips(mut self, count: i64) -> Self {
        self.config.max_zips = count;
        self
    }

    /// Finish building; extensions are normalized
    pub fn build(self) -> BackupConfig {
        self.config.normalized()
    }
}

/// Resolve the configuration for a run
///
/// With an explicit path the file must exist. Without one, the default
/// config files are probed in the working directory and the built-in
/// defaults are used when none exists.
pub fn load(explicit: Option<&Path>) -> Result<BackupConfig> {
    if let Some(path) = explicit {
        return load_from_file(path);
    }
    for name in DEFAULT_CONFIG_FILES {
        let candidate = Path::new(name);
        if candidate.is_file() {
            return load_from_file(candidate);
        }
    }
    debug!("No config file found, using defaults");
    Ok(BackupConfig::default())
}

/// Load a configuration file, choosing the format by extension
pub fn load_from_file(path: &Path) -> Result<BackupConfig> {
    info!("Loading configuration from {:?}", path);
    let content = fs::read_to_string(path)?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("json") => from_json_str(&content),
        Some("yaml") | Some("yml") => from_yaml_str(&content),
        _ => from_yaml_str(&content).or_else(|_| from_json_str(&content)),
    }
}

/// Parse a YAML document; an empty document yields the defaults
pub fn from_yaml_str(content: &str) -> Result<BackupConfig> {
    if content.trim().is_empty() {
        return Ok(BackupConfig::default());
    }
    let config: BackupConfig = serde_yaml::from_str(content)?;
    Ok(config.normalized())
}

/// Parse a JSON document
pub fn from_json_str(content: &str) -> Result<BackupConfig> {
    if content.trim().is_empty() {
        return Ok(BackupConfig::default());
    }
    let config: BackupConfig = serde_json::from_str(content)?;
    Ok(config.normalized())
}

/// Whether two paths point to the same directory
///
/// Canonical paths are compared when they can be resolved, otherwise the
/// absolute forms are compared.
pub fn same_location(a: &Path, b: &Path) -> bool {
    resolve(a) == resolve(b)
}

fn resolve(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
