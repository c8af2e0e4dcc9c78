//! File classification
//!
//! The classifier decides, per file, whether the sync engine should look at
//! it at all and whether its content is binary or text.
//!
//! ## Rules
//!
//! 1. **Extension allow-list**: a file is eligible only if its lowercase
//!    base name ends with one of the configured extensions. Ineligible files
//!    are invisible to the engine; their content is never read.
//! 2. **Ignore rules**: an eligible file is ignored when its base name equals
//!    a configured ignore name or matches a wildcard pattern. Patterns are
//!    matched against the base name only, never against the full path.
//! 3. **Binary detection**: for eligible, non-ignored files the first
//!    [`BINARY_PROBE_LEN`] bytes are scanned. A NUL byte always means binary.
//!    Without one, well-known text extensions are text, well-known binary
//!    formats (images, archives, office documents, executables) are binary,
//!    and everything else is text.
//!
//! ## Example
//!
//! ```rust,no_run
//! use flatbak::{BackupConfig, Classifier};
//! use std::path::Path;
//!
//! # fn main() -> flatbak::Result<()> {
//! let config = BackupConfig::builder("./src", "./bak")
//!     .file_extensions(vec![".txt".to_string(), ".bin".to_string()])
//!     .ignore_patterns(vec!["b.*".to_string()])
//!     .build();
//! let classifier = Classifier::new(&config)?;
//! let result = classifier.classify(Path::new("./src/c.bin"))?;
//! println!("binary: {}", result.is_binary);
//! # Ok(())
//! # }
//! ```

use crate::config::BackupConfig;
use crate::error::{FlatbakError, Result};
use crate::types::Classification;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::trace;

/// Number of leading bytes scanned for NUL bytes
pub const BINARY_PROBE_LEN: usize = 8192;

/// Extensions always treated as text when no NUL byte is present
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "csv", "tsv", "log", "ini", "conf", "cfg", "py", "js", "ts", "java", "c", "cpp", "h",
    "hpp", "sh", "ps1", "md", "rst", "adoc", "json", "xml", "yaml", "yml", "html", "htm", "css",
    "toml", "sql", "rs",
];

/// Extensions of container or media formats that are binary by type
const BINARY_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "jpg", "jpeg", "png", "gif", "bmp", "ico", "webp", "pdf",
    "doc", "docx", "xls", "xlsx", "ppt", "pptx", "zip", "gz", "tgz", "bz2", "xz", "7z", "rar",
    "mp3", "mp4", "wav", "avi", "mov",
];

/// Classifier compiled from a [`BackupConfig`]
#[derive(Debug, Clone)]
pub struct Classifier {
    /// Lowercase extensions including the leading dot
    extensions: Vec<String>,
    /// Exact base names to ignore
    ignore_names: HashSet<String>,
    /// Compiled wildcard patterns
    ignore_set: GlobSet,
}

impl Classifier {
    /// Compile the classification rules of a configuration
    ///
    /// # Errors
    ///
    /// - [`FlatbakError::InvalidPattern`] if an ignore pattern does not parse
    pub fn new(config: &BackupConfig) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.ignore_patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| FlatbakError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.kind().to_string(),
                })?;
            builder.add(glob);
        }
        let ignore_set = builder.build().map_err(|e| FlatbakError::InvalidPattern {
            pattern: config.ignore_patterns.join(", "),
            reason: e.to_string(),
        })?;

        Ok(Self {
            extensions: config
                .file_extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            ignore_names: config.ignore_files.iter().cloned().collect(),
            ignore_set,
        })
    }

    /// Check the extension allow-list against a base name
    pub fn is_eligible(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
    }

    /// Check the ignore names and patterns against a base name
    pub fn is_ignored(&self, file_name: &str) -> bool {
        self.ignore_names.contains(file_name) || self.ignore_set.is_match(file_name)
    }

    /// Classify a file
    ///
    /// The content is read only when the file is eligible and not ignored.
    /// A file whose base name is not valid UTF-8 is treated as ineligible.
    pub fn classify(&self, path: &Path) -> Result<Classification> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(Classification::default());
        };

        let mut result = Classification {
            is_eligible: self.is_eligible(file_name),
            is_ignored: false,
            is_binary: false,
        };
        if !result.is_eligible {
            return Ok(result);
        }
        result.is_ignored = self.is_ignored(file_name);
        if result.is_ignored {
            return Ok(result);
        }

        result.is_binary = detect_binary(path)?;
        trace!("Classified {:?}: {:?}", path, result);
        Ok(result)
    }
}

/// Check if content appears to be binary
///
/// Only the first [`BINARY_PROBE_LEN`] bytes are inspected.
pub fn is_binary_content(content: &[u8]) -> bool {
    let check_len = content.len().min(BINARY_PROBE_LEN);
    content[..check_len].contains(&0)
}

/// Decide whether a file is binary
///
/// The NUL-byte scan is authoritative; the extension lists are only
/// consulted when the scan finds nothing.
pub fn detect_binary(path: &Path) -> Result<bool> {
    let mut prefix = Vec::with_capacity(BINARY_PROBE_LEN);
    File::open(path)?
        .take(BINARY_PROBE_LEN as u64)
        .read_to_end(&mut prefix)?;
    if is_binary_content(&prefix) {
        return Ok(true);
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    Ok(match extension.as_deref() {
        Some(ext) if TEXT_EXTENSIONS.contains(&ext) => false,
        Some(ext) => BINARY_EXTENSIONS.contains(&ext),
        None => false,
    })
}
