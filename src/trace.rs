//! Program trace copies
//!
//! For traceability a driving program may store a copy of itself in the
//! metadata subtree after a successful sync, so every backup can be matched
//! with the tool version that produced it. The core never calls this; it is
//! a hook for the CLI.

use crate::error::{FlatbakError, Result};
use crate::types::{NAME_TIMESTAMP_FORMAT, TRACE_PREFIX};
use crate::utils;
use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Copy `program` into `meta_dir` as `backup_script_<timestamp>[.ext]`
///
/// The program's own extension, if any, is kept.
pub fn record_program_copy(
    meta_dir: &Path,
    program: &Path,
    timestamp: NaiveDateTime,
) -> Result<PathBuf> {
    if !program.is_file() {
        return Err(FlatbakError::internal(format!(
            "program {:?} is not a regular file",
            program
        )));
    }
    fs::create_dir_all(meta_dir)?;

    let mut name = format!("{}_{}", TRACE_PREFIX, timestamp.format(NAME_TIMESTAMP_FORMAT));
    if let Some(ext) = program.extension().and_then(|e| e.to_str()) {
        name.push('.');
        name.push_str(ext);
    }
    let target = meta_dir.join(name);
    utils::copy_file(program, &target)?;
    info!("Program backed up to {:?}", target);
    Ok(target)
}
