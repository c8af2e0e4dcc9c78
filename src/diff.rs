//! Line-level change detection for text files
//!
//! This module compares a source text file with its backed-up copy and
//! reports which lines were added and which were removed.
//!
//! ## Overview
//!
//! The comparison is a set-membership diff, not a sequence alignment:
//!
//! - **added** lines are lines of the new content that appear nowhere in the
//!   old content, in new-content order
//! - **removed** lines are lines of the old content that appear nowhere in
//!   the new content, in old-content order
//!
//! Reordering lines therefore is not a change. Duplicated lines are reported
//! once per occurrence.
//!
//! ## Line endings
//!
//! `\r\n` and lone `\r` are folded into `\n` before comparing, so converting
//! a file between line-ending styles is not a change. Whether a line is
//! terminated still counts: a last line `b` and a last line `b\n` are
//! different lines, so adding or removing the final newline is copied. The
//! reported lines carry no terminator.
//!
//! ## Examples
//!
//! ```rust
//! use flatbak::diff::line_delta;
//!
//! let delta = line_delta("a\nb\nc\n", "a\nc\nd\n");
//! assert_eq!(delta.added_lines, vec!["d"]);
//! assert_eq!(delta.removed_lines, vec!["b"]);
//! ```

use crate::error::Result;
use crate::types::{ChangeOutcome, LineDelta};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Compute the set-difference delta between two texts
///
/// # Arguments
///
/// * `old_text` - Content of the backed-up copy
/// * `new_text` - Content of the source file
pub fn line_delta(old_text: &str, new_text: &str) -> LineDelta {
    let old_text = normalize_newlines(old_text);
    let new_text = normalize_newlines(new_text);
    let old_lines: Vec<&str> = old_text.split_inclusive('\n').collect();
    let new_lines: Vec<&str> = new_text.split_inclusive('\n').collect();

    let old_set: HashSet<&str> = old_lines.iter().copied().collect();
    let new_set: HashSet<&str> = new_lines.iter().copied().collect();

    LineDelta {
        added_lines: new_lines
            .iter()
            .filter(|line| !old_set.contains(*line))
            .map(|line| strip_terminator(line).to_string())
            .collect(),
        removed_lines: old_lines
            .iter()
            .filter(|line| !new_set.contains(*line))
            .map(|line| strip_terminator(line).to_string())
            .collect(),
    }
}

/// Fold `\r\n` and lone `\r` into `\n`
fn normalize_newlines(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

fn strip_terminator(line: &str) -> &str {
    line.strip_suffix('\n').unwrap_or(line)
}

/// Compute the delta between two raw contents
///
/// Content is decoded as UTF-8; invalid sequences are replaced rather than
/// rejected so that files with a stray byte are still tracked.
pub fn content_delta(old_content: &[u8], new_content: &[u8]) -> LineDelta {
    if old_content == new_content {
        return LineDelta::default();
    }
    let old_text = String::from_utf8_lossy(old_content);
    let new_text = String::from_utf8_lossy(new_content);
    line_delta(&old_text, &new_text)
}

/// Compare a source file with its backed-up copy
///
/// # Returns
///
/// - [`ChangeOutcome::New`] if `dest_file` does not exist; no diff is computed
/// - [`ChangeOutcome::NoChange`] if both files hold the same set of lines
/// - [`ChangeOutcome::Changed`] otherwise
///
/// # Errors
///
/// - [`FlatbakError::Io`](crate::FlatbakError::Io) if either file cannot be read
pub fn detect_changes(source_file: &Path, dest_file: &Path) -> Result<ChangeOutcome> {
    let old_content = match fs::read(dest_file) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ChangeOutcome::New),
        Err(e) => return Err(e.into()),
    };
    let new_content = fs::read(source_file)?;

    let delta = content_delta(&old_content, &new_content);
    if delta.is_empty() {
        Ok(ChangeOutcome::NoChange)
    } else {
        Ok(ChangeOutcome::Changed(delta))
    }
}
