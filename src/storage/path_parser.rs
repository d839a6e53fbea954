//! Path parsing utilities for worksheet records.
//!
//! A record lives directly in the worksheet root as `HW-<id>.yaml` (or
//! `.yml`); the file-name stem is the sole source of the hardware id.

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use thiserror::Error;

use crate::domain::HardwareId;

static RECORD_STEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^HW-(\d+)$").expect("record stem pattern is valid"));

/// Errors parsing a hardware id from a record path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The path has no usable UTF-8 file-name stem.
    #[error("path {0} has no usable file name")]
    InvalidPath(PathBuf),

    /// The file-name stem does not follow the `HW-<id>` pattern.
    #[error("file name {0:?} is not a hardware record name")]
    Unrecognised(String),

    /// The numeric portion does not fit the id type.
    #[error("hardware id in {0:?} is out of range")]
    IdOutOfRange(String),
}

/// Parses the hardware id from a record file path.
///
/// # Errors
///
/// Returns an error if the path has no UTF-8 stem, the stem does not match
/// `HW-<id>`, or the id overflows.
pub fn parse_id_from_path(path: &Path) -> Result<HardwareId, ParseError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ParseError::InvalidPath(path.to_path_buf()))?;

    let captures = RECORD_STEM
        .captures(stem)
        .ok_or_else(|| ParseError::Unrecognised(stem.to_string()))?;

    captures[1]
        .parse()
        .map(HardwareId::new)
        .map_err(|_| ParseError::IdOutOfRange(stem.to_string()))
}

/// The canonical record path for a hardware id.
#[must_use]
pub fn record_path(root: &Path, id: HardwareId) -> PathBuf {
    root.join(format!("{id}.yaml"))
}
