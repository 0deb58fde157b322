//! Internal error taxonomy (§7). Callers that need to branch on kind (the
//! dispatcher's propagation policy) match on this enum; the binary boundary
//! still wraps setup failures in `anyhow::Result`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsProbeError {
    /// Sample shorter than the 112-byte fixed header.
    NotEnoughData { got: usize, want: usize },
    /// Dentry chain broken or prefix key missing from the resolved-inode LRU.
    Resolution(String),
    /// Kernel map put/get/delete failed; always logged and suppressed.
    CacheMaintenance(String),
    /// Unknown `--dentry-resolution-mode` / `--event` name, or an empty
    /// watch set with filtering enabled and no paths supplied.
    Config(String),
}

impl fmt::Display for FsProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsProbeError::NotEnoughData { got, want } => {
                write!(f, "sample too short: got {got} bytes, need at least {want}")
            }
            FsProbeError::Resolution(msg) => write!(f, "path resolution failed: {msg}"),
            FsProbeError::CacheMaintenance(msg) => write!(f, "cache maintenance failed: {msg}"),
            FsProbeError::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for FsProbeError {}
