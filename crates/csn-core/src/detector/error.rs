//! Detection error taxonomy.

use std::fmt;

use crate::storage::StoreError;

/// Why a detection pass could not produce a usable cache verdict.
///
/// Recoverable variants collapse to a cache reset inside
/// [`CacheDetector::detect`](super::CacheDetector::detect); only `Storage`
/// (a failed detection, operator-actionable) and `Aborted` escape to the
/// caller.
#[derive(Debug)]
pub enum DetectError {
    /// No metadata record exists for the task.
    MetadataMissing,
    /// Persisted state exists but disagrees with the task or with itself.
    MetadataCorrupt(String),
    /// The origin reports the cached copy is stale.
    ResourceExpired { url: String },
    /// The cache is incomplete and the origin cannot resume by byte range.
    RangeUnsupported { url: String },
    /// Adapter I/O failure; the cache state is unknown and detection fails.
    Storage(StoreError),
    /// Cancelled via the abort token. No reset is performed.
    Aborted,
}

impl DetectError {
    /// Recoverable errors yield a consistent empty cache via reset.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DetectError::MetadataMissing
                | DetectError::MetadataCorrupt(_)
                | DetectError::ResourceExpired { .. }
                | DetectError::RangeUnsupported { .. }
        )
    }
}

impl fmt::Display for DetectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectError::MetadataMissing => write!(f, "no metadata record for task"),
            DetectError::MetadataCorrupt(reason) => {
                write!(f, "persisted state is unusable: {}", reason)
            }
            DetectError::ResourceExpired { url } => {
                write!(f, "resource {} has expired at the origin", url)
            }
            DetectError::RangeUnsupported { url } => {
                write!(f, "resource {} does not support range requests", url)
            }
            DetectError::Storage(e) => write!(f, "detection failed, storage error: {}", e),
            DetectError::Aborted => write!(f, "detection aborted"),
        }
    }
}

impl std::error::Error for DetectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DetectError::Storage(e) => Some(e),
            _ => None,
        }
    }
}
