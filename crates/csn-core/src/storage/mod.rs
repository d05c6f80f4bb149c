//! Persistent task artifacts: metadata record, piece journal, data blob.
//!
//! Three artifacts live under one key (the task id). [`StorageEngine`] is
//! the narrow seam the cache detector consumes; [`DiskStore`] is the
//! filesystem implementation. Implementations serialize operations that
//! touch the same task id; callers single-flight detection itself.

mod disk;
mod lock;
mod types;

pub use disk::DiskStore;
pub use types::{ByteRange, FileMetadata, PieceMetaRecord, PieceStyle, StorageInfo};

use std::fmt;
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::task::SeedTask;

/// Error surfaced by storage operations. `NotFound` is distinguished from
/// plain I/O failure so the detector can treat a missing record as a cache
/// miss rather than a fatal storage fault.
#[derive(Debug)]
pub enum StoreError {
    /// No artifact exists for the task.
    NotFound,
    /// An artifact exists but could not be decoded.
    Corrupt(String),
    /// Underlying filesystem failure.
    Io(std::io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "not found"),
            StoreError::Corrupt(reason) => write!(f, "corrupt record: {}", reason),
            StoreError::Io(e) => write!(f, "io: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::NotFound | StoreError::Corrupt(_) => None,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound
        } else {
            StoreError::Io(e)
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Narrow interface over the per-task artifact store consumed by the cache
/// detector and the seeding pipeline.
pub trait StorageEngine {
    /// Sequential handle over the data blob. Holds the task's guard until
    /// dropped, so the stream observes no concurrent mutation.
    type DataReader: Read;

    /// Read the authoritative metadata record.
    fn read_file_metadata(&self, task_id: &str) -> StoreResult<FileMetadata>;

    /// Initialize fresh artifacts for a task: a metadata record derived from
    /// it plus an empty journal and empty data blob. Returns the record.
    fn write_file_metadata_by_task(&self, task: &SeedTask) -> StoreResult<FileMetadata>;

    /// Journal signature plus the journal itself, in order.
    fn piece_md5_sign(&self, task_id: &str) -> StoreResult<(String, Vec<PieceMetaRecord>)>;

    /// Stat the data blob.
    fn stat_download_file(&self, task_id: &str) -> StoreResult<StorageInfo>;

    /// Open a sequential reader over the data blob.
    fn read_download_file(&self, task_id: &str) -> StoreResult<Self::DataReader>;

    /// Read the piece journal. An absent journal reads as empty.
    fn read_piece_meta_records(&self, task_id: &str) -> StoreResult<Vec<PieceMetaRecord>>;

    /// Atomically replace the piece journal with `records`.
    fn write_piece_meta_records(
        &self,
        task_id: &str,
        records: &[PieceMetaRecord],
    ) -> StoreResult<()>;

    /// Append one record to the piece journal.
    fn append_piece_meta_record(
        &self,
        task_id: &str,
        record: &PieceMetaRecord,
    ) -> StoreResult<()>;

    /// Destroy all three artifacts for the task. Destroying a task that has
    /// no artifacts succeeds.
    fn reset_repo(&self, task: &SeedTask) -> StoreResult<()>;

    /// Record the last-touched wall-clock millisecond on the metadata record.
    fn update_access_time(&self, task_id: &str, millis: u64) -> StoreResult<()>;
}

/// Wall-clock milliseconds since the Unix epoch, for access-time tracking.
pub fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
