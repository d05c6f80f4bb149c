//! Cache detection: decide whether a task's persisted state is fully
//! usable, partially usable with a resumable break-point, or must be
//! discarded and reseeded.
//!
//! One detection reconciles three artifacts (metadata record, piece
//! journal, data blob) against the task identity and the origin's view of
//! the resource. Any recoverable inconsistency collapses to a reset that
//! leaves a consistent empty cache; only storage failures and cancellation
//! escape to the caller.
//!
//! Callers must single-flight invocations per task id. The detector runs
//! sequentially, takes no cross-call locks of its own, and owns the
//! caller's running file hasher for the duration of the call.

mod error;
mod identity;
mod verify;

pub use error::DetectError;
pub use identity::{check_identity, IdentityMismatch};
pub use verify::{verify_piece, PieceError};


use md5::Md5;
use tracing::field::Empty;

use crate::control::AbortToken;
use crate::source::{ExpireInfo, OriginClient};
use crate::storage::{current_millis, FileMetadata, PieceMetaRecord, StorageEngine, StoreError};
use crate::task::SeedTask;

/// Result of cache detection.
///
/// `break_point` is `-1` when the cache is fully usable, otherwise the
/// origin byte offset at which a resumed fetch must begin; `0` together
/// with empty records means no prior cache survived.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult {
    pub break_point: i64,
    pub piece_meta_records: Vec<PieceMetaRecord>,
    pub file_metadata: FileMetadata,
}

/// Cache detector over a storage engine and an origin client.
pub struct CacheDetector<S, O> {
    store: S,
    origin: O,
}

impl<S: StorageEngine, O: OriginClient> CacheDetector<S, O> {
    pub fn new(store: S, origin: O) -> Self {
        Self { store, origin }
    }

    /// One detection pass for `task`.
    ///
    /// `file_hasher` accumulates every verified byte so the caller can keep
    /// hashing subsequently fetched bytes into a whole-file digest without
    /// a second pass. `abort` is honored at every suspension point; an
    /// aborted detection performs no reset.
    pub fn detect(
        &self,
        task: &SeedTask,
        file_hasher: &mut Md5,
        abort: &AbortToken,
    ) -> Result<CacheResult, DetectError> {
        let span = tracing::info_span!(
            "detect-cache",
            task.id = %task.id,
            detect.result = Empty,
            detect.break_point = Empty,
            detect.pieces_surviving = Empty,
        );
        let _enter = span.enter();

        let mut was_reset = false;
        let result = match self.do_detect(task, file_hasher, abort) {
            Ok(result) => Ok(result),
            Err(err) if err.is_recoverable() => {
                tracing::info!(task.id = %task.id, "cache miss, resetting stored state: {}", err);
                was_reset = true;
                let file_metadata = match self.reset_cache(task) {
                    Ok(file_metadata) => file_metadata,
                    Err(reset_err) => {
                        span.record("detect.result", "error");
                        return Err(reset_err);
                    }
                };
                Ok(CacheResult {
                    break_point: 0,
                    piece_meta_records: Vec::new(),
                    file_metadata,
                })
            }
            Err(err) => {
                span.record("detect.result", "error");
                return Err(err);
            }
        };

        if let Ok(result) = &result {
            let label = if was_reset {
                "miss-reset"
            } else if result.break_point == -1 {
                "hit-full"
            } else {
                "hit-partial"
            };
            span.record("detect.result", label);
            span.record("detect.break_point", result.break_point);
            span.record(
                "detect.pieces_surviving",
                result.piece_meta_records.len() as u64,
            );
            if let Err(err) = self.store.update_access_time(&task.id, current_millis()) {
                tracing::warn!(task.id = %task.id, "failed to update task access time: {}", err);
            }
        }
        result
    }

    fn check_abort(&self, abort: &AbortToken) -> Result<(), DetectError> {
        if abort.is_aborted() {
            Err(DetectError::Aborted)
        } else {
            Ok(())
        }
    }

    /// The actual detection. Every error here is interpreted by `detect`:
    /// recoverable ones become a reset, the rest pass through.
    fn do_detect(
        &self,
        task: &SeedTask,
        file_hasher: &mut Md5,
        abort: &AbortToken,
    ) -> Result<CacheResult, DetectError> {
        self.check_abort(abort)?;
        let file_metadata = self.store.read_file_metadata(&task.id).map_err(|e| match e {
            StoreError::NotFound => DetectError::MetadataMissing,
            StoreError::Corrupt(reason) => DetectError::MetadataCorrupt(reason),
            e => DetectError::Storage(e),
        })?;
        if let Err(mismatch) = check_identity(task, &file_metadata) {
            return Err(DetectError::MetadataCorrupt(mismatch.to_string()));
        }

        self.check_abort(abort)?;
        let expire_info = ExpireInfo::from_map(&file_metadata.expire_info);
        let expired = match self.origin.is_expired(&task.raw_url, &task.header, &expire_info) {
            Ok(expired) => expired,
            Err(err) => {
                // Fail open: a flaky probe must not trigger a reseed stampede
                // against the origin.
                tracing::warn!(
                    task.id = %task.id,
                    "freshness probe failed, assuming the source is not expired: {:#}",
                    err
                );
                false
            }
        };
        if expired {
            return Err(DetectError::ResourceExpired {
                url: task.task_url.clone(),
            });
        }

        if file_metadata.finish {
            return self.detect_by_read_metadata(task, file_metadata, abort);
        }

        self.check_abort(abort)?;
        let support_range = match self.origin.is_support_range(&task.raw_url, &task.header) {
            Ok(support_range) => support_range,
            Err(err) => {
                // An unverifiable capability cannot anchor a resume.
                tracing::warn!(
                    task.id = %task.id,
                    "range probe failed, treating the source as not resumable: {:#}",
                    err
                );
                false
            }
        };
        if !support_range {
            return Err(DetectError::RangeUnsupported {
                url: task.task_url.clone(),
            });
        }

        self.detect_by_read_file(task, file_metadata, file_hasher, abort)
    }

    /// Fast path: the journal claims completion, so integrity rests on the
    /// signed journal plus the blob size. No file bytes are rehashed.
    fn detect_by_read_metadata(
        &self,
        task: &SeedTask,
        file_metadata: FileMetadata,
        abort: &AbortToken,
    ) -> Result<CacheResult, DetectError> {
        if !file_metadata.success {
            return Err(DetectError::MetadataCorrupt(
                "finished task is not marked successful".to_string(),
            ));
        }
        self.check_abort(abort)?;
        let (md5_sign, piece_meta_records) =
            self.store.piece_md5_sign(&task.id).map_err(fatal_or_corrupt)?;
        if file_metadata.total_piece_count > 0
            && piece_meta_records.len() != file_metadata.total_piece_count as usize
        {
            return Err(DetectError::MetadataCorrupt(format!(
                "total piece count is inconsistent: expected {}, got {}",
                file_metadata.total_piece_count,
                piece_meta_records.len()
            )));
        }
        if !file_metadata.piece_md5_sign.is_empty() && md5_sign != file_metadata.piece_md5_sign {
            return Err(DetectError::MetadataCorrupt(format!(
                "piece md5 sign is inconsistent: expected {}, got {}",
                file_metadata.piece_md5_sign, md5_sign
            )));
        }
        self.check_abort(abort)?;
        let info = self.store.stat_download_file(&task.id).map_err(fatal_or_corrupt)?;
        if info.size != file_metadata.cdn_file_length {
            return Err(DetectError::MetadataCorrupt(format!(
                "file size is inconsistent: expected {}, got {}",
                file_metadata.cdn_file_length, info.size
            )));
        }
        Ok(CacheResult {
            break_point: -1,
            piece_meta_records,
            file_metadata,
        })
    }

    /// Slow path: stream the blob piece by piece against the journal,
    /// keeping the longest verified contiguous prefix.
    fn detect_by_read_file(
        &self,
        task: &SeedTask,
        file_metadata: FileMetadata,
        file_hasher: &mut Md5,
        abort: &AbortToken,
    ) -> Result<CacheResult, DetectError> {
        self.check_abort(abort)?;
        let mut reader = self.store.read_download_file(&task.id).map_err(fatal_or_corrupt)?;
        let journal = self
            .store
            .read_piece_meta_records(&task.id)
            .map_err(fatal_or_corrupt)?;

        let mut break_point: u64 = 0;
        let mut surviving: Vec<PieceMetaRecord> = Vec::with_capacity(journal.len());
        for (index, record) in journal.iter().enumerate() {
            self.check_abort(abort)?;
            if record.piece_num != index as i32 {
                tracing::warn!(
                    task.id = %task.id,
                    "journal gap at position {}: found piece {}",
                    index,
                    record.piece_num
                );
                break;
            }
            if !record.is_consistent() {
                tracing::warn!(
                    task.id = %task.id,
                    "piece {} declares {} bytes but covers {}",
                    record.piece_num,
                    record.piece_len,
                    record.range.len()
                );
                break;
            }
            if let Some(prev) = surviving.last() {
                if record.origin_range.start_index != prev.origin_range.end_index + 1 {
                    tracing::warn!(
                        task.id = %task.id,
                        "piece {} is not adjacent to its predecessor",
                        record.piece_num
                    );
                    break;
                }
            }
            if let Err(err) = verify_piece(&mut reader, record, file_hasher) {
                tracing::warn!(
                    task.id = %task.id,
                    piece = record.piece_num,
                    "piece verification failed: {}",
                    err
                );
                break;
            }
            break_point = record.origin_range.end_index + 1;
            surviving.push(record.clone());
        }
        drop(reader);

        if surviving.len() != journal.len() {
            // Truncate the torn tail so the journal again matches the data
            // the next fetch will resume onto.
            self.store
                .write_piece_meta_records(&task.id, &surviving)
                .map_err(DetectError::Storage)?;
        }
        Ok(CacheResult {
            break_point: break_point as i64,
            piece_meta_records: surviving,
            file_metadata,
        })
    }

    /// Destroy all artifacts and write a fresh record derived from the task.
    fn reset_cache(&self, task: &SeedTask) -> Result<FileMetadata, DetectError> {
        self.store.reset_repo(task).map_err(DetectError::Storage)?;
        self.store
            .write_file_metadata_by_task(task)
            .map_err(DetectError::Storage)
    }
}

/// In the verification paths a missing or undecodable artifact means the
/// cache is unusable (recoverable), while real I/O faults stay fatal.
fn fatal_or_corrupt(e: StoreError) -> DetectError {
    match e {
        StoreError::NotFound => {
            DetectError::MetadataCorrupt("required task artifact is missing".to_string())
        }
        StoreError::Corrupt(reason) => DetectError::MetadataCorrupt(reason),
        e => DetectError::Storage(e),
    }
}
