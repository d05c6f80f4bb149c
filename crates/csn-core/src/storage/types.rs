//! Persisted record types: the file-metadata record and the piece journal.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::task::SeedTask;

/// Inclusive byte interval `[start_index, end_index]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start_index: u64,
    pub end_index: u64,
}

impl ByteRange {
    pub fn new(start_index: u64, end_index: u64) -> Self {
        Self {
            start_index,
            end_index,
        }
    }

    /// Number of bytes covered; both bounds are inclusive.
    pub fn len(&self) -> u64 {
        self.end_index.saturating_sub(self.start_index) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end_index < self.start_index
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_index, self.end_index)
    }
}

impl FromStr for ByteRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("invalid byte range {s:?}"))?;
        let start_index = start
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid range start {start:?}: {e}"))?;
        let end_index = end
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid range end {end:?}: {e}"))?;
        Ok(Self {
            start_index,
            end_index,
        })
    }
}

/// On-wire framing of a stored piece. Only plain framing is produced today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceStyle {
    #[default]
    Plain,
}

/// One entry of the piece journal, in piece-number order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceMetaRecord {
    /// 0-based position; strictly increasing and contiguous when valid.
    pub piece_num: i32,
    /// Stored byte length of this piece.
    pub piece_len: u32,
    /// Canonical hex MD5 of the piece's bytes.
    pub md5: String,
    /// The piece's interval in origin coordinates.
    pub origin_range: ByteRange,
    /// The piece's interval in CDN coordinates.
    pub range: ByteRange,
    pub piece_style: PieceStyle,
    /// Byte offset of this piece inside the data blob.
    pub piece_offset: u64,
}

impl PieceMetaRecord {
    /// True when the declared length matches the CDN-coordinate interval.
    pub fn is_consistent(&self) -> bool {
        u64::from(self.piece_len) == self.range.len()
    }
}

/// The persisted authoritative record for a task. Identity fields must
/// match the task exactly for any cached state to be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub task_id: String,
    pub task_url: String,
    pub piece_size: u32,
    pub range: String,
    pub digest: String,
    pub tag: String,
    pub filter: String,
    /// Journal is complete and the data blob is fully written.
    pub finish: bool,
    /// Whole-file digest (if any) was verified against origin or caller expectation.
    pub success: bool,
    /// Expected number of pieces; 0 means unknown.
    pub total_piece_count: i32,
    /// Signature over the journal, see `digest::piece_md5_sign`; may be empty.
    pub piece_md5_sign: String,
    /// Authoritative byte length of the stored blob.
    pub cdn_file_length: u64,
    /// The whole-file digest the origin actually produced.
    pub source_real_digest: String,
    /// Validator name ("last-modified", "etag") to value.
    pub expire_info: HashMap<String, String>,
    /// Last-touched wall-clock milliseconds, for the external eviction policy.
    pub access_time: u64,
}

impl FileMetadata {
    /// Fresh record derived from a task, as written right after a reset.
    pub fn for_task(task: &SeedTask, access_time: u64) -> Self {
        Self {
            task_id: task.id.clone(),
            task_url: task.task_url.clone(),
            piece_size: task.piece_size,
            range: task.range.clone(),
            digest: task.digest.clone(),
            tag: task.tag.clone(),
            filter: task.filter.clone(),
            finish: false,
            success: false,
            total_piece_count: 0,
            piece_md5_sign: String::new(),
            cdn_file_length: 0,
            source_real_digest: String::new(),
            expire_info: HashMap::new(),
            access_time,
        }
    }
}

/// Stat result for a task's data blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageInfo {
    pub size: u64,
}
