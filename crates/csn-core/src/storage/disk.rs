//! Filesystem implementation of the artifact store.
//!
//! Layout: `<root>/<task_id>/` holds `metadata` (one JSON document),
//! `pieces` (JSON lines, appendable, atomically rewritten on truncation)
//! and `data` (raw bytes at piece offsets). Metadata and journal replace
//! go through a temp file plus rename so readers never observe a torn
//! document; a journal line that fails to decode ends the journal there,
//! matching append-only torn-tail semantics after a crash.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::FileExt;

use super::lock::{TaskGuard, TaskLocks};
use super::types::{FileMetadata, PieceMetaRecord, StorageInfo};
use super::{current_millis, StorageEngine, StoreError, StoreResult};
use crate::digest;
use crate::task::SeedTask;

const METADATA_FILE: &str = "metadata";
const PIECES_FILE: &str = "pieces";
const DATA_FILE: &str = "data";

/// Per-task artifact store rooted at a single directory.
pub struct DiskStore {
    root: PathBuf,
    locks: TaskLocks,
}

/// Sequential reader over a task's data blob; holds the task guard so the
/// blob is not mutated underneath the stream.
pub struct DiskDataReader {
    inner: BufReader<File>,
    _guard: TaskGuard,
}

impl Read for DiskDataReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl DiskStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(StoreError::Io)?;
        Ok(Self {
            root,
            locks: TaskLocks::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn task_dir(&self, task_id: &str) -> PathBuf {
        self.root.join(task_id)
    }

    fn metadata_path(&self, task_id: &str) -> PathBuf {
        self.task_dir(task_id).join(METADATA_FILE)
    }

    fn pieces_path(&self, task_id: &str) -> PathBuf {
        self.task_dir(task_id).join(PIECES_FILE)
    }

    fn data_path(&self, task_id: &str) -> PathBuf {
        self.task_dir(task_id).join(DATA_FILE)
    }

    /// Task ids present under the store root, unordered.
    pub fn list_task_ids(&self) -> StoreResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(StoreError::Io)? {
            let entry = entry.map_err(StoreError::Io)?;
            if entry.file_type().map_err(StoreError::Io)?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        Ok(ids)
    }

    /// Destroy all artifacts for a task id. Missing artifacts are fine.
    pub fn remove_task(&self, task_id: &str) -> StoreResult<()> {
        let _guard = self.locks.acquire(task_id);
        match fs::remove_dir_all(self.task_dir(task_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Write `data` into the blob at `offset`, used by the seeding pipeline
    /// as pieces arrive. The blob grows as needed.
    pub fn write_data_at(&self, task_id: &str, offset: u64, data: &[u8]) -> StoreResult<()> {
        let _guard = self.locks.acquire(task_id);
        fs::create_dir_all(self.task_dir(task_id)).map_err(StoreError::Io)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(self.data_path(task_id))
            .map_err(StoreError::Io)?;
        write_at(&file, offset, data).map_err(StoreError::Io)
    }

    /// Atomic document replace: write a sibling temp file, then rename.
    fn replace_file(&self, path: &Path, contents: &[u8]) -> StoreResult<()> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents).map_err(StoreError::Io)?;
        fs::rename(&tmp, path).map_err(StoreError::Io)?;
        Ok(())
    }

    fn write_metadata(&self, task_id: &str, metadata: &FileMetadata) -> StoreResult<()> {
        let json = serde_json::to_vec(metadata)
            .map_err(|e| StoreError::Corrupt(format!("encode metadata: {e}")))?;
        self.replace_file(&self.metadata_path(task_id), &json)
    }

    fn read_metadata_locked(&self, task_id: &str) -> StoreResult<FileMetadata> {
        let bytes = fs::read(self.metadata_path(task_id))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupt(format!("decode metadata: {e}")))
    }
}

#[cfg(unix)]
fn write_at(file: &File, offset: u64, data: &[u8]) -> std::io::Result<()> {
    file.write_all_at(data, offset)
}

#[cfg(not(unix))]
fn write_at(file: &File, offset: u64, data: &[u8]) -> std::io::Result<()> {
    use std::io::{Seek, SeekFrom};
    let mut f = file.try_clone()?;
    f.seek(SeekFrom::Start(offset))?;
    f.write_all(data)
}

impl StorageEngine for DiskStore {
    type DataReader = DiskDataReader;

    fn read_file_metadata(&self, task_id: &str) -> StoreResult<FileMetadata> {
        let _guard = self.locks.acquire(task_id);
        self.read_metadata_locked(task_id)
    }

    fn write_file_metadata_by_task(&self, task: &SeedTask) -> StoreResult<FileMetadata> {
        let _guard = self.locks.acquire(&task.id);
        fs::create_dir_all(self.task_dir(&task.id)).map_err(StoreError::Io)?;
        let metadata = FileMetadata::for_task(task, current_millis());
        self.write_metadata(&task.id, &metadata)?;
        // Fresh journal and blob, so a follow-up detection walks an empty
        // journal instead of tripping over missing artifacts.
        for path in [self.pieces_path(&task.id), self.data_path(&task.id)] {
            if !path.exists() {
                File::create(&path).map_err(StoreError::Io)?;
            }
        }
        Ok(metadata)
    }

    fn piece_md5_sign(&self, task_id: &str) -> StoreResult<(String, Vec<PieceMetaRecord>)> {
        let records = self.read_piece_meta_records(task_id)?;
        let sign = digest::piece_md5_sign(records.iter().map(|r| r.md5.as_str()));
        Ok((sign, records))
    }

    fn stat_download_file(&self, task_id: &str) -> StoreResult<StorageInfo> {
        let _guard = self.locks.acquire(task_id);
        let meta = fs::metadata(self.data_path(task_id))?;
        Ok(StorageInfo { size: meta.len() })
    }

    fn read_download_file(&self, task_id: &str) -> StoreResult<Self::DataReader> {
        let guard = self.locks.acquire(task_id);
        let file = File::open(self.data_path(task_id))?;
        Ok(DiskDataReader {
            inner: BufReader::new(file),
            _guard: guard,
        })
    }

    fn read_piece_meta_records(&self, task_id: &str) -> StoreResult<Vec<PieceMetaRecord>> {
        let _guard = self.locks.acquire(task_id);
        let contents = match fs::read_to_string(self.pieces_path(task_id)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };
        let mut records = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PieceMetaRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    // A torn trailing line (crash mid-append) ends the journal.
                    tracing::warn!(
                        task.id = %task_id,
                        "undecodable journal line after {} records, truncating: {}",
                        records.len(),
                        e
                    );
                    break;
                }
            }
        }
        Ok(records)
    }

    fn write_piece_meta_records(
        &self,
        task_id: &str,
        records: &[PieceMetaRecord],
    ) -> StoreResult<()> {
        let _guard = self.locks.acquire(task_id);
        fs::create_dir_all(self.task_dir(task_id)).map_err(StoreError::Io)?;
        let mut contents = Vec::new();
        for record in records {
            serde_json::to_writer(&mut contents, record)
                .map_err(|e| StoreError::Corrupt(format!("encode journal: {e}")))?;
            contents.push(b'\n');
        }
        self.replace_file(&self.pieces_path(task_id), &contents)
    }

    fn append_piece_meta_record(
        &self,
        task_id: &str,
        record: &PieceMetaRecord,
    ) -> StoreResult<()> {
        let _guard = self.locks.acquire(task_id);
        fs::create_dir_all(self.task_dir(task_id)).map_err(StoreError::Io)?;
        let mut line = serde_json::to_vec(record)
            .map_err(|e| StoreError::Corrupt(format!("encode journal: {e}")))?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.pieces_path(task_id))
            .map_err(StoreError::Io)?;
        file.write_all(&line).map_err(StoreError::Io)
    }

    fn reset_repo(&self, task: &SeedTask) -> StoreResult<()> {
        self.remove_task(&task.id)
    }

    fn update_access_time(&self, task_id: &str, millis: u64) -> StoreResult<()> {
        let _guard = self.locks.acquire(task_id);
        let mut metadata = self.read_metadata_locked(task_id)?;
        metadata.access_time = millis;
        self.write_metadata(task_id, &metadata)
    }
}
