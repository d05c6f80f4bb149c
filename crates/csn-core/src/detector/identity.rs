//! Field-by-field comparison of a task against its persisted record.

use std::fmt;

use crate::storage::FileMetadata;
use crate::task::SeedTask;

/// Identity drift between a task and its stored metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityMismatch {
    pub field: &'static str,
    pub stored: String,
    pub requested: String,
}

impl fmt::Display for IdentityMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "metadata {} ({}) does not match task {} ({})",
            self.field, self.stored, self.field, self.requested
        )
    }
}

/// Compare the identity fields in order; the first inequality wins.
///
/// Pure function: `check_identity(task, FileMetadata::for_task(task, _))`
/// always passes.
pub fn check_identity(task: &SeedTask, metadata: &FileMetadata) -> Result<(), IdentityMismatch> {
    fn mismatch(
        field: &'static str,
        stored: impl ToString,
        requested: impl ToString,
    ) -> Result<(), IdentityMismatch> {
        Err(IdentityMismatch {
            field,
            stored: stored.to_string(),
            requested: requested.to_string(),
        })
    }

    if metadata.task_id != task.id {
        return mismatch("task_id", &metadata.task_id, &task.id);
    }
    if metadata.task_url != task.task_url {
        return mismatch("task_url", &metadata.task_url, &task.task_url);
    }
    if metadata.piece_size != task.piece_size {
        return mismatch("piece_size", metadata.piece_size, task.piece_size);
    }
    if metadata.range != task.range {
        return mismatch("range", &metadata.range, &task.range);
    }
    if metadata.digest != task.digest {
        return mismatch("digest", &metadata.digest, &task.digest);
    }
    if metadata.tag != task.tag {
        return mismatch("tag", &metadata.tag, &task.tag);
    }
    if metadata.filter != task.filter {
        return mismatch("filter", &metadata.filter, &task.filter);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn task() -> SeedTask {
        SeedTask::new(
            "http://origin/file.bin?sig=x",
            HashMap::new(),
            4096,
            "0-99",
            "d1",
            "t1",
            "sig",
        )
    }

    #[test]
    fn derived_metadata_always_matches() {
        let task = task();
        let metadata = FileMetadata::for_task(&task, 0);
        assert_eq!(check_identity(&task, &metadata), Ok(()));
    }

    #[test]
    fn first_drifted_field_is_reported() {
        let task = task();
        let mut metadata = FileMetadata::for_task(&task, 0);
        metadata.task_url = "http://origin/other".to_string();
        metadata.tag = "t2".to_string();
        let err = check_identity(&task, &metadata).unwrap_err();
        assert_eq!(err.field, "task_url");
        assert_eq!(err.stored, "http://origin/other");
        assert_eq!(err.requested, task.task_url);
    }

    #[test]
    fn every_identity_field_is_compared() {
        let task = task();
        let drifts: [(&str, fn(&mut FileMetadata)); 7] = [
            ("task_id", |m| m.task_id.push('x')),
            ("task_url", |m| m.task_url.push('x')),
            ("piece_size", |m| m.piece_size += 1),
            ("range", |m| m.range.push('x')),
            ("digest", |m| m.digest.push('x')),
            ("tag", |m| m.tag.push('x')),
            ("filter", |m| m.filter.push('x')),
        ];
        for (field, drift) in drifts {
            let mut metadata = FileMetadata::for_task(&task, 0);
            drift(&mut metadata);
            let err = check_identity(&task, &metadata).unwrap_err();
            assert_eq!(err.field, field, "drift in {} must be caught", field);
        }
    }

    #[test]
    fn non_identity_fields_are_ignored() {
        let task = task();
        let mut metadata = FileMetadata::for_task(&task, 0);
        metadata.finish = true;
        metadata.success = true;
        metadata.cdn_file_length = 999;
        metadata.access_time = 42;
        assert_eq!(check_identity(&task, &metadata), Ok(()));
    }
}
