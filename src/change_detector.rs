//! The Change Detector (§4.C). Joins scanner output with the catalog's live
//! file set for a tenant and emits a `SyncPlan`.

use std::collections::HashMap;

use crate::models::{FileChange, FileRecord, ScannedFile, SyncPlan};

pub struct ChangeDetector;

impl ChangeDetector {
    /// `force_full_sync`: every catalog file is emitted as `Updated`
    /// regardless of whether its hash changed, triggering reprocessing.
    /// This is also how a permanently `failed` file becomes eligible for
    /// another attempt (see SPEC_FULL.md §3).
    pub fn detect(
        scanned: &[ScannedFile],
        catalog_files: &[FileRecord],
        force_full_sync: bool,
    ) -> SyncPlan {
        let fs_map: HashMap<&str, &ScannedFile> = scanned
            .iter()
            .map(|f| (f.relative_path.as_str(), f))
            .collect();
        let db_map: HashMap<&str, &FileRecord> = catalog_files
            .iter()
            .map(|f| (f.relative_path.as_str(), f))
            .collect();

        let mut changes = Vec::new();

        for (path, fs_record) in &fs_map {
            match db_map.get(path) {
                None => changes.push(FileChange::Created {
                    relative_path: (*path).to_owned(),
                    new_hash: fs_record.content_hash.clone(),
                    size_bytes: fs_record.size_bytes,
                }),
                Some(db_record) => {
                    if force_full_sync || db_record.content_hash != fs_record.content_hash {
                        changes.push(FileChange::Updated {
                            relative_path: (*path).to_owned(),
                            file_id: db_record.id,
                            old_hash: db_record.content_hash.clone(),
                            new_hash: fs_record.content_hash.clone(),
                            size_bytes: fs_record.size_bytes,
                        });
                    }
                }
            }
        }

        for (path, db_record) in &db_map {
            if !fs_map.contains_key(path) {
                changes.push(FileChange::Deleted {
                    relative_path: (*path).to_owned(),
                    file_id: db_record.id,
                    old_hash: db_record.content_hash.clone(),
                });
            }
        }

        SyncPlan { changes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn db_file(path: &str, hash: &str) -> FileRecord {
        FileRecord {
            id: uuid::Uuid::new_v4(),
            tenant_slug: "acme".into(),
            filename: path.into(),
            relative_path: path.into(),
            size_bytes: 10,
            content_hash: hash.into(),
            mime_type: "text/plain".into(),
            sync_status: crate::models::FileSyncStatus::Synced,
            sync_started_at: None,
            sync_completed_at: None,
            sync_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn scanned(path: &str, hash: &str) -> ScannedFile {
        ScannedFile {
            relative_path: path.into(),
            size_bytes: 10,
            content_hash: hash.into(),
        }
    }

    #[test]
    fn new_file_is_created() {
        let plan = ChangeDetector::detect(&[scanned("a.txt", "h1")], &[], false);
        assert_eq!(plan.total_changes(), 1);
        assert!(matches!(plan.changes[0], FileChange::Created { .. }));
    }

    #[test]
    fn changed_hash_is_updated() {
        let plan = ChangeDetector::detect(&[scanned("a.txt", "h2")], &[db_file("a.txt", "h1")], false);
        assert_eq!(plan.total_changes(), 1);
        assert!(matches!(plan.changes[0], FileChange::Updated { .. }));
    }

    #[test]
    fn missing_file_is_deleted() {
        let plan = ChangeDetector::detect(&[], &[db_file("a.txt", "h1")], false);
        assert_eq!(plan.total_changes(), 1);
        assert!(matches!(plan.changes[0], FileChange::Deleted { .. }));
    }

    #[test]
    fn unchanged_file_is_a_no_op() {
        let plan = ChangeDetector::detect(&[scanned("a.txt", "h1")], &[db_file("a.txt", "h1")], false);
        assert_eq!(plan.total_changes(), 0);
    }

    #[test]
    fn force_full_sync_reprocesses_unchanged_files() {
        let plan = ChangeDetector::detect(&[scanned("a.txt", "h1")], &[db_file("a.txt", "h1")], true);
        assert_eq!(plan.total_changes(), 1);
        assert!(matches!(plan.changes[0], FileChange::Updated { .. }));
    }
}
