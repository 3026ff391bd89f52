/// Task and shard persistence backed by SQLite (spec.md §5, C5).
///
/// Mirrors the teacher's `DatabaseManager` pattern: a thin wrapper around a
/// single `rusqlite::Connection`, `CREATE TABLE IF NOT EXISTS` at open time,
/// and one method per query with row-mapper closures.
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::error::{DfsError, DfsResult};
use crate::models::{
    DownloadTaskRecord, FileAssetRecord, FileSegmentStorage, PieceInfo, ShardStatus, StorageMode, TaskStatus,
    UploadShardRecord, UploadTaskRecord,
};

pub struct TaskStore {
    conn: Connection,
}

impl TaskStore {
    pub fn open(path: impl AsRef<Path>) -> DfsResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> DfsResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> DfsResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS upload_tasks (
                task_id      TEXT PRIMARY KEY,
                file_id      TEXT NOT NULL,
                file_name    TEXT NOT NULL,
                file_size    INTEGER NOT NULL,
                storage_mode TEXT NOT NULL,
                status       TEXT NOT NULL,
                created_at   INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS upload_segments (
                task_id       TEXT NOT NULL,
                segment_index INTEGER NOT NULL,
                segment_id    TEXT NOT NULL,
                peer_id       TEXT,
                crc32         INTEGER NOT NULL,
                is_parity     INTEGER NOT NULL,
                status        TEXT NOT NULL DEFAULT 'pending',
                PRIMARY KEY (task_id, segment_index)
            );

            CREATE TABLE IF NOT EXISTS file_assets (
                file_id           TEXT PRIMARY KEY,
                owner_pubkey_hash TEXT NOT NULL,
                file_name         TEXT NOT NULL,
                file_size         INTEGER NOT NULL,
                content_type      TEXT NOT NULL,
                sha256_hash       TEXT NOT NULL,
                storage_mode      TEXT NOT NULL,
                created_at        INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS shared_grants (
                file_id      TEXT NOT NULL,
                grantee_md5  TEXT NOT NULL,
                expires_at   INTEGER NOT NULL,
                PRIMARY KEY (file_id, grantee_md5)
            );

            CREATE TABLE IF NOT EXISTS download_tasks (
                task_id     TEXT PRIMARY KEY,
                file_id     TEXT NOT NULL,
                destination TEXT NOT NULL,
                status      TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS download_pieces (
                task_id       TEXT NOT NULL,
                segment_index INTEGER NOT NULL,
                segment_id    TEXT NOT NULL,
                peer_id       TEXT,
                retrieved     INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (task_id, segment_index)
            );

            CREATE TABLE IF NOT EXISTS file_segment_storage (
                file_id       TEXT NOT NULL,
                segment_index INTEGER NOT NULL,
                segment_id    TEXT NOT NULL,
                peer_id       TEXT NOT NULL,
                PRIMARY KEY (file_id, segment_index, peer_id)
            );
            ",
        )?;
        Ok(())
    }

    // -- upload tasks --------------------------------------------------

    pub fn insert_upload_task(&self, task: &UploadTaskRecord) -> DfsResult<()> {
        self.conn.execute(
            "INSERT INTO upload_tasks
             (task_id, file_id, file_name, file_size, storage_mode, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                task.task_id,
                task.file_id,
                task.file_name,
                task.file_size,
                storage_mode_to_string(&task.storage_mode),
                status_to_string(task.status),
                task.created_at,
                task.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_upload_task(&self, task_id: &str) -> DfsResult<Option<UploadTaskRecord>> {
        self.conn
            .query_row(
                "SELECT task_id, file_id, file_name, file_size, storage_mode, status, created_at, updated_at
                 FROM upload_tasks WHERE task_id = ?1",
                params![task_id],
                row_to_upload_task,
            )
            .optional()
            .map_err(DfsError::from)
    }

    pub fn list_upload_tasks(&self) -> DfsResult<Vec<UploadTaskRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT task_id, file_id, file_name, file_size, storage_mode, status, created_at, updated_at
             FROM upload_tasks ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_upload_task)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DfsError::from)
    }

    /// Updates an upload task's status only if the transition is legal per
    /// [`TaskStatus::can_transition_to`], returning whether it applied.
    pub fn validate_and_update_upload_status(
        &self,
        task_id: &str,
        next: TaskStatus,
        updated_at: i64,
    ) -> DfsResult<bool> {
        let Some(current) = self.get_upload_task(task_id)? else {
            return Err(DfsError::NotFound(format!("upload task {} not found", task_id)));
        };
        if !current.status.can_transition_to(next) {
            return Err(DfsError::PreconditionFailed(format!(
                "cannot move upload task {} from {:?} to {:?}",
                task_id, current.status, next
            )));
        }
        let updated = self.conn.execute(
            "UPDATE upload_tasks SET status = ?1, updated_at = ?2 WHERE task_id = ?3",
            params![status_to_string(next), updated_at, task_id],
        )?;
        Ok(updated > 0)
    }

    // -- upload segments -------------------------------------------------

    pub fn upsert_upload_segment(&self, segment: &UploadShardRecord) -> DfsResult<()> {
        self.conn.execute(
            "INSERT INTO upload_segments (task_id, segment_index, segment_id, peer_id, crc32, is_parity, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(task_id, segment_index) DO UPDATE SET
                segment_id = excluded.segment_id,
                peer_id = excluded.peer_id,
                crc32 = excluded.crc32,
                is_parity = excluded.is_parity,
                status = excluded.status",
            params![
                segment.task_id,
                segment.segment_index,
                segment.segment_id,
                segment.peer_id,
                segment.crc32,
                segment.is_parity,
                shard_status_to_string(segment.status),
            ],
        )?;
        Ok(())
    }

    pub fn list_upload_segments(&self, task_id: &str) -> DfsResult<Vec<UploadShardRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT task_id, segment_index, segment_id, peer_id, crc32, is_parity, status
             FROM upload_segments WHERE task_id = ?1 ORDER BY segment_index",
        )?;
        let rows = stmt.query_map(params![task_id], row_to_upload_segment)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DfsError::from)
    }

    /// Updates just the status of one shard, used as dispatch/transfer/verify
    /// each complete their stage of the upload pipeline.
    pub fn update_segment_status(&self, task_id: &str, segment_index: i64, status: ShardStatus) -> DfsResult<()> {
        let updated = self.conn.execute(
            "UPDATE upload_segments SET status = ?1 WHERE task_id = ?2 AND segment_index = ?3",
            params![shard_status_to_string(status), task_id, segment_index],
        )?;
        if updated == 0 {
            return Err(DfsError::NotFound(format!(
                "upload segment {}/{} not found",
                task_id, segment_index
            )));
        }
        Ok(())
    }

    pub fn get_upload_segments_by_status(&self, task_id: &str, status: ShardStatus) -> DfsResult<Vec<UploadShardRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT task_id, segment_index, segment_id, peer_id, crc32, is_parity, status
             FROM upload_segments WHERE task_id = ?1 AND status = ?2 ORDER BY segment_index",
        )?;
        let rows = stmt.query_map(params![task_id, shard_status_to_string(status)], row_to_upload_segment)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DfsError::from)
    }

    pub fn get_upload_segment_by_task_id_and_index(
        &self,
        task_id: &str,
        segment_index: i64,
    ) -> DfsResult<Option<UploadShardRecord>> {
        self.conn
            .query_row(
                "SELECT task_id, segment_index, segment_id, peer_id, crc32, is_parity, status
                 FROM upload_segments WHERE task_id = ?1 AND segment_index = ?2",
                params![task_id, segment_index],
                row_to_upload_segment,
            )
            .optional()
            .map_err(DfsError::from)
    }

    /// Deletes every shard record belonging to a task, run at Finalize once
    /// the task's [`FileAssetRecord`] has been written.
    pub fn delete_upload_segments(&self, task_id: &str) -> DfsResult<()> {
        self.conn
            .execute("DELETE FROM upload_segments WHERE task_id = ?1", params![task_id])?;
        Ok(())
    }

    // -- file asset catalog ----------------------------------------------

    pub fn insert_file_asset(&self, asset: &FileAssetRecord) -> DfsResult<()> {
        self.conn.execute(
            "INSERT INTO file_assets
             (file_id, owner_pubkey_hash, file_name, file_size, content_type, sha256_hash, storage_mode, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(file_id) DO UPDATE SET
                owner_pubkey_hash = excluded.owner_pubkey_hash,
                file_name = excluded.file_name,
                file_size = excluded.file_size,
                content_type = excluded.content_type,
                sha256_hash = excluded.sha256_hash,
                storage_mode = excluded.storage_mode,
                created_at = excluded.created_at",
            params![
                asset.file_id,
                asset.owner_pubkey_hash,
                asset.file_name,
                asset.file_size,
                asset.content_type,
                asset.sha256_hash,
                storage_mode_to_string(&asset.storage_mode),
                asset.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_file_asset(&self, file_id: &str) -> DfsResult<Option<FileAssetRecord>> {
        self.conn
            .query_row(
                "SELECT file_id, owner_pubkey_hash, file_name, file_size, content_type, sha256_hash, storage_mode, created_at
                 FROM file_assets WHERE file_id = ?1",
                params![file_id],
                row_to_file_asset,
            )
            .optional()
            .map_err(DfsError::from)
    }

    // -- shared-access grants ---------------------------------------------

    /// Records that `grantee_md5` (the MD5 of a requester's pubkey-hash) may
    /// download `file_id` until `expires_at`, as checked by the download
    /// checklist responder for shards with `shared = true`.
    pub fn record_shared_grant(&self, file_id: &str, grantee_md5: &str, expires_at: i64) -> DfsResult<()> {
        self.conn.execute(
            "INSERT INTO shared_grants (file_id, grantee_md5, expires_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(file_id, grantee_md5) DO UPDATE SET expires_at = excluded.expires_at",
            params![file_id, grantee_md5, expires_at],
        )?;
        Ok(())
    }

    pub fn shared_grant_valid(&self, file_id: &str, grantee_md5: &str, now: i64) -> DfsResult<bool> {
        let expires_at: Option<i64> = self
            .conn
            .query_row(
                "SELECT expires_at FROM shared_grants WHERE file_id = ?1 AND grantee_md5 = ?2",
                params![file_id, grantee_md5],
                |row| row.get(0),
            )
            .optional()?;
        Ok(expires_at.map(|expiry| expiry > now).unwrap_or(false))
    }

    // -- download tasks ----------------------------------------------------

    pub fn insert_download_task(&self, task: &DownloadTaskRecord) -> DfsResult<()> {
        self.conn.execute(
            "INSERT INTO download_tasks (task_id, file_id, destination, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                task.task_id,
                task.file_id,
                task.destination,
                status_to_string(task.status),
                task.created_at,
                task.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_download_task(&self, task_id: &str) -> DfsResult<Option<DownloadTaskRecord>> {
        self.conn
            .query_row(
                "SELECT task_id, file_id, destination, status, created_at, updated_at
                 FROM download_tasks WHERE task_id = ?1",
                params![task_id],
                row_to_download_task,
            )
            .optional()
            .map_err(DfsError::from)
    }

    pub fn validate_and_update_download_status(
        &self,
        task_id: &str,
        next: TaskStatus,
        updated_at: i64,
    ) -> DfsResult<bool> {
        let Some(current) = self.get_download_task(task_id)? else {
            return Err(DfsError::NotFound(format!("download task {} not found", task_id)));
        };
        if !current.status.can_transition_to(next) {
            return Err(DfsError::PreconditionFailed(format!(
                "cannot move download task {} from {:?} to {:?}",
                task_id, current.status, next
            )));
        }
        let updated = self.conn.execute(
            "UPDATE download_tasks SET status = ?1, updated_at = ?2 WHERE task_id = ?3",
            params![status_to_string(next), updated_at, task_id],
        )?;
        Ok(updated > 0)
    }

    // -- download pieces -----------------------------------------------

    pub fn upsert_download_piece(&self, piece: &PieceInfo) -> DfsResult<()> {
        self.conn.execute(
            "INSERT INTO download_pieces (task_id, segment_index, segment_id, peer_id, retrieved)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(task_id, segment_index) DO UPDATE SET
                segment_id = excluded.segment_id,
                peer_id = excluded.peer_id,
                retrieved = excluded.retrieved",
            params![piece.task_id, piece.segment_index, piece.segment_id, piece.peer_id, piece.retrieved],
        )?;
        Ok(())
    }

    pub fn list_download_pieces(&self, task_id: &str) -> DfsResult<Vec<PieceInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT task_id, segment_index, segment_id, peer_id, retrieved
             FROM download_pieces WHERE task_id = ?1 ORDER BY segment_index",
        )?;
        let rows = stmt.query_map(params![task_id], row_to_piece_info)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DfsError::from)
    }

    // -- file/segment location map --------------------------------------

    pub fn record_file_segment_storage(&self, entry: &FileSegmentStorage) -> DfsResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO file_segment_storage (file_id, segment_index, segment_id, peer_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.file_id, entry.segment_index, entry.segment_id, entry.peer_id],
        )?;
        Ok(())
    }

    pub fn remove_file_segment_storage(&self, file_id: &str, segment_index: i64, peer_id: &str) -> DfsResult<()> {
        self.conn.execute(
            "DELETE FROM file_segment_storage WHERE file_id = ?1 AND segment_index = ?2 AND peer_id = ?3",
            params![file_id, segment_index, peer_id],
        )?;
        Ok(())
    }

    pub fn list_file_segment_storage(&self, file_id: &str) -> DfsResult<Vec<FileSegmentStorage>> {
        let mut stmt = self.conn.prepare(
            "SELECT file_id, segment_index, segment_id, peer_id
             FROM file_segment_storage WHERE file_id = ?1 ORDER BY segment_index",
        )?;
        let rows = stmt.query_map(params![file_id], row_to_segment_storage)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DfsError::from)
    }
}

fn storage_mode_to_string(mode: &StorageMode) -> String {
    match mode {
        StorageMode::File => "file".to_string(),
        StorageMode::Slice => "slice".to_string(),
        StorageMode::RsSize { k, m } => format!("rs_size:{}:{}", k, m),
        StorageMode::RsProportion { ratio } => format!("rs_proportion:{}", ratio),
    }
}

fn storage_mode_from_string(s: &str) -> DfsResult<StorageMode> {
    if s == "file" {
        return Ok(StorageMode::File);
    }
    if s == "slice" {
        return Ok(StorageMode::Slice);
    }
    if let Some(rest) = s.strip_prefix("rs_size:") {
        let mut parts = rest.split(':');
        let k: usize = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| DfsError::Database(format!("bad storage_mode {}", s)))?;
        let m: usize = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| DfsError::Database(format!("bad storage_mode {}", s)))?;
        return Ok(StorageMode::RsSize { k, m });
    }
    if let Some(rest) = s.strip_prefix("rs_proportion:") {
        let ratio: f64 = rest
            .parse()
            .map_err(|_| DfsError::Database(format!("bad storage_mode {}", s)))?;
        return Ok(StorageMode::RsProportion { ratio });
    }
    Err(DfsError::Database(format!("unknown storage_mode {}", s)))
}

fn status_to_string(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Paused => "paused",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
    }
}

fn status_from_string(s: &str) -> DfsResult<TaskStatus> {
    Ok(match s {
        "pending" => TaskStatus::Pending,
        "in_progress" => TaskStatus::InProgress,
        "paused" => TaskStatus::Paused,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        "cancelled" => TaskStatus::Cancelled,
        other => return Err(DfsError::Database(format!("unknown status {}", other))),
    })
}

fn row_to_upload_task(row: &Row) -> rusqlite::Result<UploadTaskRecord> {
    let storage_mode_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    Ok(UploadTaskRecord {
        task_id: row.get(0)?,
        file_id: row.get(1)?,
        file_name: row.get(2)?,
        file_size: row.get(3)?,
        storage_mode: storage_mode_from_string(&storage_mode_str)
            .unwrap_or(StorageMode::File),
        status: status_from_string(&status_str).unwrap_or(TaskStatus::Failed),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn shard_status_to_string(status: ShardStatus) -> &'static str {
    match status {
        ShardStatus::Pending => "pending",
        ShardStatus::Uploading => "uploading",
        ShardStatus::Completed => "completed",
        ShardStatus::Failed => "failed",
    }
}

fn shard_status_from_string(s: &str) -> DfsResult<ShardStatus> {
    Ok(match s {
        "pending" => ShardStatus::Pending,
        "uploading" => ShardStatus::Uploading,
        "completed" => ShardStatus::Completed,
        "failed" => ShardStatus::Failed,
        other => return Err(DfsError::Database(format!("unknown shard status {}", other))),
    })
}

fn row_to_upload_segment(row: &Row) -> rusqlite::Result<UploadShardRecord> {
    let status_str: String = row.get(6)?;
    Ok(UploadShardRecord {
        task_id: row.get(0)?,
        segment_index: row.get(1)?,
        segment_id: row.get(2)?,
        peer_id: row.get(3)?,
        crc32: row.get(4)?,
        is_parity: row.get(5)?,
        status: shard_status_from_string(&status_str).unwrap_or(ShardStatus::Failed),
    })
}

fn row_to_file_asset(row: &Row) -> rusqlite::Result<FileAssetRecord> {
    let storage_mode_str: String = row.get(6)?;
    Ok(FileAssetRecord {
        file_id: row.get(0)?,
        owner_pubkey_hash: row.get(1)?,
        file_name: row.get(2)?,
        file_size: row.get(3)?,
        content_type: row.get(4)?,
        sha256_hash: row.get(5)?,
        storage_mode: storage_mode_from_string(&storage_mode_str).unwrap_or(StorageMode::File),
        created_at: row.get(7)?,
    })
}

fn row_to_download_task(row: &Row) -> rusqlite::Result<DownloadTaskRecord> {
    let status_str: String = row.get(3)?;
    Ok(DownloadTaskRecord {
        task_id: row.get(0)?,
        file_id: row.get(1)?,
        destination: row.get(2)?,
        status: status_from_string(&status_str).unwrap_or(TaskStatus::Failed),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn row_to_piece_info(row: &Row) -> rusqlite::Result<PieceInfo> {
    Ok(PieceInfo {
        task_id: row.get(0)?,
        segment_index: row.get(1)?,
        segment_id: row.get(2)?,
        peer_id: row.get(3)?,
        retrieved: row.get(4)?,
    })
}

fn row_to_segment_storage(row: &Row) -> rusqlite::Result<FileSegmentStorage> {
    Ok(FileSegmentStorage {
        file_id: row.get(0)?,
        segment_index: row.get(1)?,
        segment_id: row.get(2)?,
        peer_id: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_upload_task() -> UploadTaskRecord {
        UploadTaskRecord {
            task_id: "task-1".into(),
            file_id: "file-1".into(),
            file_name: "photo.jpg".into(),
            file_size: 1024,
            storage_mode: StorageMode::RsSize { k: 4, m: 2 },
            status: TaskStatus::Pending,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    #[test]
    fn insert_and_fetch_upload_task_round_trips() {
        let store = TaskStore::open_in_memory().unwrap();
        store.insert_upload_task(&sample_upload_task()).unwrap();

        let fetched = store.get_upload_task("task-1").unwrap().unwrap();
        assert_eq!(fetched.file_name, "photo.jpg");
        assert_eq!(fetched.storage_mode, StorageMode::RsSize { k: 4, m: 2 });
        assert_eq!(fetched.status, TaskStatus::Pending);
    }

    #[test]
    fn status_transition_rejects_illegal_moves() {
        let store = TaskStore::open_in_memory().unwrap();
        store.insert_upload_task(&sample_upload_task()).unwrap();

        assert!(store
            .validate_and_update_upload_status("task-1", TaskStatus::InProgress, 2000)
            .unwrap());

        assert!(store
            .validate_and_update_upload_status("task-1", TaskStatus::Pending, 3000)
            .is_err());
    }

    #[test]
    fn upload_segments_upsert_by_index() {
        let store = TaskStore::open_in_memory().unwrap();
        store.insert_upload_task(&sample_upload_task()).unwrap();

        let segment = UploadShardRecord {
            task_id: "task-1".into(),
            segment_index: 0,
            segment_id: "seg-0".into(),
            peer_id: Some("peerA".into()),
            crc32: 42,
            is_parity: false,
            status: ShardStatus::Pending,
        };
        store.upsert_upload_segment(&segment).unwrap();

        let mut completed = segment.clone();
        completed.status = ShardStatus::Completed;
        store.upsert_upload_segment(&completed).unwrap();

        let rows = store.list_upload_segments("task-1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ShardStatus::Completed);
    }

    #[test]
    fn segments_by_status_and_finalize_deletion() {
        let store = TaskStore::open_in_memory().unwrap();
        store.insert_upload_task(&sample_upload_task()).unwrap();

        for i in 0..7i64 {
            let status = if i < 3 { ShardStatus::Completed } else { ShardStatus::Pending };
            store
                .upsert_upload_segment(&UploadShardRecord {
                    task_id: "task-1".into(),
                    segment_index: i,
                    segment_id: format!("seg-{i}"),
                    peer_id: Some("peerA".into()),
                    crc32: 0,
                    is_parity: false,
                    status,
                })
                .unwrap();
        }

        assert_eq!(store.get_upload_segments_by_status("task-1", ShardStatus::Completed).unwrap().len(), 3);
        assert_eq!(store.get_upload_segments_by_status("task-1", ShardStatus::Uploading).unwrap().len(), 0);
        assert_eq!(store.get_upload_segments_by_status("task-1", ShardStatus::Pending).unwrap().len(), 4);

        store.update_segment_status("task-1", 3, ShardStatus::Uploading).unwrap();
        assert_eq!(
            store
                .get_upload_segment_by_task_id_and_index("task-1", 3)
                .unwrap()
                .unwrap()
                .status,
            ShardStatus::Uploading
        );

        store.delete_upload_segments("task-1").unwrap();
        assert!(store.list_upload_segments("task-1").unwrap().is_empty());
    }

    #[test]
    fn file_asset_round_trips_and_shared_grant_expiry_is_honored() {
        let store = TaskStore::open_in_memory().unwrap();
        let asset = FileAssetRecord {
            file_id: "file-1".into(),
            owner_pubkey_hash: "abc123".into(),
            file_name: "photo.jpg".into(),
            file_size: 1024,
            content_type: "image/jpeg".into(),
            sha256_hash: "deadbeef".into(),
            storage_mode: StorageMode::RsSize { k: 4, m: 2 },
            created_at: 1000,
        };
        store.insert_file_asset(&asset).unwrap();
        let fetched = store.get_file_asset("file-1").unwrap().unwrap();
        assert_eq!(fetched.owner_pubkey_hash, "abc123");

        store.record_shared_grant("file-1", "grantee-md5", 2000).unwrap();
        assert!(store.shared_grant_valid("file-1", "grantee-md5", 1000).unwrap());
        assert!(!store.shared_grant_valid("file-1", "grantee-md5", 3000).unwrap());
        assert!(!store.shared_grant_valid("file-1", "other-grantee", 1000).unwrap());
    }
}
