/// Task manager (spec.md C10): tracks in-flight upload/download
/// coroutines, enforces `MaxSessions`, and reconciles task state left
/// behind by a prior crash on startup.
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::download::{DownloadCommand, DownloadPipeline, DownloadProgress};
use crate::error::{DfsError, DfsResult};
use crate::models::TaskStatus;
use crate::task_store::TaskStore;
use crate::temp_store::TempShardStore;
use crate::upload::{UploadCommand, UploadPipeline, UploadProgress};

enum TaskHandle {
    Upload(mpsc::Sender<UploadCommand>),
    Download(mpsc::Sender<DownloadCommand>),
}

pub struct TaskManager {
    max_sessions: usize,
    handles: Mutex<HashMap<String, TaskHandle>>,
    task_store: Arc<TaskStore>,
    temp_store: Arc<TempShardStore>,
}

impl TaskManager {
    pub fn new(max_sessions: usize, task_store: Arc<TaskStore>, temp_store: Arc<TempShardStore>) -> Self {
        Self {
            max_sessions,
            handles: Mutex::new(HashMap::new()),
            task_store,
            temp_store,
        }
    }

    /// On startup: anything left `InProgress` didn't get a clean shutdown,
    /// so it's marked `Failed` and its staged shards are purged. Callers
    /// can re-trigger it from `Failed` if they want to retry.
    pub async fn reconcile_on_startup(&self) -> DfsResult<()> {
        let mut known_task_ids = Vec::new();

        for task in self.task_store.list_upload_tasks()? {
            known_task_ids.push(task.task_id.clone());
            if task.status == TaskStatus::InProgress {
                tracing::warn!("reconciling orphaned upload task {} as failed", task.task_id);
                self.task_store
                    .validate_and_update_upload_status(&task.task_id, TaskStatus::Failed, crate::util::now_unix())
                    .ok();
                self.temp_store.purge_task(&task.task_id).await?;
            }
        }

        let orphans_removed = self.temp_store.purge_orphans(&known_task_ids).await?;
        if orphans_removed > 0 {
            tracing::info!("purged {} orphaned staged shard files", orphans_removed);
        }
        Ok(())
    }

    async fn reserve_slot(&self) -> DfsResult<()> {
        let handles = self.handles.lock().await;
        if handles.len() >= self.max_sessions {
            return Err(DfsError::Capacity(format!(
                "max concurrent sessions ({}) reached",
                self.max_sessions
            )));
        }
        Ok(())
    }

    pub async fn spawn_upload(
        &self,
        pipeline: UploadPipeline,
        meta: crate::models::FileMeta,
        file_secret: [u8; 32],
        shamir_shares: Vec<Vec<u8>>,
        owner_security: (String, String),
    ) -> DfsResult<mpsc::Receiver<UploadProgress>> {
        self.reserve_slot().await?;

        let task_id = pipeline.task_id.clone();
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (progress_tx, progress_rx) = mpsc::channel(64);

        self.handles.lock().await.insert(task_id.clone(), TaskHandle::Upload(cmd_tx));

        tokio::spawn(async move {
            pipeline.run(meta, file_secret, shamir_shares, owner_security, cmd_rx, progress_tx).await;
        });

        Ok(progress_rx)
    }

    pub async fn spawn_download(&self, pipeline: DownloadPipeline) -> DfsResult<mpsc::Receiver<DownloadProgress>> {
        self.reserve_slot().await?;

        let task_id = pipeline.task_id.clone();
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (progress_tx, progress_rx) = mpsc::channel(64);

        self.handles.lock().await.insert(task_id.clone(), TaskHandle::Download(cmd_tx));

        tokio::spawn(async move {
            pipeline.run(cmd_rx, progress_tx).await;
        });

        Ok(progress_rx)
    }

    async fn send_upload_command(&self, task_id: &str, command: UploadCommand) -> DfsResult<()> {
        let handles = self.handles.lock().await;
        match handles.get(task_id) {
            Some(TaskHandle::Upload(tx)) => tx
                .send(command)
                .await
                .map_err(|_| DfsError::NotFound(format!("upload task {} is no longer running", task_id))),
            Some(TaskHandle::Download(_)) => Err(DfsError::PreconditionFailed(format!("{} is a download task", task_id))),
            None => Err(DfsError::NotFound(format!("no running task {}", task_id))),
        }
    }

    async fn send_download_command(&self, task_id: &str, command: DownloadCommand) -> DfsResult<()> {
        let handles = self.handles.lock().await;
        match handles.get(task_id) {
            Some(TaskHandle::Download(tx)) => tx
                .send(command)
                .await
                .map_err(|_| DfsError::NotFound(format!("download task {} is no longer running", task_id))),
            Some(TaskHandle::Upload(_)) => Err(DfsError::PreconditionFailed(format!("{} is an upload task", task_id))),
            None => Err(DfsError::NotFound(format!("no running task {}", task_id))),
        }
    }

    pub async fn pause_upload(&self, task_id: &str) -> DfsResult<()> {
        self.send_upload_command(task_id, UploadCommand::Pause).await
    }

    pub async fn resume_upload(&self, task_id: &str) -> DfsResult<()> {
        self.send_upload_command(task_id, UploadCommand::Resume).await
    }

    pub async fn cancel_upload(&self, task_id: &str) -> DfsResult<()> {
        self.send_upload_command(task_id, UploadCommand::Cancel).await
    }

    pub async fn delete_upload(&self, task_id: &str) -> DfsResult<()> {
        self.send_upload_command(task_id, UploadCommand::Delete).await
    }

    pub async fn pause_download(&self, task_id: &str) -> DfsResult<()> {
        self.send_download_command(task_id, DownloadCommand::Pause).await
    }

    pub async fn resume_download(&self, task_id: &str) -> DfsResult<()> {
        self.send_download_command(task_id, DownloadCommand::Resume).await
    }

    pub async fn cancel_download(&self, task_id: &str) -> DfsResult<()> {
        self.send_download_command(task_id, DownloadCommand::Cancel).await
    }

    /// Drops the bookkeeping handle for a task once its coroutine has
    /// exited, freeing a `MaxSessions` slot.
    pub async fn retire(&self, task_id: &str) {
        self.handles.lock().await.remove(task_id);
    }
}
