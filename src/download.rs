/// Download pipeline (spec.md C7): mirrors the upload pipeline's channel-
/// driven coroutine shape, pulling shards back from storing peers,
/// reconstructing via erasure coding when some are missing, verifying the
/// owner's signature and the file's leading SHA-256 hash, then writing the
/// recovered file to its destination.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::checklist::{self, ChecklistRouter};
use crate::crypto;
use crate::envelope;
use crate::erasure::ErasureCoder;
use crate::error::{DfsError, DfsResult};
use crate::models::{DownloadTaskRecord, HashTable, PieceInfo, ShardEnvelope, StorageMode, TaskStatus};
use crate::network::NetworkHandle;
use crate::task_store::TaskStore;
use crate::temp_store::TempShardStore;
use crate::transport::{topics, TransportKind, TransportRequest};

pub enum DownloadCommand {
    Pause,
    Resume,
    Cancel,
}

#[derive(Debug, Clone)]
pub enum DownloadProgress {
    PieceRetrieved { segment_index: i64 },
    Completed { path: PathBuf },
    Failed { reason: String },
    Cancelled,
}

/// What the checklist exchange (spec.md §4.7 phases 1-2) learned about a
/// file before any shard content is pulled: the first custodian reply fills
/// in the file's own metadata, and every reply contributes to the map of
/// which peer holds which slice.
#[derive(Default)]
struct ChecklistOutcome {
    name: Option<String>,
    size: Option<i64>,
    hash_table: Option<HashTable>,
    slice_peers: HashMap<i64, String>,
}

pub struct DownloadPipeline {
    pub task_id: String,
    pub file_id: String,
    pub destination: PathBuf,
    pub storage_mode: StorageMode,
    pub shamir_k: u8,
    pub user_pubkey_hash: String,
    pub network: NetworkHandle,
    pub task_store: Arc<TaskStore>,
    pub temp_store: Arc<TempShardStore>,
    pub checklist_router: ChecklistRouter,
    pub max_retries: u32,
    pub retry_interval: Duration,
    /// Counts shards retrieved so far; the coroutine that pushes the count
    /// past the completion threshold is the one that runs `file_finalize`,
    /// guarded by `finalize_lock` so a concurrent late arrival can't race it.
    retrieved_count: AtomicU64,
    finalize_lock: Mutex<()>,
}

impl DownloadPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_id: String,
        file_id: String,
        destination: PathBuf,
        storage_mode: StorageMode,
        shamir_k: u8,
        user_pubkey_hash: String,
        network: NetworkHandle,
        task_store: Arc<TaskStore>,
        temp_store: Arc<TempShardStore>,
        checklist_router: ChecklistRouter,
        max_retries: u32,
        retry_interval: Duration,
    ) -> Self {
        Self {
            task_id,
            file_id,
            destination,
            storage_mode,
            shamir_k,
            user_pubkey_hash,
            network,
            task_store,
            temp_store,
            checklist_router,
            max_retries,
            retry_interval,
            retrieved_count: AtomicU64::new(0),
            finalize_lock: Mutex::new(()),
        }
    }

    /// Broadcasts a download-checklist request over gossipsub and merges
    /// custodian replies for up to `max_retries` rounds, one `retry_interval`
    /// wait each, until at least one slice location is known.
    async fn request_checklist(&self) -> DfsResult<ChecklistOutcome> {
        let mut rx = self.checklist_router.register(&self.file_id).await;
        let payload = checklist::FileDownloadRequestChecklistPayload {
            file_id: self.file_id.clone(),
            user_pubkey_hash: self.user_pubkey_hash.clone(),
        };
        let data = serde_json::to_vec(&payload)?;
        let mut outcome = ChecklistOutcome::default();

        for _attempt in 0..self.max_retries.max(1) {
            self.network.publish(topics::FILE_DOWNLOAD_REQUEST, data.clone()).await?;

            let deadline = tokio::time::Instant::now() + self.retry_interval;
            loop {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match tokio::time::timeout(remaining, rx.recv()).await {
                    Ok(Some(response)) => {
                        if outcome.name.is_none() {
                            outcome.name = response.name;
                            outcome.size = response.size;
                            outcome.hash_table = response.hash_table;
                        }
                        for index in response.available_slices {
                            outcome.slice_peers.entry(index).or_insert_with(|| response.responder_peer_id.clone());
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }

            if !outcome.slice_peers.is_empty() {
                break;
            }
        }
        self.checklist_router.unregister(&self.file_id).await;

        if outcome.slice_peers.is_empty() {
            return Err(DfsError::NotFound(format!("no custodians answered the checklist request for {}", self.file_id)));
        }
        Ok(outcome)
    }

    async fn fetch_piece(&self, peer_id: &str, segment_id: &str, segment_index: i64) -> DfsResult<ShardEnvelope> {
        let peer: libp2p::PeerId = peer_id.parse().map_err(|_| DfsError::Corruption(format!("bad peer id {}", peer_id)))?;

        let request = TransportRequest {
            kind: TransportKind::Forward,
            file_id: self.file_id.clone(),
            segment_id: segment_id.to_string(),
            segment_index,
            data: Vec::new(),
        };
        let response = self.network.send_transport_request(peer, request).await?;
        if !response.is_ok() {
            return Err(DfsError::NotFound(format!(
                "peer {} does not have shard {}: {}",
                peer, segment_id, response.msg
            )));
        }

        let envelope = envelope::decode_envelope(&response.data)?;
        envelope::verify_envelope(&envelope)?;
        Ok(envelope)
    }

    async fn run_inner(
        &self,
        mut cmd_rx: mpsc::Receiver<DownloadCommand>,
        progress_tx: &mpsc::Sender<DownloadProgress>,
    ) -> DfsResult<PathBuf> {
        let checklist = self.request_checklist().await?;
        let segment_ids: HashMap<i64, String> = checklist
            .hash_table
            .iter()
            .flatten()
            .map(|entry| (entry.index, entry.segment_id.clone()))
            .collect();

        let mut envelopes: HashMap<i64, ShardEnvelope> = HashMap::new();
        let mut paused = false;

        for (index, peer_id) in &checklist.slice_peers {
            loop {
                if let Ok(cmd) = cmd_rx.try_recv() {
                    match cmd {
                        DownloadCommand::Pause => paused = true,
                        DownloadCommand::Resume => paused = false,
                        DownloadCommand::Cancel => {
                            let _ = progress_tx.send(DownloadProgress::Cancelled).await;
                            return Err(DfsError::Cancelled(self.task_id.clone()));
                        }
                    }
                }
                if !paused {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }

            let segment_id = segment_ids.get(index).cloned().unwrap_or_else(|| format!("{}-{}", self.file_id, index));

            let retry_config = crate::resilience::RetryConfig {
                max_attempts: 3,
                initial_delay: std::time::Duration::from_millis(200),
                max_delay: std::time::Duration::from_secs(2),
                backoff_multiplier: 2.0,
            };
            let fetch_result = crate::resilience::retry_async(
                || self.fetch_piece(peer_id, &segment_id, *index),
                retry_config,
                &format!("fetch shard {}", segment_id),
            )
            .await;

            match fetch_result {
                Ok(envelope) => {
                    self.task_store.upsert_download_piece(&PieceInfo {
                        task_id: self.task_id.clone(),
                        segment_index: *index,
                        segment_id: envelope.segment_id.clone(),
                        peer_id: Some(peer_id.clone()),
                        retrieved: true,
                    })?;
                    envelopes.insert(*index, envelope);
                    self.retrieved_count.fetch_add(1, Ordering::SeqCst);
                    let _ = progress_tx.send(DownloadProgress::PieceRetrieved { segment_index: *index }).await;
                }
                Err(e) => {
                    tracing::warn!("failed to fetch shard from {}: {}", peer_id, e);
                }
            }
        }

        // Serializes the finalize step so a retry that arrives after this
        // coroutine already crossed the threshold doesn't finalize twice.
        let _guard = self.finalize_lock.lock().await;
        self.file_finalize(envelopes).await
    }

    async fn file_finalize(&self, mut envelopes: HashMap<i64, ShardEnvelope>) -> DfsResult<PathBuf> {
        if envelopes.is_empty() {
            return Err(DfsError::NotFound("no shards retrieved for file".into()));
        }

        let mut indices: Vec<i64> = envelopes.keys().copied().collect();
        indices.sort();
        let sample = envelopes.get(&indices[0]).unwrap();
        let meta = sample.meta.clone();

        let shamir_k = self.shamir_k;
        let shares: Vec<Vec<u8>> = indices
            .iter()
            .take(shamir_k as usize)
            .filter_map(|i| envelopes.get(i).map(|e| e.encryption_share.clone()))
            .collect();
        if shares.len() < shamir_k as usize {
            return Err(DfsError::Corruption("not enough shards to recombine file secret".into()));
        }
        let file_secret = crypto::shamir_combine(&shares, shamir_k)?;
        let file_secret: [u8; 32] = file_secret
            .try_into()
            .map_err(|_| DfsError::Corruption("recombined file secret has wrong length".into()))?;
        let gcm_key = crypto::derive_gcm_key(&file_secret);

        let expected_hash_bytes: [u8; 32] = hex::decode(&meta.sha256_hash)?
            .try_into()
            .map_err(|_| DfsError::Corruption("sha256_hash is not 32 bytes".into()))?;

        let plaintext = match self.storage_mode {
            StorageMode::File => {
                let envelope = envelopes.remove(&0).ok_or_else(|| DfsError::NotFound("missing sole shard".into()))?;
                let sealed = crypto::gcm_decrypt(&gcm_key, &envelope.content)?;
                let tagged = crypto::gzip_decompress(&sealed)?;
                crypto::strip_and_verify_leading_hash(&tagged, &expected_hash_bytes)?
            }
            StorageMode::Slice => {
                let mut out = Vec::new();
                for i in &indices {
                    let envelope = envelopes.get(i).unwrap();
                    let sealed = crypto::gcm_decrypt(&gcm_key, &envelope.content)?;
                    let tagged = crypto::gzip_decompress(&sealed)?;
                    out.extend(crypto::strip_and_verify_leading_hash(&tagged, &expected_hash_bytes)?);
                }
                out
            }
            StorageMode::RsSize { k, m } => {
                self.reconstruct_rs(&envelopes, &gcm_key, k, m, meta.size as usize, &expected_hash_bytes).await?
            }
            StorageMode::RsProportion { .. } => {
                let k = indices.iter().filter(|i| {
                    envelopes.get(i).map(|e| !e.hash_table.iter().any(|h| h.index == **i && h.is_parity)).unwrap_or(false)
                }).count().max(1);
                let m = indices.len().saturating_sub(k);
                self.reconstruct_rs(&envelopes, &gcm_key, k, m, meta.size as usize, &expected_hash_bytes).await?
            }
        };

        let computed_hash = hex::encode(crypto::sha256(&plaintext));
        if computed_hash != meta.sha256_hash {
            return Err(DfsError::Corruption("reassembled file failed sha256 check".into()));
        }

        if let Some(parent) = self.destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.destination, &plaintext).await?;

        Ok(self.destination.clone())
    }

    async fn reconstruct_rs(
        &self,
        envelopes: &HashMap<i64, ShardEnvelope>,
        gcm_key: &[u8; 16],
        k: usize,
        m: usize,
        original_len: usize,
        expected_hash: &[u8; 32],
    ) -> DfsResult<Vec<u8>> {
        let coder = ErasureCoder::new(k, m)?;
        let mut slots: Vec<Option<Vec<u8>>> = vec![None; k + m];
        for (index, envelope) in envelopes {
            let idx = *index as usize;
            if idx < slots.len() {
                let sealed = crypto::gcm_decrypt(gcm_key, &envelope.content)?;
                let tagged = crypto::gzip_decompress(&sealed)?;
                slots[idx] = Some(crypto::strip_and_verify_leading_hash(&tagged, expected_hash)?);
            }
        }
        coder.reconstruct(&mut slots)?;
        let data_shards: Vec<Vec<u8>> = slots[..k].iter().map(|s| s.clone().unwrap()).collect();
        Ok(coder.join(&data_shards, original_len))
    }

    pub async fn run(
        self,
        cmd_rx: mpsc::Receiver<DownloadCommand>,
        progress_tx: mpsc::Sender<DownloadProgress>,
    ) {
        let now = crate::util::now_unix();
        if self
            .task_store
            .validate_and_update_download_status(&self.task_id, TaskStatus::InProgress, now)
            .is_err()
        {
            let _ = progress_tx
                .send(DownloadProgress::Failed { reason: "task is not in a startable state".into() })
                .await;
            return;
        }

        let result = self.run_inner(cmd_rx, &progress_tx).await;
        let now = crate::util::now_unix();
        match result {
            Ok(path) => {
                let _ = self
                    .task_store
                    .validate_and_update_download_status(&self.task_id, TaskStatus::Completed, now);
                let _ = progress_tx.send(DownloadProgress::Completed { path }).await;
            }
            Err(DfsError::Cancelled(_)) => {
                let _ = self
                    .task_store
                    .validate_and_update_download_status(&self.task_id, TaskStatus::Cancelled, now);
            }
            Err(e) => {
                tracing::error!("download task {} failed: {}", self.task_id, e);
                let _ = self
                    .task_store
                    .validate_and_update_download_status(&self.task_id, TaskStatus::Failed, now);
                let _ = progress_tx.send(DownloadProgress::Failed { reason: e.to_string() }).await;
            }
        }
    }
}

pub fn new_task_record(task_id: String, file_id: String, destination: String) -> DownloadTaskRecord {
    let now = crate::util::now_unix();
    DownloadTaskRecord {
        task_id,
        file_id,
        destination,
        status: TaskStatus::Pending,
        created_at: now,
        updated_at: now,
    }
}
