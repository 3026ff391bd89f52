/// Upload pipeline (spec.md C6): a single channel-driven coroutine per
/// task that walks a file through segment_process -> node_dispatch ->
/// network_transfer -> segment_verify -> file_finalize, honoring
/// pause/resume/cancel/delete commands sent in from the task manager.
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use libp2p::PeerId;
use tokio::sync::{mpsc, Semaphore};

use crate::crypto;
use crate::envelope;
use crate::erasure::ErasureCoder;
use crate::error::{DfsError, DfsResult};
use crate::key_manager::KeyManager;
use crate::models::{
    FileAssetRecord, FileMeta, ShardEnvelope, ShardStatus, SignaturePayload, StorageMode, TaskStatus,
    UploadShardRecord, UploadTaskRecord,
};
use crate::network::NetworkHandle;
use crate::peer_selector::select_peer;
use crate::segment_codec::HashTableEntry;
use crate::task_store::TaskStore;
use crate::temp_store::{ReadKey, TempShardStore};
use crate::transport::{TransportKind, TransportRequest};

pub enum UploadCommand {
    Pause,
    Resume,
    Cancel,
    Delete,
}

#[derive(Debug, Clone)]
pub enum UploadProgress {
    ShardStored { segment_index: i64, peer: PeerId },
    Completed { file_id: String },
    Failed { reason: String },
    Paused,
    Cancelled,
}

pub struct UploadPipeline {
    pub task_id: String,
    pub file_path: PathBuf,
    pub storage_mode: StorageMode,
    pub shamir_n: u8,
    pub shamir_k: u8,
    pub max_workers_per_peer: usize,
    pub max_global_workers: usize,
    pub key_manager: Arc<KeyManager>,
    pub network: NetworkHandle,
    pub task_store: Arc<TaskStore>,
    pub temp_store: Arc<TempShardStore>,
    pub shard_size: u64,
    pub max_slice_size: u64,
    pub min_slice_size: u64,
}

impl UploadPipeline {
    /// Splits the source file into shards per the task's resolved
    /// [`StorageMode`] and spec.md §4.6's shard-count table, prepends the
    /// file's SHA-256 to each shard's plaintext (§4.4), and stages the
    /// result in the temp store.
    async fn segment_process(&self, file_hash: &[u8; 32]) -> DfsResult<(Vec<ReadKey>, Vec<bool>, usize)> {
        let data = tokio::fs::read(&self.file_path).await?;
        let original_len = data.len();

        let (data_shards, parity_flags): (Vec<Vec<u8>>, Vec<bool>) = match self.storage_mode {
            StorageMode::File => {
                if original_len as u64 <= self.max_slice_size {
                    (vec![data], vec![false])
                } else {
                    let shard_size = self.shard_size.max(1) as usize;
                    let shards: Vec<Vec<u8>> = data.chunks(shard_size).map(|c| c.to_vec()).collect();
                    let flags = vec![false; shards.len()];
                    (shards, flags)
                }
            }
            StorageMode::Slice => {
                if (original_len as u64) < self.min_slice_size {
                    (vec![data], vec![false])
                } else {
                    let shard_size = self.shard_size.max(1) as usize;
                    let shards: Vec<Vec<u8>> = data.chunks(shard_size).map(|c| c.to_vec()).collect();
                    let flags = vec![false; shards.len()];
                    (shards, flags)
                }
            }
            StorageMode::RsSize { k, m } => {
                let coder = ErasureCoder::new(k, m)?;
                let data_shards = coder.split(&data);
                let parity_shards = coder.encode(&data_shards)?;
                let mut all = data_shards;
                let mut flags = vec![false; all.len()];
                flags.extend(vec![true; parity_shards.len()]);
                all.extend(parity_shards);
                (all, flags)
            }
            StorageMode::RsProportion { ratio } => {
                let shard_size = self.shard_size.max(1);
                let total = ((original_len as u64) + shard_size - 1) / shard_size;
                let total = total.max(1);
                let k = ((total as f64) / (1.0 + ratio)).floor().max(1.0) as usize;
                let k = k.min(total as usize);
                let m = (total as usize - k).max(1);
                let coder = ErasureCoder::new(k, m)?;
                let data_shards = coder.split(&data);
                let parity_shards = coder.encode(&data_shards)?;
                let mut all = data_shards;
                let mut flags = vec![false; all.len()];
                flags.extend(vec![true; parity_shards.len()]);
                all.extend(parity_shards);
                (all, flags)
            }
        };

        let mut keys = Vec::with_capacity(data_shards.len());
        for (index, shard) in data_shards.iter().enumerate() {
            let key = ReadKey { task_id: self.task_id.clone(), segment_index: index as i64 };
            let tagged = crypto::prepend_leading_hash(file_hash, shard);
            let compressed = crypto::gzip_compress(&tagged)?;
            self.temp_store.write(&key, &compressed).await?;
            keys.push(key);
        }

        Ok((keys, parity_flags, original_len))
    }

    /// Builds, encrypts, signs, and dispatches every shard in turn, bounded
    /// by a semaphore so no more than `max_global_workers` transfers run at
    /// once (and no more than `max_workers_per_peer` to any single peer).
    async fn run_inner(
        &self,
        meta: &FileMeta,
        file_secret: &[u8; 32],
        shamir_shares: &[Vec<u8>],
        owner_security: (String, String),
        progress_tx: &mpsc::Sender<UploadProgress>,
        mut cmd_rx: mpsc::Receiver<UploadCommand>,
    ) -> DfsResult<()> {
        let file_hash_bytes = hex::decode(&meta.sha256_hash)?;
        let file_hash: [u8; 32] = file_hash_bytes
            .try_into()
            .map_err(|_| DfsError::Corruption("sha256_hash is not 32 bytes".into()))?;

        let (segment_keys, parity_flags, original_len) = self.segment_process(&file_hash).await?;
        let _ = original_len;

        let gcm_key = crypto::derive_gcm_key(file_secret);
        let global_sem = Arc::new(Semaphore::new(self.max_global_workers));
        let mut peer_load: std::collections::HashMap<PeerId, usize> = std::collections::HashMap::new();
        let mut excluded: HashSet<PeerId> = HashSet::new();

        let mut hash_table: Vec<HashTableEntry> = Vec::with_capacity(segment_keys.len());
        let mut paused = false;

        for (index, key) in segment_keys.iter().enumerate() {
            loop {
                if let Ok(cmd) = cmd_rx.try_recv() {
                    match cmd {
                        UploadCommand::Pause => paused = true,
                        UploadCommand::Resume => paused = false,
                        UploadCommand::Cancel => {
                            self.temp_store.purge_task(&self.task_id).await?;
                            let _ = progress_tx.send(UploadProgress::Cancelled).await;
                            return Err(DfsError::Cancelled(self.task_id.clone()));
                        }
                        UploadCommand::Delete => {
                            self.temp_store.purge_task(&self.task_id).await?;
                            let _ = progress_tx.send(UploadProgress::Cancelled).await;
                            return Ok(());
                        }
                    }
                }
                if !paused {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }

            let plaintext_compressed = self.temp_store.only_read(key).await?;
            let sealed = crypto::gcm_encrypt(&gcm_key, &plaintext_compressed)?;
            let crc = crypto::crc32(&sealed);
            let segment_id = format!("{}-{}", meta.file_id, index);

            hash_table.push(HashTableEntry {
                index: index as i64,
                segment_id: segment_id.clone(),
                crc32: crc,
                is_parity: parity_flags[index],
            });

            let _permit = global_sem.clone().acquire_owned().await.map_err(|_| {
                DfsError::Generic("global worker semaphore closed".into())
            })?;

            let signature_payload = SignaturePayload {
                file_id: &meta.file_id,
                content_type: &meta.content_type,
                sha256: &meta.sha256_hash,
                hash_table: &hash_table,
                segment_id: &segment_id,
                segment_index: index as i64,
                crc32: crc,
                encrypted_payload: &sealed,
            };
            let signature = crypto::sign(&self.key_manager.key, &signature_payload.canonical_bytes());

            let shard_envelope = ShardEnvelope {
                meta: meta.clone(),
                p2pkh_script: owner_security.0.clone(),
                p2pk_script: owner_security.1.clone(),
                hash_table: hash_table.clone(),
                segment_id: segment_id.clone(),
                segment_index: index as i64,
                crc32: crc,
                content: sealed,
                encryption_share: shamir_shares.get(index % shamir_shares.len()).cloned().unwrap_or_default(),
                signature: signature.serialize().to_vec(),
                shared: false,
                version: 1,
            };

            let request = TransportRequest {
                kind: TransportKind::Send,
                file_id: meta.file_id.clone(),
                segment_id: segment_id.clone(),
                segment_index: index as i64,
                data: envelope::encode_envelope(&shard_envelope),
            };

            let retry_config = crate::resilience::RetryConfig {
                max_attempts: 3,
                initial_delay: std::time::Duration::from_millis(200),
                max_delay: std::time::Duration::from_secs(2),
                backoff_multiplier: 2.0,
            };

            // Retry a transient failure against the same peer with backoff;
            // once its attempts are exhausted, filter it and pick another.
            let peer = loop {
                let filtered = excluded.clone();
                let candidate = select_peer(&self.network, segment_id.as_bytes(), &filtered)
                    .await
                    .ok_or_else(|| DfsError::Transient("no peer available to receive shard".into()))?;

                let network = self.network.clone();
                let request = request.clone();
                let attempt = crate::resilience::retry_async(
                    || {
                        let network = network.clone();
                        let request = request.clone();
                        async move {
                            let response = network.send_transport_request(candidate, request).await?;
                            if response.is_ok() {
                                Ok(())
                            } else {
                                Err(DfsError::Transient(format!(
                                    "peer {} rejected shard {}: {}",
                                    candidate, segment_id, response.msg
                                )))
                            }
                        }
                    },
                    retry_config.clone(),
                    &format!("send shard {} to {}", segment_id, candidate),
                )
                .await;

                match attempt {
                    Ok(()) => break candidate,
                    Err(e @ (DfsError::Permanent(_) | DfsError::Corruption(_))) => return Err(e),
                    Err(_) => {
                        excluded.insert(candidate);
                        continue;
                    }
                }
            };

            let load = peer_load.entry(peer).or_insert(0);
            if *load >= self.max_workers_per_peer {
                excluded.insert(peer);
            }
            *load += 1;

            self.task_store.upsert_upload_segment(&UploadShardRecord {
                task_id: self.task_id.clone(),
                segment_index: index as i64,
                segment_id: segment_id.clone(),
                peer_id: Some(peer.to_string()),
                crc32: crc,
                is_parity: parity_flags[index],
                status: ShardStatus::Completed,
            })?;
            self.task_store.record_file_segment_storage(&crate::models::FileSegmentStorage {
                file_id: meta.file_id.clone(),
                segment_index: index as i64,
                segment_id,
                peer_id: peer.to_string(),
            })?;

            self.temp_store.delete(key).await?;
            let _ = progress_tx
                .send(UploadProgress::ShardStored { segment_index: index as i64, peer })
                .await;
        }

        self.task_store.insert_file_asset(&FileAssetRecord {
            file_id: meta.file_id.clone(),
            owner_pubkey_hash: self.key_manager.pubkey_hash(),
            file_name: meta.name.clone(),
            file_size: meta.size,
            content_type: meta.content_type.clone(),
            sha256_hash: meta.sha256_hash.clone(),
            storage_mode: self.storage_mode,
            created_at: crate::util::now_unix(),
        })?;
        self.task_store.delete_upload_segments(&self.task_id)?;

        let _ = progress_tx.send(UploadProgress::Completed { file_id: meta.file_id.clone() }).await;
        Ok(())
    }

    /// Entry point spawned by the task manager: runs the pipeline to
    /// completion (or cancellation), updating task status as it goes.
    pub async fn run(
        self,
        meta: FileMeta,
        file_secret: [u8; 32],
        shamir_shares: Vec<Vec<u8>>,
        owner_security: (String, String),
        cmd_rx: mpsc::Receiver<UploadCommand>,
        progress_tx: mpsc::Sender<UploadProgress>,
    ) {
        let now = crate::util::now_unix();
        if self
            .task_store
            .validate_and_update_upload_status(&self.task_id, TaskStatus::InProgress, now)
            .is_err()
        {
            let _ = progress_tx
                .send(UploadProgress::Failed { reason: "task is not in a startable state".into() })
                .await;
            return;
        }

        let result = self
            .run_inner(&meta, &file_secret, &shamir_shares, owner_security, &progress_tx, cmd_rx)
            .await;

        let now = crate::util::now_unix();
        match result {
            Ok(()) => {
                let _ = self
                    .task_store
                    .validate_and_update_upload_status(&self.task_id, TaskStatus::Completed, now);
            }
            Err(DfsError::Cancelled(_)) => {
                let _ = self
                    .task_store
                    .validate_and_update_upload_status(&self.task_id, TaskStatus::Cancelled, now);
            }
            Err(e) => {
                tracing::error!("upload task {} failed: {}", self.task_id, e);
                let _ = self
                    .task_store
                    .validate_and_update_upload_status(&self.task_id, TaskStatus::Failed, now);
                let _ = progress_tx.send(UploadProgress::Failed { reason: e.to_string() }).await;
            }
        }
    }
}

pub fn new_task_record(
    task_id: String,
    file_id: String,
    file_name: String,
    file_size: i64,
    storage_mode: StorageMode,
) -> UploadTaskRecord {
    let now = crate::util::now_unix();
    UploadTaskRecord {
        task_id,
        file_id,
        file_name,
        file_size,
        storage_mode,
        status: TaskStatus::Pending,
        created_at: now,
        updated_at: now,
    }
}
