/// Download-request checklist protocol (spec.md §4.7 phases 1-2): a
/// downloader broadcasts which file it wants over gossipsub, custodians that
/// hold a shard of it and are willing to serve the requester reply with
/// what they hold, and the downloader merges replies into one picture of
/// where every slice lives before it starts pulling content.
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::envelope;
use crate::error::DfsResult;
use crate::models::{FileSecurity, HashTable};
use crate::network::NetworkHandle;
use crate::shard_store::ShardStore;
use crate::task_store::TaskStore;
use crate::transport::topics;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDownloadRequestChecklistPayload {
    pub file_id: String,
    pub user_pubkey_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDownloadChecklistResponse {
    pub file_id: String,
    pub responder_peer_id: String,
    pub name: Option<String>,
    pub size: Option<i64>,
    pub hash_table: Option<HashTable>,
    pub available_slices: Vec<i64>,
}

/// Fans incoming `file-download-response` gossip messages back to whichever
/// in-flight download task registered an interest in that `file_id`.
#[derive(Clone)]
pub struct ChecklistRouter {
    inner: Arc<Mutex<HashMap<String, mpsc::Sender<FileDownloadChecklistResponse>>>>,
}

impl ChecklistRouter {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub async fn register(&self, file_id: &str) -> mpsc::Receiver<FileDownloadChecklistResponse> {
        let (tx, rx) = mpsc::channel(32);
        self.inner.lock().await.insert(file_id.to_string(), tx);
        rx
    }

    pub async fn unregister(&self, file_id: &str) {
        self.inner.lock().await.remove(file_id);
    }

    pub async fn route(&self, response: FileDownloadChecklistResponse) {
        let guard = self.inner.lock().await;
        if let Some(tx) = guard.get(&response.file_id) {
            let _ = tx.send(response).await;
        }
    }
}

impl Default for ChecklistRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Custodian-side responder: looks up whatever shards of `file_id` this node
/// holds, gates access through the held envelope's `P2PKH`/`P2PK` scripts,
/// and publishes a [`FileDownloadChecklistResponse`] if authorized. Denies
/// silently (no response at all) when access is refused, so an
/// unauthorized requester cannot tell the file exists on this node.
pub async fn handle_checklist_request(
    shard_store: &ShardStore,
    task_store: &TaskStore,
    local_peer_id: &str,
    network: &NetworkHandle,
    data: &[u8],
) -> DfsResult<()> {
    let request: FileDownloadRequestChecklistPayload = serde_json::from_slice(data)?;

    let local_slices: Vec<_> = task_store
        .list_file_segment_storage(&request.file_id)?
        .into_iter()
        .filter(|row| row.peer_id == local_peer_id)
        .collect();
    let Some(first) = local_slices.first() else {
        return Ok(());
    };

    let envelope_bytes = shard_store.fetch(&request.file_id, &first.segment_id).await?;
    let held_envelope = envelope::decode_envelope(&envelope_bytes)?;

    let authorized = if held_envelope.shared {
        let grantee_md5 = hex::encode(md5::compute(&request.user_pubkey_hash));
        let now = chrono::Utc::now().timestamp();
        task_store.shared_grant_valid(&request.file_id, &grantee_md5, now)?
    } else {
        FileSecurity::pubkey_hash_from_p2pkh_script(&held_envelope.p2pkh_script) == Some(request.user_pubkey_hash.as_str())
    };
    if !authorized {
        return Ok(());
    }

    let response = FileDownloadChecklistResponse {
        file_id: request.file_id.clone(),
        responder_peer_id: local_peer_id.to_string(),
        name: Some(held_envelope.meta.name.clone()),
        size: Some(held_envelope.meta.size),
        hash_table: Some(held_envelope.hash_table.clone()),
        available_slices: local_slices.iter().map(|row| row.segment_index).collect(),
    };

    let payload = serde_json::to_vec(&response)?;
    network.publish(topics::FILE_DOWNLOAD_RESPONSE, payload).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn router_delivers_a_routed_response_to_its_registered_receiver() {
        let router = ChecklistRouter::new();
        let mut rx = router.register("file-1").await;

        router
            .route(FileDownloadChecklistResponse {
                file_id: "file-1".into(),
                responder_peer_id: "peer-a".into(),
                name: Some("a.bin".into()),
                size: Some(10),
                hash_table: None,
                available_slices: vec![0, 1],
            })
            .await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.responder_peer_id, "peer-a");
        assert_eq!(received.available_slices, vec![0, 1]);
    }

    #[tokio::test]
    async fn router_drops_responses_for_an_unregistered_file_id() {
        let router = ChecklistRouter::new();
        let mut rx = router.register("file-1").await;

        router
            .route(FileDownloadChecklistResponse {
                file_id: "file-2".into(),
                responder_peer_id: "peer-a".into(),
                name: None,
                size: None,
                hash_table: None,
                available_slices: vec![],
            })
            .await;

        assert!(rx.try_recv().is_err());
    }
}
