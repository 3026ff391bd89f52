/// Custodian-side persistent shard store (spec.md §4.10's persisted-state
/// layout: `{root}/slices/{host_id}/{file_id}/{segment_id}`).
///
/// Distinct from [`crate::temp_store::TempShardStore`]: that one holds an
/// uploader's own in-flight shard bytes before they're dispatched; this one
/// holds envelopes a custodian has agreed to store on another node's behalf,
/// and keeps them until an explicit delete-shard request arrives.
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{DfsError, DfsResult};

pub struct ShardStore {
    root: PathBuf,
}

impl ShardStore {
    pub async fn new(root: impl Into<PathBuf>, host_id: &str) -> DfsResult<Self> {
        let root = root.into().join(host_id);
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, file_id: &str, segment_id: &str) -> PathBuf {
        self.root.join(file_id).join(segment_id)
    }

    /// Persists a codec-encoded `ShardEnvelope` (see [`crate::envelope`]) on
    /// behalf of its owner.
    pub async fn store(&self, file_id: &str, segment_id: &str, envelope_bytes: &[u8]) -> DfsResult<()> {
        let path = self.path_for(file_id, segment_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(&path).await?;
        file.write_all(envelope_bytes).await?;
        Ok(())
    }

    pub async fn fetch(&self, file_id: &str, segment_id: &str) -> DfsResult<Vec<u8>> {
        let path = self.path_for(file_id, segment_id);
        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| DfsError::NotFound(format!("no locally-held shard {}/{}: {}", file_id, segment_id, e)))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    pub async fn delete(&self, file_id: &str, segment_id: &str) -> DfsResult<()> {
        let path = self.path_for(file_id, segment_id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn has(&self, file_id: &str, segment_id: &str) -> bool {
        fs::metadata(self.path_for(file_id, segment_id)).await.is_ok()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_fetch_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShardStore::new(dir.path(), "host-a").await.unwrap();

        store.store("file-1", "seg-0", b"envelope bytes").await.unwrap();
        assert!(store.has("file-1", "seg-0").await);

        let data = store.fetch("file-1", "seg-0").await.unwrap();
        assert_eq!(data, b"envelope bytes");
    }

    #[tokio::test]
    async fn delete_removes_a_stored_shard() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShardStore::new(dir.path(), "host-a").await.unwrap();

        store.store("file-1", "seg-0", b"envelope bytes").await.unwrap();
        store.delete("file-1", "seg-0").await.unwrap();
        assert!(!store.has("file-1", "seg-0").await);
    }

    #[tokio::test]
    async fn fetch_missing_shard_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShardStore::new(dir.path(), "host-a").await.unwrap();
        assert!(matches!(store.fetch("nope", "nope").await, Err(DfsError::NotFound(_))));
    }
}
