/// Local staging area for shard bytes in flight (spec.md §4.5, C4).
///
/// Upload/download pipelines write/read shard content here between network
/// hops so a single task step never needs the whole file in memory at once.
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{DfsError, DfsResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadKey {
    pub task_id: String,
    pub segment_index: i64,
}

impl ReadKey {
    fn filename(&self) -> String {
        format!("{}-{}.shard", self.task_id, self.segment_index)
    }
}

pub struct TempShardStore {
    root: PathBuf,
}

impl TempShardStore {
    pub async fn new(root: impl Into<PathBuf>) -> DfsResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &ReadKey) -> PathBuf {
        self.root.join(key.filename())
    }

    pub async fn write(&self, key: &ReadKey, data: &[u8]) -> DfsResult<()> {
        let path = self.path_for(key);
        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        Ok(())
    }

    /// Streams `data` to disk in bounded chunks, for large shard content.
    pub async fn write_stream<R>(&self, key: &ReadKey, mut reader: R) -> DfsResult<u64>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let path = self.path_for(key);
        let mut file = fs::File::create(&path).await?;
        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
            total += n as u64;
        }
        Ok(total)
    }

    /// Reads and deletes the shard in one step — the common case once a
    /// shard has been dispatched or reassembled and won't be needed again.
    pub async fn read(&self, key: &ReadKey) -> DfsResult<Vec<u8>> {
        let data = self.only_read(key).await?;
        self.delete(key).await?;
        Ok(data)
    }

    /// Reads without deleting, for verification passes that re-read a shard.
    pub async fn only_read(&self, key: &ReadKey) -> DfsResult<Vec<u8>> {
        let path = self.path_for(key);
        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| DfsError::NotFound(format!("shard {:?} not staged: {}", key, e)))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    pub async fn delete(&self, key: &ReadKey) -> DfsResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, key: &ReadKey) -> bool {
        fs::metadata(self.path_for(key)).await.is_ok()
    }

    pub async fn size(&self, key: &ReadKey) -> DfsResult<u64> {
        let meta = fs::metadata(self.path_for(key))
            .await
            .map_err(|e| DfsError::NotFound(format!("shard {:?} not staged: {}", key, e)))?;
        Ok(meta.len())
    }

    /// Removes every staged shard belonging to one task, e.g. on cancel.
    pub async fn purge_task(&self, task_id: &str) -> DfsResult<()> {
        let prefix = format!("{}-", task_id);
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                fs::remove_file(entry.path()).await.ok();
            }
        }
        Ok(())
    }

    /// Removes every staged file whose task id is not in `known_task_ids`,
    /// run on startup to reclaim space left by a crash mid-task.
    pub async fn purge_orphans(&self, known_task_ids: &[String]) -> DfsResult<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(task_id) = name.rsplit_once('-').map(|(prefix, _)| prefix) else {
                continue;
            };
            if !known_task_ids.iter().any(|id| id == task_id) {
                if fs::remove_file(entry.path()).await.is_ok() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempShardStore::new(dir.path()).await.unwrap();
        let key = ReadKey { task_id: "t1".into(), segment_index: 0 };

        store.write(&key, b"shard bytes").await.unwrap();
        assert!(store.exists(&key).await);

        let data = store.only_read(&key).await.unwrap();
        assert_eq!(data, b"shard bytes");
        assert!(store.exists(&key).await);

        let data = store.read(&key).await.unwrap();
        assert_eq!(data, b"shard bytes");
        assert!(!store.exists(&key).await);
    }

    #[tokio::test]
    async fn purge_task_removes_only_matching_shards() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempShardStore::new(dir.path()).await.unwrap();

        let key_a0 = ReadKey { task_id: "a".into(), segment_index: 0 };
        let key_a1 = ReadKey { task_id: "a".into(), segment_index: 1 };
        let key_b0 = ReadKey { task_id: "b".into(), segment_index: 0 };

        store.write(&key_a0, b"x").await.unwrap();
        store.write(&key_a1, b"y").await.unwrap();
        store.write(&key_b0, b"z").await.unwrap();

        store.purge_task("a").await.unwrap();

        assert!(!store.exists(&key_a0).await);
        assert!(!store.exists(&key_a1).await);
        assert!(store.exists(&key_b0).await);
    }

    #[tokio::test]
    async fn purge_orphans_removes_unknown_task_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempShardStore::new(dir.path()).await.unwrap();

        let known = ReadKey { task_id: "known".into(), segment_index: 0 };
        let orphan = ReadKey { task_id: "orphan".into(), segment_index: 0 };
        store.write(&known, b"x").await.unwrap();
        store.write(&orphan, b"y").await.unwrap();

        let removed = store.purge_orphans(&["known".to_string()]).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.exists(&known).await);
        assert!(!store.exists(&orphan).await);
    }
}
