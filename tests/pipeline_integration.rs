/// End-to-end checks that stitch several modules together the way the
/// upload/download pipelines do, without spinning up a real libp2p swarm:
/// shard split+seal+sign on one side, store+fetch+verify+reconstruct on the
/// other.
use meshvault::crypto;
use meshvault::erasure::ErasureCoder;
use meshvault::models::{
    FileMeta, HashTable, ShardStatus, SignaturePayload, StorageMode, TaskStatus, UploadShardRecord, UploadTaskRecord,
};
use meshvault::segment_codec::HashTableEntry;
use meshvault::shard_store::ShardStore;
use meshvault::task_store::TaskStore;

fn sample_meta(file_id: &str, size: i64) -> FileMeta {
    FileMeta {
        file_id: file_id.to_string(),
        name: "report.pdf".into(),
        extension: "pdf".into(),
        size,
        content_type: "application/pdf".into(),
        sha256_hash: String::new(),
        upload_time: 0,
    }
}

/// Splits a file into Reed-Solomon shards, seals and signs each one,
/// persists it in a [`ShardStore`] as a custodian would, then fetches,
/// verifies, and reconstructs the original bytes on the other side.
#[tokio::test]
async fn shard_round_trip_through_store_survives_two_missing_shards() {
    let dir = tempfile::tempdir().unwrap();
    let store = ShardStore::new(dir.path(), "host-under-test").await.unwrap();

    let data = b"the quick brown fox jumps over the lazy dog".repeat(200);
    let coder = ErasureCoder::new(4, 2).unwrap();
    let data_shards = coder.split(&data);
    let parity_shards = coder.encode(&data_shards).unwrap();
    let all_shards: Vec<Vec<u8>> = data_shards.iter().cloned().chain(parity_shards).collect();

    let file_secret = crypto::generate_file_secret();
    let gcm_key = crypto::derive_gcm_key(&file_secret);
    let (secret_key, public_key) = crypto::generate_signing_key();

    let mut meta = sample_meta("file-1", data.len() as i64);
    meta.sha256_hash = hex::encode(crypto::sha256(&data));
    let file_hash: [u8; 32] = crypto::sha256(&data);

    let hash_table: HashTable = all_shards
        .iter()
        .enumerate()
        .map(|(i, shard)| {
            let tagged = crypto::prepend_leading_hash(&file_hash, shard);
            let compressed = crypto::gzip_compress(&tagged).unwrap();
            let sealed = crypto::gcm_encrypt(&gcm_key, &compressed).unwrap();
            HashTableEntry { index: i as i64, segment_id: format!("file-1-{i}"), crc32: crypto::crc32(&sealed), is_parity: i >= 4 }
        })
        .collect();

    for (i, shard) in all_shards.iter().enumerate() {
        let tagged = crypto::prepend_leading_hash(&file_hash, shard);
        let compressed = crypto::gzip_compress(&tagged).unwrap();
        let sealed = crypto::gcm_encrypt(&gcm_key, &compressed).unwrap();
        let segment_id = format!("file-1-{i}");
        let payload = SignaturePayload {
            file_id: &meta.file_id,
            content_type: &meta.content_type,
            sha256: &meta.sha256_hash,
            hash_table: &hash_table,
            segment_id: &segment_id,
            segment_index: i as i64,
            crc32: crypto::crc32(&sealed),
            encrypted_payload: &sealed,
        };
        let signature = crypto::sign(&secret_key, &payload.canonical_bytes());

        let mut envelope_bytes = Vec::new();
        envelope_bytes.extend_from_slice(&sealed);
        envelope_bytes.extend_from_slice(&signature.serialize());
        store.store("file-1", &segment_id, &envelope_bytes).await.unwrap();
    }

    // Simulate losing two shards (within the coder's redundancy budget).
    store.delete("file-1", "file-1-0").await.unwrap();
    store.delete("file-1", "file-1-4").await.unwrap();

    let mut slots: Vec<Option<Vec<u8>>> = Vec::with_capacity(6);
    for i in 0..6 {
        let segment_id = format!("file-1-{i}");
        if !store.has("file-1", &segment_id).await {
            slots.push(None);
            continue;
        }
        let envelope_bytes = store.fetch("file-1", &segment_id).await.unwrap();
        let sealed = &envelope_bytes[..envelope_bytes.len() - 64];
        let signature_bytes = &envelope_bytes[envelope_bytes.len() - 64..];

        let signature = crypto::signature_from_bytes(signature_bytes).unwrap();
        let payload = SignaturePayload {
            file_id: &meta.file_id,
            content_type: &meta.content_type,
            sha256: &meta.sha256_hash,
            hash_table: &hash_table,
            segment_id: &segment_id,
            segment_index: i as i64,
            crc32: crypto::crc32(sealed),
            encrypted_payload: sealed,
        };
        assert!(crypto::verify(&public_key, &payload.canonical_bytes(), &signature));

        let compressed = crypto::gcm_decrypt(&gcm_key, sealed).unwrap();
        let tagged = crypto::gzip_decompress(&compressed).unwrap();
        let shard = crypto::strip_and_verify_leading_hash(&tagged, &file_hash).unwrap();
        slots.push(Some(shard));
    }

    coder.reconstruct(&mut slots).unwrap();
    let recovered_data: Vec<Vec<u8>> = slots[..4].iter().map(|s| s.clone().unwrap()).collect();
    let joined = coder.join(&recovered_data, data.len());

    assert_eq!(joined, data);
    assert_eq!(hex::encode(crypto::sha256(&joined)), meta.sha256_hash);
}

/// Shamir-splitting and recombining a file secret across more than one
/// quorum of shares, the way the upload/download pipelines distribute and
/// later reassemble `FileSecurity.encryption_secret`.
#[test]
fn file_secret_recombines_from_either_quorum_of_shamir_shares() {
    let secret = crypto::generate_file_secret();
    let shares = crypto::shamir_split(&secret, 3, 2).unwrap();

    let from_first_pair = crypto::shamir_combine(&shares[0..2], 2).unwrap();
    let from_other_pair = crypto::shamir_combine(&[shares[0].clone(), shares[2].clone()], 2).unwrap();

    assert_eq!(from_first_pair, secret.to_vec());
    assert_eq!(from_other_pair, secret.to_vec());
}

/// Drives an upload task through the store's own status-transition guard:
/// a task cannot be marked `Completed` before it has gone through
/// `InProgress`, matching the precondition table in `TaskStatus`.
#[test]
fn task_store_rejects_completion_of_a_task_never_started() {
    let store = TaskStore::open_in_memory().unwrap();
    let record = UploadTaskRecord {
        task_id: "task-1".into(),
        file_id: "file-1".into(),
        file_name: "report.pdf".into(),
        file_size: 4096,
        storage_mode: StorageMode::RsSize { k: 4, m: 2 },
        status: TaskStatus::Pending,
        created_at: 0,
        updated_at: 0,
    };
    store.insert_upload_task(&record).unwrap();

    assert!(store
        .validate_and_update_upload_status("task-1", TaskStatus::Completed, 1)
        .is_err());
    store
        .validate_and_update_upload_status("task-1", TaskStatus::InProgress, 1)
        .unwrap();
    store
        .validate_and_update_upload_status("task-1", TaskStatus::Completed, 2)
        .unwrap();

    let fetched = store.get_upload_task("task-1").unwrap().unwrap();
    assert_eq!(fetched.status, TaskStatus::Completed);

    store
        .upsert_upload_segment(&UploadShardRecord {
            task_id: "task-1".into(),
            segment_index: 0,
            segment_id: "file-1-0".into(),
            peer_id: Some("peer-a".into()),
            crc32: 0xdead_beef,
            is_parity: false,
            status: ShardStatus::Completed,
        })
        .unwrap();
    let segments = store.list_upload_segments("task-1").unwrap();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].peer_id.as_deref(), Some("peer-a"));
}
