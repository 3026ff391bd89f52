/// Bridges [`crate::models::ShardEnvelope`] to its bit-exact wire/on-disk
/// form via [`crate::segment_codec`] (spec.md §6), and carries the checks
/// every receiver of an envelope must run before trusting its content:
/// crc32, then the owner's signature.
use crate::crypto;
use crate::error::{DfsError, DfsResult};
use crate::models::{ShardEnvelope, SignaturePayload};
use crate::segment_codec::{decode_hash_table, encode_hash_table, SegmentReader, SegmentWriter, Tag};

pub fn encode_envelope(envelope: &ShardEnvelope) -> Vec<u8> {
    let mut writer = SegmentWriter::new();
    writer
        .put_string(Tag::FileId, &envelope.meta.file_id)
        .put_string(Tag::Name, &envelope.meta.name)
        .put_string(Tag::Extension, &envelope.meta.extension)
        .put_i64(Tag::Size, envelope.meta.size)
        .put_string(Tag::ContentType, &envelope.meta.content_type)
        .put_string(Tag::Sha256Hash, &envelope.meta.sha256_hash)
        .put_i64(Tag::UploadTime, envelope.meta.upload_time)
        .put_string(Tag::P2pkhScript, &envelope.p2pkh_script)
        .put_string(Tag::P2pkScript, &envelope.p2pk_script)
        .put(Tag::SliceTable, encode_hash_table(&envelope.hash_table))
        .put_string(Tag::SegmentId, &envelope.segment_id)
        .put_i64(Tag::SegmentIndex, envelope.segment_index)
        .put_u32(Tag::Crc32Checksum, envelope.crc32)
        .put_bytes(Tag::SegmentContent, &envelope.content)
        .put_bytes(Tag::EncryptionKey, &envelope.encryption_share)
        .put_bytes(Tag::Signature, &envelope.signature)
        .put_bool(Tag::Shared, envelope.shared)
        .put_u32(Tag::Version, envelope.version);
    writer.finish()
}

pub fn decode_envelope(bytes: &[u8]) -> DfsResult<ShardEnvelope> {
    let reader = SegmentReader::parse(bytes)?;

    let meta = crate::models::FileMeta {
        file_id: reader.string(Tag::FileId)?,
        name: reader.string(Tag::Name)?,
        extension: reader.string(Tag::Extension)?,
        size: reader.i64(Tag::Size)?,
        content_type: reader.string(Tag::ContentType)?,
        sha256_hash: reader.string(Tag::Sha256Hash)?,
        upload_time: reader.i64(Tag::UploadTime)?,
    };

    Ok(ShardEnvelope {
        meta,
        p2pkh_script: reader.string(Tag::P2pkhScript)?,
        p2pk_script: reader.string(Tag::P2pkScript)?,
        hash_table: decode_hash_table(reader.require(Tag::SliceTable)?)?,
        segment_id: reader.string(Tag::SegmentId)?,
        segment_index: reader.i64(Tag::SegmentIndex)?,
        crc32: reader.u32(Tag::Crc32Checksum)?,
        content: reader.bytes(Tag::SegmentContent)?,
        encryption_share: reader.bytes(Tag::EncryptionKey)?,
        signature: reader.bytes(Tag::Signature)?,
        shared: reader.bool(Tag::Shared)?,
        version: reader.u32(Tag::Version)?,
    })
}

/// Checks crc32 then the owner's signature over an envelope, the way any
/// receiver — a downloader pulling it back, or a custodian accepting custody
/// of it — must before trusting its content.
pub fn verify_envelope(envelope: &ShardEnvelope) -> DfsResult<()> {
    let computed_crc = crypto::crc32(&envelope.content);
    if computed_crc != envelope.crc32 {
        return Err(DfsError::Corruption(format!("shard {} failed crc32 check", envelope.segment_id)));
    }

    let pubkey_hex = envelope
        .p2pk_script
        .split_whitespace()
        .next()
        .ok_or_else(|| DfsError::Corruption("malformed p2pk script".into()))?;
    let pubkey_bytes = hex::decode(pubkey_hex)?;
    let public_key = crypto::public_key_from_bytes(&pubkey_bytes)?;
    let signature = crypto::signature_from_bytes(&envelope.signature)?;

    let payload = SignaturePayload {
        file_id: &envelope.meta.file_id,
        content_type: &envelope.meta.content_type,
        sha256: &envelope.meta.sha256_hash,
        hash_table: &envelope.hash_table,
        segment_id: &envelope.segment_id,
        segment_index: envelope.segment_index,
        crc32: envelope.crc32,
        encrypted_payload: &envelope.content,
    };

    if !crypto::verify(&public_key, &payload.canonical_bytes(), &signature) {
        return Err(DfsError::Corruption(format!(
            "signature verification failed for shard {}",
            envelope.segment_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileMeta;
    use crate::segment_codec::HashTableEntry;

    fn sample_envelope() -> ShardEnvelope {
        ShardEnvelope {
            meta: FileMeta {
                file_id: "file-1".into(),
                name: "a.bin".into(),
                extension: "bin".into(),
                size: 10,
                content_type: "application/octet-stream".into(),
                sha256_hash: "abc123".into(),
                upload_time: 100,
            },
            p2pkh_script: "OP_DUP OP_HASH160 deadbeef OP_EQUALVERIFY OP_CHECKSIG".into(),
            p2pk_script: "02aa OP_CHECKSIG".into(),
            hash_table: vec![HashTableEntry { index: 0, segment_id: "file-1-0".into(), crc32: 7, is_parity: false }],
            segment_id: "file-1-0".into(),
            segment_index: 0,
            crc32: 7,
            content: b"ciphertext".to_vec(),
            encryption_share: b"share".to_vec(),
            signature: vec![0u8; 64],
            shared: false,
            version: 1,
        }
    }

    #[test]
    fn envelope_round_trips_through_the_segment_codec() {
        let envelope = sample_envelope();
        let bytes = encode_envelope(&envelope);
        let decoded = decode_envelope(&bytes).unwrap();
        assert_eq!(decoded.meta.file_id, envelope.meta.file_id);
        assert_eq!(decoded.segment_id, envelope.segment_id);
        assert_eq!(decoded.content, envelope.content);
        assert_eq!(decoded.hash_table, envelope.hash_table);
    }

    #[test]
    fn verify_rejects_a_tampered_payload() {
        let mut envelope = sample_envelope();
        envelope.crc32 = crypto::crc32(&envelope.content);
        // No real signature was produced above, so verification must fail.
        assert!(verify_envelope(&envelope).is_err());
    }
}
