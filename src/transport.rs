/// Transport adapter (spec.md C9): request/response RPC-style messages
/// carried over libp2p, used by the upload pipeline to push a shard to a
/// peer and by the download pipeline to pull one back.
///
/// Grounded in the `request_response::cbor::Behaviour<Req, Resp>` pattern
/// from `LeonardoDalcorso-LibreDrive`'s `p2p/node.rs`, which the teacher
/// repo itself doesn't use (it only does direct Kademlia `put_record`/
/// `get_record`); this generalizes that pattern to the explicit
/// request/reply calls the upload/download pipelines need.
use libp2p::StreamProtocol;
use serde::{Deserialize, Serialize};

/// A shard push: the uploader asks a peer to store a shard.
pub fn send_protocol() -> StreamProtocol {
    StreamProtocol::new("/meshvault/send/1.0.0")
}

/// A shard pull: the downloader asks a peer to return a previously-stored shard.
pub fn forward_protocol() -> StreamProtocol {
    StreamProtocol::new("/meshvault/forward/1.0.0")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    /// Store the attached shard bytes under `segment_id`.
    Send,
    /// Return the shard bytes previously stored under `segment_id`.
    Forward,
    /// Remove a previously-stored shard (download-checklist cleanup, §4.7).
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportRequest {
    pub kind: TransportKind,
    pub file_id: String,
    pub segment_id: String,
    pub segment_index: i64,
    /// Shard bytes for `Send`; empty for `Forward`/`Delete`.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCode {
    Ok = 0,
    NotFound = 1,
    Rejected = 2,
    Error = 3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportResponse {
    pub code: ResponseCode,
    pub msg: String,
    /// Shard bytes for a successful `Forward` reply; empty otherwise.
    pub data: Vec<u8>,
}

impl TransportResponse {
    pub fn ok(data: Vec<u8>) -> Self {
        Self { code: ResponseCode::Ok, msg: "ok".into(), data }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self { code: ResponseCode::NotFound, msg: msg.into(), data: Vec::new() }
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self { code: ResponseCode::Rejected, msg: msg.into(), data: Vec::new() }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self { code: ResponseCode::Error, msg: msg.into(), data: Vec::new() }
    }

    pub fn is_ok(&self) -> bool {
        self.code == ResponseCode::Ok
    }
}

/// Gossipsub topics for the pub/sub control bus (spec.md §4.7).
pub mod topics {
    pub const FILE_DOWNLOAD_REQUEST: &str = "file-download-request";
    pub const FILE_DOWNLOAD_RESPONSE: &str = "file-download-response";
    pub const DELETE_SHARD: &str = "delete-shard";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_response_helpers_set_expected_codes() {
        assert!(TransportResponse::ok(vec![1, 2, 3]).is_ok());
        assert_eq!(TransportResponse::not_found("x").code, ResponseCode::NotFound);
        assert_eq!(TransportResponse::rejected("x").code, ResponseCode::Rejected);
        assert_eq!(TransportResponse::error("x").code, ResponseCode::Error);
    }

    #[test]
    fn transport_request_round_trips_through_serde() {
        let req = TransportRequest {
            kind: TransportKind::Send,
            file_id: "f1".into(),
            segment_id: "s1".into(),
            segment_index: 2,
            data: vec![9, 8, 7],
        };
        let json = serde_json::to_string(&req).unwrap();
        let decoded: TransportRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.segment_id, "s1");
        assert_eq!(decoded.data, vec![9, 8, 7]);
    }
}
