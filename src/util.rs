/// Small shared helpers that don't belong to any one module.
use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix timestamp in seconds, used for task `created_at`/`updated_at`.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
