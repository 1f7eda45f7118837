//! Redis storage layer for accounts, sessions, and challenge nonces.
//!
//! All functions are async and use redis::AsyncCommands.
//! Data is serialized to JSON for storage in Redis.

pub mod account;
pub mod nonce;
pub mod session;

pub use nonce::RedisNonceStore;

/// Convert a JSON error into a RedisError so storage functions keep a single
/// error type.
pub(crate) fn json_error(context: &'static str, err: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((
        redis::ErrorKind::TypeError,
        context,
        err.to_string(),
    ))
}

use redis::AsyncCommands;

/// Maximum number of keys returned by scan_keys.
const SCAN_MAX_KEYS: usize = 10_000;

/// Scan for Redis keys matching a pattern using SCAN (non-blocking).
///
/// Capped at SCAN_MAX_KEYS results.
pub async fn scan_keys<C>(con: &mut C, pattern: &str) -> Result<Vec<String>, redis::RedisError>
where
    C: AsyncCommands,
{
    let mut all_keys = Vec::new();
    let mut cursor: u64 = 0;
    loop {
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(100)
            .query_async(con)
            .await?;
        all_keys.extend(keys);
        if all_keys.len() >= SCAN_MAX_KEYS {
            all_keys.truncate(SCAN_MAX_KEYS);
            break;
        }
        cursor = next;
        if cursor == 0 {
            break;
        }
    }
    Ok(all_keys)
}
