//! Session extractor and per-client rate limiting.

use super::clock::SystemClock;
use super::handshake::Handshake;
use super::nonce::{NonceStore, OsEntropy};
use crate::config::Config;
use crate::error::AppError;
use crate::storage;
use alloy_primitives::Address;
use axum::{extract::FromRequestParts, http::request::Parts};
use redis::AsyncCommands;
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub redis: redis::Client,
    pub config: Arc<Config>,
    pub handshake: Arc<Handshake>,
}

impl AppState {
    /// Wire the handshake from configuration, using the system clock and OS
    /// entropy.
    pub fn new(config: Config, redis: redis::Client, nonce_store: Arc<dyn NonceStore>) -> Self {
        let handshake = Handshake::new(
            config.challenge_policy(),
            nonce_store,
            Arc::new(SystemClock),
            Arc::new(OsEntropy),
            chrono::Duration::seconds(config.nonce_ttl_secs as i64),
        );
        Self {
            redis,
            config: Arc::new(config),
            handshake: Arc::new(handshake),
        }
    }
}

/// Authenticated session extractor.
///
/// Extracts session from `Authorization: Bearer {token}` header.
/// Returns 401 Unauthorized if missing or invalid.
pub struct AuthSession {
    pub address: Address,
    pub chain_id: u64,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid authorization format".to_string()))?
            .to_string();

        let mut con = state
            .redis
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection error: {}", e)))?;

        let session = storage::session::get_session(&mut con, &token)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired session".to_string()))?;

        let address = session
            .address
            .parse::<Address>()
            .map_err(|e| AppError::Internal(format!("Invalid address in session: {}", e)))?;

        Ok(AuthSession {
            address,
            chain_id: session.chain_id,
            token,
        })
    }
}

/// Check rate limit using Redis INCR with TTL.
///
/// # Arguments
/// * `con` - Redis connection
/// * `key` - Rate limit key (e.g., "ratelimit:auth:{ip_hash}")
/// * `max` - Maximum requests allowed in window
/// * `window_secs` - Time window in seconds
///
/// # Returns
/// * `Ok(true)` if under limit
/// * `Ok(false)` if limit exceeded
pub async fn check_rate_limit<C>(
    con: &mut C,
    key: &str,
    max: u32,
    window_secs: u64,
) -> Result<bool, redis::RedisError>
where
    C: AsyncCommands,
{
    // Increment counter
    let count: u32 = con.incr(key, 1).await?;

    // Set TTL on first request
    if count == 1 {
        con.expire::<_, ()>(key, window_secs as i64).await?;
    }

    Ok(count <= max)
}
