//! Redis-backed nonce store.
//!
//! Redis key patterns:
//! - `{prefix}:{address}:{nonce}` — nonce record (JSON), address lowercased.
//!   A consumed record keeps its TTL and is prefixed with `used:`.
//!
//! Retention is delegated to Redis key expiry, so `purge_expired` is a no-op.

use crate::auth::nonce::{NonceRecord, NonceState, NonceStore, StoreError};
use alloy_primitives::{hex, Address};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;

const USED_PREFIX: &str = "used:";

/// Atomic claim: marks a pending record consumed and returns what was there.
///
/// Returns `{0, ''}` for a missing key, `{1, json}` when this call consumed
/// it, `{2, json}` when it was already consumed.
const CLAIM_SCRIPT: &str = r"
local val = redis.call('GET', KEYS[1])
if not val then
    return {0, ''}
end
if string.sub(val, 1, 5) == 'used:' then
    return {2, string.sub(val, 6)}
end
redis.call('SET', KEYS[1], 'used:' .. val, 'KEEPTTL')
return {1, val}
";

pub struct RedisNonceStore {
    client: redis::Client,
    prefix: String,
    claim: redis::Script,
}

impl RedisNonceStore {
    pub fn new(client: redis::Client) -> Self {
        Self::with_prefix(client, "nonce")
    }

    pub fn with_prefix(client: redis::Client, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            claim: redis::Script::new(CLAIM_SCRIPT),
        }
    }

    fn key(&self, address: &Address, nonce: &str) -> String {
        format!("{}:{}:{}", self.prefix, hex::encode(address.as_slice()), nonce)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

fn decode(value: &str) -> Result<NonceState, StoreError> {
    match value.strip_prefix(USED_PREFIX) {
        Some(json) => Ok(NonceState::Consumed(serde_json::from_str(json)?)),
        None => Ok(NonceState::Pending(serde_json::from_str(value)?)),
    }
}

#[async_trait]
impl NonceStore for RedisNonceStore {
    async fn init(&self) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        redis::cmd("PING").query_async::<()>(&mut con).await?;
        Ok(())
    }

    async fn insert(
        &self,
        record: &NonceRecord,
        retain_until: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        let json = serde_json::to_string(record)?;
        let ttl_secs = (retain_until - record.issued_at).num_seconds().max(1);

        let set: Option<String> = redis::cmd("SET")
            .arg(self.key(&record.address, &record.nonce))
            .arg(json)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut con)
            .await?;

        match set {
            Some(_) => Ok(()),
            None => Err(StoreError::Duplicate),
        }
    }

    async fn get(&self, address: &Address, nonce: &str) -> Result<NonceState, StoreError> {
        let mut con = self.connection().await?;
        let value: Option<String> = con.get(self.key(address, nonce)).await?;
        match value {
            Some(value) => decode(&value),
            None => Ok(NonceState::Missing),
        }
    }

    async fn claim(&self, address: &Address, nonce: &str) -> Result<NonceState, StoreError> {
        let mut con = self.connection().await?;
        let (status, json): (i64, String) = self
            .claim
            .key(self.key(address, nonce))
            .invoke_async(&mut con)
            .await?;

        match status {
            0 => Ok(NonceState::Missing),
            1 => Ok(NonceState::Pending(serde_json::from_str(&json)?)),
            _ => Ok(NonceState::Consumed(serde_json::from_str(&json)?)),
        }
    }

    async fn remove(&self, address: &Address, nonce: &str) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        con.del::<_, ()>(self.key(address, nonce)).await?;
        Ok(())
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(0)
    }

    async fn teardown(&self) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        let keys = super::scan_keys(&mut con, &format!("{}:*", self.prefix)).await?;
        for key in &keys {
            con.del::<_, ()>(key).await?;
        }
        Ok(())
    }
}
