//! Single-use challenge nonces.
//!
//! The registry owns every nonce it issues. Records live in an injected
//! [`NonceStore`] so deployments can use Redis while tests use the in-memory
//! store with a [`ManualClock`](super::clock::ManualClock).

use super::clock::Clock;
use alloy_primitives::{hex, Address};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Random bytes per nonce (hex-encoded to 32 characters).
pub const NONCE_BYTES: usize = 16;

/// Source of randomness for nonce generation. Must be cryptographically secure.
pub trait EntropySource: Send + Sync {
    fn fill_bytes(&self, dest: &mut [u8]);
}

/// Thread-local CSPRNG seeded from the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) {
        rand::rng().fill(dest);
    }
}

/// Generate a nonce: [`NONCE_BYTES`] random bytes, lowercase hex.
pub fn generate_nonce(entropy: &dyn EntropySource) -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    entropy.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// A nonce bound to the account it was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceRecord {
    pub address: Address,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// What a store knows about a `(address, nonce)` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NonceState {
    Pending(NonceRecord),
    Consumed(NonceRecord),
    Missing,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Nonce already exists")]
    Duplicate,
}

/// Backing storage for nonce records.
///
/// `claim` is the only mutation on the verification path and must be atomic:
/// of any number of concurrent claims on one key, exactly one observes
/// `Pending`.
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Prepare the store for use (connect, verify reachability).
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Insert a new pending record, kept until `retain_until`.
    async fn insert(
        &self,
        record: &NonceRecord,
        retain_until: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn get(&self, address: &Address, nonce: &str) -> Result<NonceState, StoreError>;

    /// Mark the record consumed, returning its state before the call.
    async fn claim(&self, address: &Address, nonce: &str) -> Result<NonceState, StoreError>;

    async fn remove(&self, address: &Address, nonce: &str) -> Result<(), StoreError>;

    /// Drop records whose retention has passed. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Release resources and drop all state owned by this store.
    async fn teardown(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Slot {
    record: NonceRecord,
    consumed: bool,
    retain_until: DateTime<Utc>,
}

impl Slot {
    fn state(&self) -> NonceState {
        if self.consumed {
            NonceState::Consumed(self.record.clone())
        } else {
            NonceState::Pending(self.record.clone())
        }
    }
}

/// In-process store. Each key is guarded by its dashmap shard lock.
#[derive(Debug, Default)]
pub struct MemoryNonceStore {
    slots: DashMap<(Address, String), Slot>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn insert(
        &self,
        record: &NonceRecord,
        retain_until: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match self.slots.entry((record.address, record.nonce.clone())) {
            Entry::Occupied(_) => Err(StoreError::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(Slot {
                    record: record.clone(),
                    consumed: false,
                    retain_until,
                });
                Ok(())
            }
        }
    }

    async fn get(&self, address: &Address, nonce: &str) -> Result<NonceState, StoreError> {
        Ok(self
            .slots
            .get(&(*address, nonce.to_string()))
            .map(|slot| slot.state())
            .unwrap_or(NonceState::Missing))
    }

    async fn claim(&self, address: &Address, nonce: &str) -> Result<NonceState, StoreError> {
        match self.slots.get_mut(&(*address, nonce.to_string())) {
            Some(mut slot) => {
                let before = slot.state();
                slot.consumed = true;
                Ok(before)
            }
            None => Ok(NonceState::Missing),
        }
    }

    async fn remove(&self, address: &Address, nonce: &str) -> Result<(), StoreError> {
        self.slots.remove(&(*address, nonce.to_string()));
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.retain_until > now);
        Ok(before.saturating_sub(self.slots.len()))
    }

    async fn teardown(&self) -> Result<(), StoreError> {
        self.slots.clear();
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NonceError {
    #[error("Nonce not found")]
    NotFound,

    #[error("Nonce expired")]
    Expired,

    #[error("Nonce already used")]
    AlreadyUsed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issues and consumes nonces.
#[derive(Clone)]
pub struct NonceRegistry {
    store: Arc<dyn NonceStore>,
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn EntropySource>,
    ttl: Duration,
}

impl NonceRegistry {
    pub fn new(
        store: Arc<dyn NonceStore>,
        clock: Arc<dyn Clock>,
        entropy: Arc<dyn EntropySource>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            entropy,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &Arc<dyn NonceStore> {
        &self.store
    }

    /// Issue a fresh nonce bound to `address`.
    ///
    /// Consumed markers are kept for one extra window past expiry so replays
    /// report `AlreadyUsed` rather than `NotFound`.
    pub async fn issue(&self, address: Address) -> Result<NonceRecord, NonceError> {
        let issued_at = self.clock.now();
        let record = NonceRecord {
            address,
            nonce: generate_nonce(self.entropy.as_ref()),
            issued_at,
            expires_at: issued_at + self.ttl,
        };
        self.store
            .insert(&record, record.expires_at + self.ttl)
            .await?;

        tracing::debug!(action = "nonce_issued", address = %address, "Nonce issued");
        Ok(record)
    }

    /// Drop a freshly issued record that will never be handed out.
    pub async fn release(&self, record: &NonceRecord) -> Result<(), NonceError> {
        self.store.remove(&record.address, &record.nonce).await?;
        tracing::debug!(action = "nonce_released", address = %record.address, "Nonce released");
        Ok(())
    }

    /// Check that a nonce is outstanding without consuming it.
    pub async fn lookup(&self, address: &Address, nonce: &str) -> Result<NonceRecord, NonceError> {
        match self.store.get(address, nonce).await? {
            NonceState::Missing => Err(NonceError::NotFound),
            NonceState::Consumed(_) => Err(NonceError::AlreadyUsed),
            NonceState::Pending(record) => {
                if record.expires_at <= self.clock.now() {
                    self.store.remove(address, nonce).await?;
                    return Err(NonceError::Expired);
                }
                Ok(record)
            }
        }
    }

    /// Consume a nonce. Succeeds at most once per nonce.
    pub async fn consume(&self, address: &Address, nonce: &str) -> Result<NonceRecord, NonceError> {
        match self.store.claim(address, nonce).await? {
            NonceState::Missing => Err(NonceError::NotFound),
            NonceState::Consumed(_) => Err(NonceError::AlreadyUsed),
            NonceState::Pending(record) => {
                if record.expires_at <= self.clock.now() {
                    return Err(NonceError::Expired);
                }
                Ok(record)
            }
        }
    }

    /// Remove records past retention. Called by the background sweep.
    pub async fn sweep(&self) -> Result<usize, NonceError> {
        Ok(self.store.purge_expired(self.clock.now()).await?)
    }
}
