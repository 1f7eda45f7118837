//! Background sweep for the in-process nonce store.
//!
//! The Redis store expires records itself. The in-memory store only drops
//! expired records lazily on lookup, so this job periodically purges records
//! whose retention has passed.

use crate::auth::nonce::NonceRegistry;
use std::time::Duration;

/// Run the sweep loop forever, purging every `interval`.
pub async fn run_sweep_loop(registry: NonceRegistry, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        sweep_once(&registry).await;
    }
}

/// One sweep pass. Returns the number of records removed.
pub async fn sweep_once(registry: &NonceRegistry) -> usize {
    match registry.sweep().await {
        Ok(removed) => {
            if removed > 0 {
                tracing::info!(removed = removed, "Nonce sweep completed");
            }
            removed
        }
        Err(e) => {
            tracing::error!(error = %e, "Nonce sweep failed");
            0
        }
    }
}
