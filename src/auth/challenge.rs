//! Challenge construction.
//!
//! The server is the authority for `domain` and `scheme`. Everything the
//! unauthenticated caller supplies (address, origin, uri, optional fields) is
//! validated against [`ChallengePolicy`] before a nonce is spent on it.

use super::clock::Clock;
use super::error::AuthError;
use super::message::{AuthChallenge, MessageError, Timestamp};
use super::nonce::{NonceRecord, NonceRegistry, NONCE_BYTES};
use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use url::Url;

/// Server-side rules for issuing challenges.
#[derive(Debug, Clone)]
pub struct ChallengePolicy {
    /// Authority (`host[:port]`) rendered as the message domain.
    pub domain: String,
    /// Optional scheme rendered before the domain.
    pub scheme: Option<String>,
    /// Statement used when the request does not supply one.
    pub statement: Option<String>,
    /// Origins accepted in addition to the configured domain.
    pub allowed_origins: Vec<String>,
    pub default_chain_id: u64,
    pub allowed_chain_ids: Vec<u64>,
}

impl ChallengePolicy {
    /// True if `origin` is same-authority as the configured domain or
    /// explicitly allowed.
    pub fn permits_origin(&self, origin: &Url) -> bool {
        let ascii = origin.origin().ascii_serialization();
        if self
            .allowed_origins
            .iter()
            .any(|allowed| allowed.trim_end_matches('/').eq_ignore_ascii_case(&ascii))
        {
            return true;
        }
        authority(origin).is_some_and(|auth| auth.eq_ignore_ascii_case(&self.domain))
    }
}

/// `host[:port]` of a URL, with the port only when it is not the scheme default.
fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Optional, caller-controlled parts of a challenge.
#[derive(Debug, Clone, Default)]
pub struct ChallengeOptions {
    pub statement: Option<String>,
    pub chain_id: Option<u64>,
    pub uri: Option<String>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub request_id: Option<String>,
    pub resources: Vec<String>,
}

/// Parse an account address.
///
/// Requires `0x` and 40 hex digits. All-lowercase and all-uppercase input is
/// accepted; mixed case must carry a valid EIP-55 checksum.
pub fn parse_address(input: &str) -> Result<Address, AuthError> {
    let hex = input
        .strip_prefix("0x")
        .ok_or(AuthError::InvalidAddress)?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AuthError::InvalidAddress);
    }
    let uniform_case = hex == hex.to_ascii_lowercase() || hex == hex.to_ascii_uppercase();
    if uniform_case {
        input.parse().map_err(|_| AuthError::InvalidAddress)
    } else {
        Address::parse_checksummed(input, None).map_err(|_| AuthError::InvalidAddress)
    }
}

/// Builds challenges and reserves their nonces.
#[derive(Clone)]
pub struct ChallengeBuilder {
    policy: Arc<ChallengePolicy>,
    registry: NonceRegistry,
    clock: Arc<dyn Clock>,
}

impl ChallengeBuilder {
    pub fn new(policy: Arc<ChallengePolicy>, registry: NonceRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            registry,
            clock,
        }
    }

    pub fn policy(&self) -> &ChallengePolicy {
        &self.policy
    }

    /// Build a challenge for `address` requested from `origin`.
    ///
    /// Returns the challenge together with the nonce record backing it.
    pub async fn build(
        &self,
        address: &str,
        origin: &str,
        options: ChallengeOptions,
    ) -> Result<(AuthChallenge, NonceRecord), AuthError> {
        let address = parse_address(address)?;

        let origin = Url::parse(origin).map_err(|_| AuthError::InvalidOrigin)?;
        if !self.policy.permits_origin(&origin) {
            return Err(AuthError::InvalidOrigin);
        }

        let uri = match options.uri {
            Some(uri) => {
                let parsed = Url::parse(&uri).map_err(|_| AuthError::InvalidOrigin)?;
                if parsed.origin() != origin.origin() {
                    return Err(AuthError::InvalidOrigin);
                }
                uri
            }
            None => origin.origin().ascii_serialization(),
        };

        let chain_id = options.chain_id.unwrap_or(self.policy.default_chain_id);
        if !self.policy.allowed_chain_ids.contains(&chain_id) {
            return Err(AuthError::UnsupportedChain);
        }

        let now = self.clock.now();
        let window_end = now + self.registry.ttl();
        let expiration_time = match options.expiration_time {
            Some(exp) if exp <= now || exp > window_end => {
                return Err(AuthError::InvalidTimeWindow)
            }
            Some(exp) => exp,
            None => window_end,
        };
        if let Some(nbf) = options.not_before {
            if nbf >= expiration_time {
                return Err(AuthError::InvalidTimeWindow);
            }
        }

        let assemble = |nonce: String, issued_at: DateTime<Utc>, expiration_time: DateTime<Utc>| {
            let mut builder = AuthChallenge::builder(
                self.policy.domain.clone(),
                address,
                uri.clone(),
                chain_id,
                nonce,
                Timestamp::from_datetime(issued_at),
            )
            .expiration_time(Timestamp::from_datetime(expiration_time))
            .resources(options.resources.iter().cloned());

            if let Some(scheme) = &self.policy.scheme {
                builder = builder.scheme(scheme.clone());
            }
            if let Some(statement) = options.statement.as_ref().or(self.policy.statement.as_ref()) {
                builder = builder.statement(statement.clone());
            }
            if let Some(nbf) = options.not_before {
                builder = builder.not_before(Timestamp::from_datetime(nbf));
            }
            if let Some(request_id) = &options.request_id {
                builder = builder.request_id(request_id.clone());
            }

            builder.build().map_err(|e| match e {
                MessageError::InvalidField("expiration time", _) => AuthError::InvalidTimeWindow,
                MessageError::InvalidField("uri", _) => AuthError::InvalidOrigin,
                other => AuthError::InvalidRequest(other.to_string()),
            })
        };

        // Every caller field is checked with a placeholder nonce first.
        assemble("0".repeat(NONCE_BYTES * 2), now, expiration_time)?;

        let record = self
            .registry
            .issue(address)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        let expiration_time = options.expiration_time.unwrap_or(record.expires_at);
        match assemble(record.nonce.clone(), record.issued_at, expiration_time) {
            Ok(challenge) => Ok((challenge, record)),
            Err(err) => {
                if let Err(e) = self.registry.release(&record).await {
                    tracing::warn!(error = %e, address = %address, "Failed to release unused nonce");
                }
                Err(err)
            }
        }
    }
}
