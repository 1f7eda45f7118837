//! Request and response models for the API.
//!
//! All models use serde for serialization/deserialization.
//! Storage models represent Redis data structures.

use crate::auth::handshake::AuthenticatedIdentity;
use crate::auth::message::AuthChallenge;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Auth Models
// ============================================================================

/// Request for a sign-in challenge.
///
/// The origin is taken from the `Origin` header, never from the body.
#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub address: String,
    pub chain_id: Option<u64>,
    pub uri: Option<String>,
    pub statement: Option<String>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub request_id: Option<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

/// Challenge text to sign, plus its structured form for display.
#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub message: String,
    pub challenge: AuthChallenge,
}

/// Request to verify a signed challenge.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub message: String,
    pub signature: String, // 0x-prefixed hex, 65 bytes
}

/// Response after successful verification.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub token: String,
    #[serde(flatten)]
    pub identity: AuthenticatedIdentity,
}

/// The account behind the current session.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub address: String,
    pub chain_id: u64,
    pub first_seen: u64,
    pub last_login: u64,
}

// ============================================================================
// Storage Models
// ============================================================================

/// Session data as stored in Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub address: String, // EIP-55 checksummed
    pub chain_id: u64,
    pub created_at: u64,
}

/// Account data as stored in Redis. Created on first successful sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAccount {
    pub address: String, // EIP-55 checksummed
    pub first_seen: u64,
    pub last_login: u64,
    pub last_chain_id: u64,
}
