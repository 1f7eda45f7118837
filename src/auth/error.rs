//! Handshake error taxonomy.

/// Reasons an authentication attempt is rejected.
///
/// Every variant is terminal for the attempt that produced it. Callers at the
/// network boundary should collapse verification-side variants into a single
/// generic rejection (see [`crate::error::AppError`]) and keep the specific
/// kind for server-side logs only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid account address")]
    InvalidAddress,

    #[error("Origin not permitted")]
    InvalidOrigin,

    #[error("Chain not supported")]
    UnsupportedChain,

    #[error("Invalid validity window")]
    InvalidTimeWindow,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Domain does not match this server")]
    DomainMismatch,

    #[error("Nonce not found")]
    NonceNotFound,

    #[error("Nonce expired")]
    NonceExpired,

    #[error("Nonce already used")]
    NonceAlreadyUsed,

    #[error("Nonce consumed concurrently")]
    NonceReuse,

    #[error("Challenge expired")]
    ChallengeExpired,

    #[error("Challenge not yet valid")]
    ChallengeNotYetValid,

    #[error("Malformed signature")]
    MalformedSignature,

    #[error("Signature recovery failed")]
    RecoveryFailed,

    #[error("Signature does not match address")]
    SignatureMismatch,

    #[error("Operation not allowed in state {0}")]
    InvalidState(&'static str),

    #[error("Nonce store error: {0}")]
    Store(String),
}

impl AuthError {
    /// Stable snake_case name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::InvalidAddress => "invalid_address",
            AuthError::InvalidOrigin => "invalid_origin",
            AuthError::UnsupportedChain => "unsupported_chain",
            AuthError::InvalidTimeWindow => "invalid_time_window",
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::MalformedMessage(_) => "malformed_message",
            AuthError::DomainMismatch => "domain_mismatch",
            AuthError::NonceNotFound => "nonce_not_found",
            AuthError::NonceExpired => "nonce_expired",
            AuthError::NonceAlreadyUsed => "nonce_already_used",
            AuthError::NonceReuse => "nonce_reuse",
            AuthError::ChallengeExpired => "challenge_expired",
            AuthError::ChallengeNotYetValid => "challenge_not_yet_valid",
            AuthError::MalformedSignature => "malformed_signature",
            AuthError::RecoveryFailed => "recovery_failed",
            AuthError::SignatureMismatch => "signature_mismatch",
            AuthError::InvalidState(_) => "invalid_state",
            AuthError::Store(_) => "store",
        }
    }

    /// True for errors raised while checking a request before any nonce or
    /// signature is involved. These are safe to report verbatim.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidAddress
                | AuthError::InvalidOrigin
                | AuthError::UnsupportedChain
                | AuthError::InvalidTimeWindow
                | AuthError::InvalidRequest(_)
        )
    }
}
