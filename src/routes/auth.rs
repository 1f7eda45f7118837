//! Auth API endpoints.

use crate::auth::handshake::{self, AuthAttempt, SignedResponse};
use crate::auth::message;
use crate::auth::middleware::{check_rate_limit, AppState, AuthSession};
use crate::auth::session::generate_session_token;
use crate::auth::verify::decode_signature_hex;
use crate::auth::ChallengeOptions;
use crate::error::AppError;
use crate::models::{
    ChallengeRequest, ChallengeResponse, MeResponse, StoredSession, VerifyRequest, VerifyResponse,
};
use crate::storage;
use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

async fn connection(state: &AppState) -> Result<redis::aio::MultiplexedConnection, AppError> {
    state
        .redis
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| AppError::Internal(format!("Redis connection error: {}", e)))
}

/// Per-IP limit shared by the challenge and verify endpoints.
async fn enforce_rate_limit(
    state: &AppState,
    con: &mut redis::aio::MultiplexedConnection,
    addr: &SocketAddr,
    endpoint: &'static str,
) -> Result<(), AppError> {
    let rate_limit_key = format!("ratelimit:auth:{}", addr.ip());
    let allowed = check_rate_limit(con, &rate_limit_key, state.config.rate_limit_auth_per_min, 60)
        .await
        .map_err(|e| AppError::Internal(format!("Rate limit check failed: {}", e)))?;

    if !allowed {
        let mut hasher = std::hash::DefaultHasher::new();
        addr.ip().hash(&mut hasher);
        let ip_hash = format!("{:x}", hasher.finish());
        tracing::warn!(action = "rate_limited", endpoint = endpoint, ip_hash = %ip_hash, "Rate limit exceeded");
        return Err(AppError::RateLimited);
    }
    Ok(())
}

/// POST /api/auth/challenge — Request a message to sign
///
/// The origin the challenge is bound to comes from the `Origin` header.
pub async fn request_challenge(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<ChallengeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut con = connection(&state).await?;
    enforce_rate_limit(&state, &mut con, &addr, "auth/challenge").await?;

    // A missing or unreadable Origin is rejected by the handshake like any
    // other unpermitted origin.
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let mut attempt = AuthAttempt::new();
    let challenge = state
        .handshake
        .request_challenge(
            &mut attempt,
            handshake::ChallengeRequest {
                address: req.address,
                origin: origin.to_string(),
                options: ChallengeOptions {
                    statement: req.statement,
                    chain_id: req.chain_id,
                    uri: req.uri,
                    expiration_time: req.expiration_time,
                    not_before: req.not_before,
                    request_id: req.request_id,
                    resources: req.resources,
                },
            },
        )
        .await?;

    Ok(Json(ChallengeResponse {
        message: message::render(&challenge),
        challenge,
    }))
}

/// POST /api/auth/verify — Verify a signed message and create a session
pub async fn verify_challenge(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<VerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut con = connection(&state).await?;
    enforce_rate_limit(&state, &mut con, &addr, "auth/verify").await?;

    let signature = decode_signature_hex(&req.signature).inspect_err(|e| {
        tracing::warn!(action = "auth_rejected", kind = e.kind(), "Undecodable signature");
    })?;

    let identity = state
        .handshake
        .verify_signed(SignedResponse {
            message: req.message,
            signature,
        })
        .await?;

    let address = identity.address.to_checksum(None);
    let now = identity.verified_at.timestamp().max(0) as u64;
    storage::account::record_login(&mut con, &address, identity.chain_id, now).await?;

    let token = generate_session_token();
    let session = StoredSession {
        token: token.clone(),
        address,
        chain_id: identity.chain_id,
        created_at: now,
    };
    storage::session::store_session(&mut con, &session, state.config.session_ttl_secs).await?;

    Ok(Json(VerifyResponse { token, identity }))
}

/// GET /api/auth/me — The account behind the current session
pub async fn me(
    session: AuthSession,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let mut con = connection(&state).await?;
    let address = session.address.to_checksum(None);

    let account = storage::account::get_account(&mut con, &address)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;

    Ok(Json(MeResponse {
        address,
        chain_id: session.chain_id,
        first_seen: account.first_seen,
        last_login: account.last_login,
    }))
}

/// POST /api/auth/logout — Invalidate current session
pub async fn logout(
    session: AuthSession,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let mut con = connection(&state).await?;
    let address = session.address.to_checksum(None);

    storage::session::delete_session(&mut con, &session.token, &address).await?;

    tracing::info!(action = "logout", address = %address, "Account logged out");

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/logout/all — Invalidate every session of the current account
pub async fn logout_all(
    session: AuthSession,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let mut con = connection(&state).await?;
    let address = session.address.to_checksum(None);

    let revoked = storage::session::delete_account_sessions(&mut con, &address).await?;

    tracing::info!(action = "logout_all", address = %address, revoked = revoked, "Account sessions revoked");

    Ok(StatusCode::NO_CONTENT)
}
