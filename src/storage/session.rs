//! Session Redis operations.
//!
//! Redis key patterns:
//! - `session:{token}` — session data (JSON)
//! - `account_sessions:{address}` — set of live tokens for an account
//!
//! Session JSON read back from Redis is held in `Zeroizing` so the token
//! copy inside it is cleared once deserialized. Redis keeps its own copy.

use super::json_error;
use crate::models::StoredSession;
use redis::AsyncCommands;
use zeroize::Zeroizing;

fn session_key(token: &str) -> String {
    format!("session:{}", token)
}

fn account_sessions_key(address: &str) -> String {
    format!("account_sessions:{}", address.to_ascii_lowercase())
}

/// Store a session in Redis with TTL.
///
/// Also adds the token to the account's tracking set so every session of an
/// account can be revoked at once.
pub async fn store_session<C>(
    con: &mut C,
    session: &StoredSession,
    ttl_secs: u64,
) -> Result<(), redis::RedisError>
where
    C: AsyncCommands,
{
    let sessions_key = account_sessions_key(&session.address);
    let json = serde_json::to_string(session).map_err(|e| json_error("JSON serialize", e))?;

    con.set_ex::<_, _, ()>(session_key(&session.token), json, ttl_secs)
        .await?;

    con.sadd::<_, _, ()>(&sessions_key, &session.token).await?;
    // Keep the set alive at least as long as the newest session
    con.expire::<_, ()>(&sessions_key, ttl_secs as i64).await?;

    Ok(())
}

/// Get a session by token.
pub async fn get_session<C>(
    con: &mut C,
    token: &str,
) -> Result<Option<StoredSession>, redis::RedisError>
where
    C: AsyncCommands,
{
    let json: Option<String> = con.get(session_key(token)).await?;

    match json {
        Some(data) => {
            let data = Zeroizing::new(data);
            let session =
                serde_json::from_str(&data).map_err(|e| json_error("JSON deserialize", e))?;
            Ok(Some(session))
        }
        None => Ok(None),
    }
}

/// Delete a session from Redis.
///
/// Returns true if the session was deleted, false if it didn't exist.
pub async fn delete_session<C>(
    con: &mut C,
    token: &str,
    address: &str,
) -> Result<bool, redis::RedisError>
where
    C: AsyncCommands,
{
    let deleted: i32 = con.del(session_key(token)).await?;
    con.srem::<_, _, ()>(account_sessions_key(address), token)
        .await?;
    Ok(deleted > 0)
}

/// Delete all sessions of an account. Returns how many tokens were tracked.
pub async fn delete_account_sessions<C>(
    con: &mut C,
    address: &str,
) -> Result<usize, redis::RedisError>
where
    C: AsyncCommands,
{
    let sessions_key = account_sessions_key(address);
    let tokens: Vec<String> = con.smembers(&sessions_key).await?;

    for token in &tokens {
        con.del::<_, ()>(session_key(token)).await?;
    }
    con.del::<_, ()>(&sessions_key).await?;

    Ok(tokens.len())
}
