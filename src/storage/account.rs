//! Account Redis operations.
//!
//! Redis key patterns:
//! - `account:{address}` — account data (JSON), address lowercased
//!
//! Accounts have no TTL. An account exists once its address has completed a
//! sign-in.

use super::json_error;
use crate::models::StoredAccount;
use redis::AsyncCommands;

fn account_key(address: &str) -> String {
    format!("account:{}", address.to_ascii_lowercase())
}

/// Get an account by address.
pub async fn get_account<C>(
    con: &mut C,
    address: &str,
) -> Result<Option<StoredAccount>, redis::RedisError>
where
    C: AsyncCommands,
{
    let json: Option<String> = con.get(account_key(address)).await?;
    json.map(|data| serde_json::from_str(&data).map_err(|e| json_error("JSON deserialize", e)))
        .transpose()
}

/// Record a successful sign-in, creating the account on first use.
///
/// Returns the account as stored after the update.
pub async fn record_login<C>(
    con: &mut C,
    address: &str,
    chain_id: u64,
    now: u64,
) -> Result<StoredAccount, redis::RedisError>
where
    C: AsyncCommands,
{
    let account = match get_account(con, address).await? {
        Some(existing) => StoredAccount {
            last_login: now,
            last_chain_id: chain_id,
            ..existing
        },
        None => {
            tracing::info!(action = "account_created", address = %address, "New account");
            StoredAccount {
                address: address.to_string(),
                first_seen: now,
                last_login: now,
                last_chain_id: chain_id,
            }
        }
    };

    let json = serde_json::to_string(&account).map_err(|e| json_error("JSON serialize", e))?;
    con.set::<_, _, ()>(account_key(address), json).await?;

    Ok(account)
}
