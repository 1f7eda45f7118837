use crate::auth::challenge::ChallengePolicy;
use std::env;
use std::net::SocketAddr;

/// Where challenge nonces are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceStoreKind {
    Redis,
    Memory,
}

impl std::str::FromStr for NonceStoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(NonceStoreKind::Redis),
            "memory" => Ok(NonceStoreKind::Memory),
            _ => Err(format!("expected 'redis' or 'memory', got '{}'", s)),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    // Redis
    pub redis_url: String,

    // Server
    pub bind_addr: SocketAddr,

    // Relying party
    pub auth_domain: String,
    pub auth_scheme: Option<String>,
    pub auth_statement: Option<String>,
    pub allowed_origins: Vec<String>,
    pub chain_id: u64,
    pub allowed_chain_ids: Vec<u64>,

    // Nonces
    pub nonce_ttl_secs: u64,
    pub nonce_store: NonceStoreKind,
    pub sweep_interval_secs: u64,

    // Sessions
    pub session_ttl_secs: u64,

    // Rate limiting
    pub rate_limit_auth_per_min: u32,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("bind_addr", &self.bind_addr)
            .field("auth_domain", &self.auth_domain)
            .field("auth_scheme", &self.auth_scheme)
            .field("auth_statement", &self.auth_statement)
            .field("allowed_origins", &self.allowed_origins)
            .field("chain_id", &self.chain_id)
            .field("allowed_chain_ids", &self.allowed_chain_ids)
            .field("nonce_ttl_secs", &self.nonce_ttl_secs)
            .field("nonce_store", &self.nonce_store)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("rate_limit_auth_per_min", &self.rate_limit_auth_per_min)
            .finish()
    }
}

/// Upper bound for `NONCE_TTL_SECS` (one day).
pub const MAX_NONCE_TTL_SECS: u64 = 86_400;

/// Upper bound for `SWEEP_INTERVAL_SECS` (one hour).
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 3_600;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        let _ = dotenvy::dotenv();

        // Redis — required to prevent silent unauthenticated connections
        let redis_url =
            env::var("REDIS_URL").map_err(|_| ConfigError::MissingVar("REDIS_URL".to_string()))?;

        // Server
        let bind_addr_str = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;

        // Relying party: the domain is what users see in their wallet
        let auth_domain = env::var("AUTH_DOMAIN")
            .map_err(|_| ConfigError::MissingVar("AUTH_DOMAIN".to_string()))?
            .trim()
            .to_string();
        if auth_domain.is_empty()
            || auth_domain.contains('/')
            || auth_domain.chars().any(char::is_whitespace)
        {
            return Err(ConfigError::InvalidValue(
                "AUTH_DOMAIN".to_string(),
                "must be a bare host[:port]".to_string(),
            ));
        }

        let auth_scheme = env::var("AUTH_SCHEME")
            .ok()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty());
        if let Some(scheme) = &auth_scheme {
            if !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
            {
                return Err(ConfigError::InvalidValue(
                    "AUTH_SCHEME".to_string(),
                    "invalid URI scheme".to_string(),
                ));
            }
        }

        let auth_statement = match env::var("AUTH_STATEMENT") {
            Ok(s) if s.is_empty() => None,
            Ok(s) => Some(s),
            Err(_) => Some("Sign in with Ethereum".to_string()),
        };
        if auth_statement
            .as_deref()
            .is_some_and(|s| s.contains('\n') || s.contains('\r'))
        {
            return Err(ConfigError::InvalidValue(
                "AUTH_STATEMENT".to_string(),
                "must be a single line".to_string(),
            ));
        }

        let allowed_origins = parse_list("ALLOWED_ORIGINS");

        let chain_id: u64 = parse_env_or_default("CHAIN_ID", 1)?;
        let allowed_chain_ids = match env::var("ALLOWED_CHAIN_IDS") {
            Ok(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<u64>().map_err(|e| {
                        ConfigError::ParseError("ALLOWED_CHAIN_IDS".to_string(), format!("{}: {}", e, s))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Err(_) => vec![chain_id],
        };
        if !allowed_chain_ids.contains(&chain_id) {
            return Err(ConfigError::InvalidValue(
                "ALLOWED_CHAIN_IDS".to_string(),
                format!("must include CHAIN_ID {}", chain_id),
            ));
        }

        // Nonces
        let nonce_ttl_secs: u64 = parse_env_or_default("NONCE_TTL_SECS", 300)?;
        if !(1..=MAX_NONCE_TTL_SECS).contains(&nonce_ttl_secs) {
            return Err(ConfigError::InvalidValue(
                "NONCE_TTL_SECS".to_string(),
                format!("must be between 1 and {}", MAX_NONCE_TTL_SECS),
            ));
        }
        let nonce_store = parse_env_or_default("NONCE_STORE", NonceStoreKind::Redis)?;
        let sweep_interval_secs: u64 = parse_env_or_default("SWEEP_INTERVAL_SECS", 60)?;
        if !(1..=MAX_SWEEP_INTERVAL_SECS).contains(&sweep_interval_secs) {
            return Err(ConfigError::InvalidValue(
                "SWEEP_INTERVAL_SECS".to_string(),
                format!("must be between 1 and {}", MAX_SWEEP_INTERVAL_SECS),
            ));
        }

        // Sessions
        let session_ttl_secs = parse_env_or_default("SESSION_TTL_SECS", 900)?;

        // Rate limiting
        let rate_limit_auth_per_min = parse_env_or_default("RATE_LIMIT_AUTH_PER_MIN", 10)?;

        Ok(Config {
            redis_url,
            bind_addr,
            auth_domain,
            auth_scheme,
            auth_statement,
            allowed_origins,
            chain_id,
            allowed_chain_ids,
            nonce_ttl_secs,
            nonce_store,
            sweep_interval_secs,
            session_ttl_secs,
            rate_limit_auth_per_min,
        })
    }

    /// Challenge rules derived from the relying-party settings.
    pub fn challenge_policy(&self) -> ChallengePolicy {
        ChallengePolicy {
            domain: self.auth_domain.clone(),
            scheme: self.auth_scheme.clone(),
            statement: self.auth_statement.clone(),
            allowed_origins: self.allowed_origins.clone(),
            default_chain_id: self.chain_id,
            allowed_chain_ids: self.allowed_chain_ids.clone(),
        }
    }
}

/// Comma-separated list, trimmed, empty entries dropped.
fn parse_list(key: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}
