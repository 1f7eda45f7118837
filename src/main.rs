//! siwe-auth application entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Connect to Redis
//! 3. Initialize the nonce store (Redis or in-process)
//! 4. Build router with API routes, CORS and security headers
//! 5. Start Axum server, tearing the nonce store down on shutdown
//!
//! Also supports `keygen` and `sign` subcommands for local testing against a
//! running server.

use siwe_auth::{
    auth::middleware::AppState,
    auth::nonce::{MemoryNonceStore, NonceStore},
    auth::signer::LocalKeySigner,
    config::{Config, NonceStoreKind},
    middleware::security_headers,
    routes,
    storage::RedisNonceStore,
    sweep,
};
use alloy_primitives::hex;
use axum::http::{header, HeaderValue, Method};
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  siwe-auth                 Run the server");
    eprintln!("  siwe-auth keygen          Print a fresh development key and its address");
    eprintln!("  siwe-auth sign <hex-key>  Sign the message read from stdin");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  curl -s ... | jq -r .message | siwe-auth sign 0xac09...ff80");
}

fn keygen() {
    let signer = LocalKeySigner::random();
    println!("private_key={}", signer.to_hex().as_str());
    println!("address={}", signer.address().to_checksum(None));
}

fn sign(key_hex: &str) -> Result<String, String> {
    let signer = LocalKeySigner::from_hex(key_hex).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| format!("Failed to read stdin: {}", e))?;
    // Shell pipelines append one newline; the message itself never ends in one.
    let message = input.strip_suffix('\n').unwrap_or(&input);

    let signature = signer.sign_sync(message).map_err(|e| e.to_string())?;
    Ok(hex::encode_prefixed(signature))
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring unparseable allowed origin");
                None
            }
        })
        .collect();

    // An empty list rejects every cross-origin request.
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        None => {}
        Some("keygen") if args.len() == 2 => {
            keygen();
            return;
        }
        Some("sign") if args.len() == 3 => {
            match sign(&args[2]) {
                Ok(signature) => println!("{}", signature),
                Err(e) => {
                    eprintln!("Error signing message: {}", e);
                    std::process::exit(1);
                }
            }
            return;
        }
        Some(_) => {
            print_usage();
            std::process::exit(1);
        }
    }

    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().expect("Failed to load config");
    tracing::info!(
        domain = %config.auth_domain,
        chains = ?config.allowed_chain_ids,
        "Starting siwe-auth on {}",
        config.bind_addr
    );

    let redis_client = redis::Client::open(config.redis_url.as_str()).expect("Invalid Redis URL");

    // Verify Redis connection; sessions and rate limits always need it
    redis_client
        .get_multiplexed_async_connection()
        .await
        .expect("Failed to connect to Redis");

    let nonce_store: Arc<dyn NonceStore> = match config.nonce_store {
        NonceStoreKind::Redis => Arc::new(RedisNonceStore::new(redis_client.clone())),
        NonceStoreKind::Memory => Arc::new(MemoryNonceStore::new()),
    };
    nonce_store
        .init()
        .await
        .expect("Failed to initialize nonce store");
    tracing::info!(store = ?config.nonce_store, ttl_secs = config.nonce_ttl_secs, "Nonce store ready");

    let cors = cors_layer(&config);
    let bind_addr = config.bind_addr;
    let sweep_interval = Duration::from_secs(config.sweep_interval_secs);
    let state = AppState::new(config.clone(), redis_client, nonce_store.clone());

    if config.nonce_store == NonceStoreKind::Memory {
        tokio::spawn(sweep::run_sweep_loop(
            state.handshake.registry().clone(),
            sweep_interval,
        ));
    }

    let app = routes::api_router()
        .layer(axum::extract::DefaultBodyLimit::max(16 * 1024))
        .layer(cors)
        .layer(axum::middleware::from_fn(security_headers))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", bind_addr);

    // with_connect_info is required for ConnectInfo<SocketAddr> extractors
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    if config.nonce_store == NonceStoreKind::Memory {
        if let Err(e) = nonce_store.teardown().await {
            tracing::error!(error = %e, "Nonce store teardown failed");
        }
    }
}
