//! ddk-daemon entry point.
//!
//! Intentionally thin: tracing, config, database, shared state, middleware,
//! serve. All route handlers live in `routes.rs`; shared state and the
//! background tasks (heartbeat, drift sweep, idempotency GC) in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use ddk_daemon::{routes, state};
use ddk_notify::{LogNotifier, Notifier, WebhookNotifier};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = load_config()?;
    info!(config_hash = %loaded.config_hash, "config loaded");
    let config = loaded.config.clone();

    let pool = ddk_db::connect_from_env(config.database.max_connections).await?;
    ddk_db::migrate(&pool).await?;

    let notifier: Arc<dyn Notifier> = match &config.notifications.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url, config.notifications.timeout_ms)?),
        None => Arc::new(LogNotifier),
    };

    let shared = Arc::new(state::AppState::new(
        pool,
        config.clone(),
        loaded.config_hash,
        notifier,
    )?);

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    state::spawn_drift_sweep(
        Arc::clone(&shared),
        Duration::from_secs(config.saga.drift_sweep_secs.max(1)),
    );
    state::spawn_idempotency_gc(
        Arc::clone(&shared),
        Duration::from_secs(config.idempotency.purge_interval_secs.max(60)),
    );

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr(&config)?;
    info!("ddk-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Config layering: DDK_CONFIG is a comma-separated list of YAML paths
/// (earlier = base, later = override); unset means all defaults.
fn load_config() -> anyhow::Result<ddk_config::LoadedConfig> {
    match std::env::var("DDK_CONFIG") {
        Ok(raw) => {
            let paths: Vec<&str> = raw.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
            ddk_config::load_layered_yaml(&paths)
        }
        Err(_) => ddk_config::load_layered_yaml_from_strings(&["{}"]),
    }
}

fn bind_addr(config: &ddk_config::DealDeskConfig) -> anyhow::Result<SocketAddr> {
    // DDK_DAEMON_ADDR overrides the config file.
    if let Ok(raw) = std::env::var("DDK_DAEMON_ADDR") {
        return raw.parse().context("DDK_DAEMON_ADDR is not a socket address");
    }
    config
        .server
        .bind_addr
        .parse()
        .context("server.bind_addr is not a socket address")
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
