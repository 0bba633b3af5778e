//! murmur gateway binary — the main entry point.
//!
//! Starts the WebSocket gateway with structured logging, device registry
//! initialization, capability client construction, and graceful shutdown
//! on SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use murmur_agent::{AgentGraph, OllamaClient};
use murmur_endpoint::{EndpointConfig, EnergyScorer, SpeechScorer};
use murmur_server::{app, config, session::SessionStore, tools, AppState};
use murmur_voice::{HttpAsr, HttpMusicSource, HttpTts};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("MURMUR_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the gateway cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Initialize the device registry
    let pool = murmur_db::create_pool(&config.database.path, murmur_db::DbSettings::default())
        .expect("failed to create database pool — check database.path in config");
    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied =
            murmur_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    // Capability clients, constructed once and injected everywhere.
    let asr = Arc::new(HttpAsr::new(config.asr.url.clone()));
    let tts = Arc::new(HttpTts::new(config.tts.url.clone(), config.tts.api_key.clone()));
    let reasoner = Arc::new(OllamaClient::new(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
    ));
    let music = Arc::new(HttpMusicSource::new(config.music.url.clone()));

    let scorer: Option<Arc<dyn SpeechScorer>> = if config.endpointing.enabled {
        Some(Arc::new(EnergyScorer::new(
            config.endpointing.energy_reference,
        )))
    } else {
        tracing::warn!("endpointing disabled; recording windows will be rejected");
        None
    };
    let endpoint_config = EndpointConfig {
        threshold: config.endpointing.threshold,
        sample_rate: config.endpointing.sample_rate,
        min_silence_ms: config.endpointing.min_silence_ms,
    };

    let local_tools = Arc::new(tools::builtin_registry(music));
    let graph = Arc::new(AgentGraph::new(reasoner, local_tools.clone()));

    let state = AppState {
        pool,
        sessions: SessionStore::new(),
        scorer,
        endpoint_config,
        asr,
        tts,
        graph,
        local_tools,
        idle_timeout: Duration::from_secs(config.session.idle_timeout_secs),
    };

    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting murmur gateway");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address — is another process using this port?");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    tracing::info!("murmur gateway shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
