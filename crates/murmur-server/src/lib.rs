//! murmur gateway server library.
//!
//! Wires the session store, frame router, endpointing engine, agent graph,
//! and response delivery pipeline behind one axum router: `/health` plus
//! the `/ws` device connection upgrade.

pub mod config;
pub mod delivery;
pub mod session;
pub mod tools;
pub mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Extension, Json, Router};
use murmur_agent::{AgentGraph, ToolRegistry};
use murmur_db::DbPool;
use murmur_endpoint::{EndpointConfig, SpeechScorer};
use murmur_voice::{SpeechRecognizer, SpeechSynthesizer};
use serde_json::{json, Value};
use session::SessionStore;

/// Process-wide state shared by every connection handler.
///
/// All capability clients are constructed once at startup and injected;
/// no core component builds its own collaborators.
pub struct AppState {
    /// Device registry pool.
    pub pool: DbPool,
    /// Arena of live sessions.
    pub sessions: SessionStore,
    /// Speech-probability scorer; `None` when endpointing is disabled, in
    /// which case recording windows are rejected at runtime.
    pub scorer: Option<Arc<dyn SpeechScorer>>,
    /// Endpointing parameters applied to every recording window.
    pub endpoint_config: EndpointConfig,
    /// Speech recognition capability.
    pub asr: Arc<dyn SpeechRecognizer>,
    /// Speech synthesis capability.
    pub tts: Arc<dyn SpeechSynthesizer>,
    /// The agent execution graph, shared by all connections.
    pub graph: Arc<AgentGraph>,
    /// Built-in server-side tools.
    pub local_tools: Arc<ToolRegistry>,
    /// Idle read timeout per connection.
    pub idle_timeout: Duration,
}

/// Health check handler.
///
/// Returns `200 OK` with server status and version. Used by monitoring and
/// CI to verify the gateway is running.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::ws_handler))
        .layer(Extension(Arc::new(state)))
}
