//! WebSocket connection handling and inbound frame routing.
//!
//! One task per connection reads frames sequentially: a frame is fully
//! processed — including any synchronous tool or chat work — before the
//! next is read, so session mutations from the router never race each
//! other. A second, dedicated task is the connection's single writer; every
//! outbound frame from any producer funnels through its queue.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use murmur_agent::{DeviceLink, TextStream};
use murmur_endpoint::{Decision, Endpointer};
use murmur_types::rpc::{self, methods};
use murmur_types::{InboundFrame, ToolDescriptor};
use murmur_voice::{wav, SpeechSynthesizer};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::delivery;
use crate::session::{OutboundFrame, Session, OUTBOUND_QUEUE_DEPTH};
use crate::AppState;

/// `GET /ws` — upgrades the device connection.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// Whether the read loop keeps going after a control frame.
enum RouteOutcome {
    Continue,
    Close,
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_QUEUE_DEPTH);
    let session = state.sessions.insert(addr, tx).await;

    // The single writer for this connection.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let message = match frame {
                OutboundFrame::Control(json) => Message::Text(json.into()),
                OutboundFrame::Binary(bytes) => Message::Binary(bytes),
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let link: Arc<dyn DeviceLink> = Arc::new(SessionLink {
        session: session.clone(),
        tts: state.tts.clone(),
        builtin_tools: state.local_tools.descriptors(),
    });

    // Endpointing state for the active recording window. Lives on this
    // task because message handling is sequential per connection.
    let mut endpointer: Option<Endpointer> = None;

    loop {
        let message = match tokio::time::timeout(state.idle_timeout, receiver.next()).await {
            Err(_) => {
                info!(%addr, "idle read timeout, closing connection");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                warn!(%addr, "websocket receive error: {e}");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Binary(data) => {
                handle_audio_frame(&state, &session, &link, &mut endpointer, &data).await;
            }
            Message::Text(text) => {
                match handle_control_frame(&state, &session, &link, &mut endpointer, &text).await {
                    RouteOutcome::Continue => {}
                    RouteOutcome::Close => break,
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // Teardown discards the buffer, the endpointer, and the pending tool
    // handles; in-flight external calls run to completion but their sends
    // become no-ops.
    state.sessions.remove(session.id()).await;
    send_task.abort();
    info!(%addr, mac_addr = ?session.mac_addr(), "device disconnected");
}

/// Binary frames: audio for the active recording window. Without a window
/// the audio is not being collected and the frame is dropped silently.
async fn handle_audio_frame(
    state: &Arc<AppState>,
    session: &Arc<Session>,
    link: &Arc<dyn DeviceLink>,
    endpointer: &mut Option<Endpointer>,
    data: &[u8],
) {
    let Some(engine) = endpointer.as_mut() else {
        return;
    };

    session.append_audio(data);
    match engine.feed(data) {
        Ok(Decision::Continue) => {}
        Ok(Decision::Stop) => {
            // Server-detected end of utterance: tell the device to stop
            // transmitting, then join the same completion path as an
            // explicit end_stream.
            session
                .send_event(methods::AUDIO_STOP_STREAM, json!({}))
                .await;
            *endpointer = None;
            finish_utterance(state, session, link).await;
        }
        Err(e) => warn!("endpointing failed: {e}"),
    }
}

async fn handle_control_frame(
    state: &Arc<AppState>,
    session: &Arc<Session>,
    link: &Arc<dyn DeviceLink>,
    endpointer: &mut Option<Endpointer>,
    text: &str,
) -> RouteOutcome {
    let frame = match InboundFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("dropping malformed control frame: {e}");
            return RouteOutcome::Continue;
        }
    };

    let Some(method) = frame.method.clone() else {
        if frame.is_tool_result() {
            resolve_tool_result(session, &frame);
        } else {
            warn!("dropping control frame with no method");
        }
        return RouteOutcome::Continue;
    };

    if method == methods::REGISTER_TOOLS {
        return handle_registration(state, session, &frame).await;
    }

    // A device must identify itself before anything else is honored.
    if !session.is_registered() {
        warn!(%method, "control message before registration, dropping");
        return RouteOutcome::Continue;
    }

    match method.as_str() {
        methods::AUDIO_START_STREAM => {
            let Some(scorer) = &state.scorer else {
                error!("audio/start_stream rejected: endpointing is not configured");
                return RouteOutcome::Continue;
            };
            match Endpointer::new(scorer.clone(), state.endpoint_config) {
                Ok(engine) => {
                    *endpointer = Some(engine);
                    session.clear_audio();
                    debug!(mac_addr = ?session.mac_addr(), "recording window opened");
                }
                Err(e) => error!("failed to create endpointer: {e}"),
            }
        }
        methods::AUDIO_END_STREAM => {
            if endpointer.take().is_none() {
                debug!("end_stream with no active recording window, ignoring");
                return RouteOutcome::Continue;
            }
            let params = frame.params_object();
            let reason = params.get("reason").and_then(Value::as_str);
            if reason == Some("timeout") {
                // The device gave up listening; discard without an agent run.
                info!(mac_addr = ?session.mac_addr(), "client listening timeout, discarding recording");
                session.clear_audio();
            } else {
                finish_utterance(state, session, link).await;
            }
        }
        other => debug!(method = %other, "ignoring unrecognized method"),
    }
    RouteOutcome::Continue
}

/// `registerTools`: a registration without `mac_addr` closes the connection
/// without a reply; success acks and upserts the device registry row.
async fn handle_registration(
    state: &Arc<AppState>,
    session: &Arc<Session>,
    frame: &InboundFrame,
) -> RouteOutcome {
    let params = frame.params_object();
    let Some(mac_addr) = params
        .get("mac_addr")
        .and_then(Value::as_str)
        .map(str::to_string)
    else {
        warn!(remote_addr = %session.remote_addr(), "registration without mac_addr, closing connection");
        return RouteOutcome::Close;
    };

    let tools: Vec<ToolDescriptor> = match params.get("tools") {
        Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
            warn!(mac_addr = %mac_addr, "ignoring undecodable tool declarations: {e}");
            Vec::new()
        }),
        None => Vec::new(),
    };
    let tool_count = tools.len();
    session.register(mac_addr.clone(), tools);

    // Registry write off the async context.
    let pool = state.pool.clone();
    let mac = mac_addr.clone();
    let result = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| e.to_string())?;
        murmur_db::upsert_device(&conn, &mac).map_err(|e| e.to_string())
    })
    .await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(mac_addr = %mac_addr, "device registry update failed: {e}"),
        Err(e) => error!(mac_addr = %mac_addr, "device registry task failed: {e}"),
    }

    session
        .send_control(rpc::registration_ack(frame.id.as_deref()))
        .await;
    info!(mac_addr = %mac_addr, tools = tool_count, "device registered");
    RouteOutcome::Continue
}

fn resolve_tool_result(session: &Arc<Session>, frame: &InboundFrame) {
    let Some(id) = frame.id.as_deref() else {
        return;
    };
    let outcome = frame
        .result
        .clone()
        .map(|result| json!({"result": result}))
        .unwrap_or_else(|| json!({"error": frame.error.clone()}));

    if !session.resolve_pending(id, outcome) {
        warn!(call_id = %id, "tool result for unknown or expired call id, dropping");
    }
}

/// The shared tail of both utterance endings (server-detected silence and
/// client-declared end): drain the recording, transcribe it, and run the
/// agent graph.
async fn finish_utterance(
    state: &Arc<AppState>,
    session: &Arc<Session>,
    link: &Arc<dyn DeviceLink>,
) {
    let pcm = session.take_audio();
    if pcm.is_empty() {
        debug!("recording window produced no audio");
        return;
    }

    let wav = wav::wrap_pcm(&pcm, state.endpoint_config.sample_rate, 1);
    let text = match state.asr.transcribe(wav).await {
        Ok(text) => text,
        Err(e) => {
            error!("transcription failed: {e}");
            return;
        }
    };
    if text.trim().is_empty() {
        debug!("empty transcription, skipping agent run");
        return;
    }
    info!(mac_addr = ?session.mac_addr(), utterance = %text, "utterance transcribed");

    state.graph.run(&text, Some(link.clone())).await;
}

/// The graph's view of one connection.
struct SessionLink {
    session: Arc<Session>,
    tts: Arc<dyn SpeechSynthesizer>,
    builtin_tools: Vec<ToolDescriptor>,
}

#[async_trait]
impl DeviceLink for SessionLink {
    fn effective_tools(&self) -> Vec<ToolDescriptor> {
        self.session.effective_tools(&self.builtin_tools)
    }

    async fn send_event(&self, method: &str, params: Value) {
        self.session.send_event(method, params).await;
    }

    async fn dispatch_remote_tool(&self, name: &str, args: &Value) -> String {
        let (call_id, frame) = rpc::tool_execute_request(name, args);
        let rx = self.session.register_pending(call_id.clone());
        self.session.send_control(frame).await;

        // The result arrives out-of-band; a detached waiter surfaces it.
        // A dropped sender (disconnect) ends the wait quietly.
        let tool = name.to_string();
        let id = call_id.clone();
        tokio::spawn(async move {
            match rx.await {
                Ok(outcome) => {
                    info!(tool = %tool, call_id = %id, outcome = %outcome, "device tool result received");
                }
                Err(_) => {
                    debug!(tool = %tool, call_id = %id, "session closed before device tool result");
                }
            }
        });

        call_id
    }

    async fn deliver_text(&self, text: TextStream) -> String {
        delivery::deliver_text(&self.session, self.tts.as_ref(), text).await
    }

    async fn deliver_pcm(&self, pcm: Bytes) {
        delivery::deliver_pcm(&self.session, pcm).await;
    }
}
