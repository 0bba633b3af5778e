//! Per-connection session state and the session store.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use bytes::Bytes;
use murmur_types::{rpc, ToolDescriptor};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// Stable identifier issued at accept time; the session map key. Keying by
/// an id rather than a live I/O handle keeps the map usable from tasks that
/// never touch the socket.
pub type ConnectionId = u64;

/// Queue depth for the per-connection outbound writer. Bounded so a slow
/// device applies back-pressure to producers instead of growing memory.
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// One outbound frame queued for the connection's writer task.
#[derive(Debug)]
pub enum OutboundFrame {
    /// Serialized JSON control envelope, sent as a text frame.
    Control(String),
    /// Raw audio bytes; an empty payload is the end-of-stream sentinel.
    Binary(Bytes),
}

/// Registration state, replaced wholesale on re-registration.
#[derive(Debug, Clone)]
struct Registration {
    mac_addr: String,
    tools: Vec<ToolDescriptor>,
}

/// All mutable state for one live connection.
///
/// The std locks here guard brief map/buffer operations that never span an
/// `.await` point, so synchronous locking is safe and cheaper than the
/// tokio equivalents.
pub struct Session {
    id: ConnectionId,
    remote_addr: SocketAddr,
    outbound: mpsc::Sender<OutboundFrame>,
    registration: RwLock<Option<Registration>>,
    /// Raw PCM for the utterance currently being recorded.
    audio: Mutex<Vec<u8>>,
    /// In-flight remote tool calls awaiting a device reply.
    pending_tools: Mutex<HashMap<String, oneshot::Sender<Value>>>,
    /// One response delivery at a time per connection.
    delivering: AtomicBool,
}

impl Session {
    pub fn new(
        id: ConnectionId,
        remote_addr: SocketAddr,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        Self {
            id,
            remote_addr,
            outbound,
            registration: RwLock::new(None),
            audio: Mutex::new(Vec::new()),
            pending_tools: Mutex::new(HashMap::new()),
            delivering: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Sets the device identity and its declared tools, replacing any prior
    /// registration wholesale.
    pub fn register(&self, mac_addr: String, tools: Vec<ToolDescriptor>) {
        let mut slot = self
            .registration
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Registration { mac_addr, tools });
    }

    pub fn is_registered(&self) -> bool {
        self.registration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn mac_addr(&self) -> Option<String> {
        self.registration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.mac_addr.clone())
    }

    /// Device-declared tools followed by the server built-ins. Names are not
    /// de-duplicated: lookups scan in order, so a device-declared name
    /// shadows a built-in.
    pub fn effective_tools(&self, builtins: &[ToolDescriptor]) -> Vec<ToolDescriptor> {
        let mut tools = self
            .registration
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|r| r.tools.clone())
            .unwrap_or_default();
        tools.extend_from_slice(builtins);
        tools
    }

    pub fn append_audio(&self, chunk: &[u8]) {
        self.audio
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(chunk);
    }

    /// Atomically drains the accumulated recording.
    pub fn take_audio(&self) -> Vec<u8> {
        std::mem::take(&mut *self.audio.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn clear_audio(&self) {
        self.audio
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Queues a control envelope for the writer task. A closed connection
    /// makes this a logged no-op — callers never see the failure.
    pub async fn send_control(&self, frame: Value) {
        let json = frame.to_string();
        if self
            .outbound
            .send(OutboundFrame::Control(json))
            .await
            .is_err()
        {
            warn!(
                connection_id = self.id,
                "dropping control frame for closed connection"
            );
        }
    }

    /// Queues binary audio for the writer task; same no-op semantics as
    /// [`Session::send_control`].
    pub async fn send_binary(&self, data: Bytes) {
        if self.outbound.send(OutboundFrame::Binary(data)).await.is_err() {
            warn!(
                connection_id = self.id,
                "dropping binary frame for closed connection"
            );
        }
    }

    /// Sends a server-initiated control event.
    pub async fn send_event(&self, method: &str, params: Value) {
        self.send_control(rpc::event(method, params)).await;
    }

    /// Registers a pending handle for a delegated tool call and returns the
    /// receiver its result will arrive on. Dropped on disconnect, which
    /// wakes the waiter with a closed-channel error.
    pub fn register_pending(&self, call_id: String) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.pending_tools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(call_id, tx);
        rx
    }

    /// Routes a device tool result to its pending handle. Returns false for
    /// unknown (or already resolved) call ids.
    pub fn resolve_pending(&self, call_id: &str, outcome: Value) -> bool {
        let sender = self
            .pending_tools
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(call_id);
        match sender {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Claims the delivery slot. Returns false while another delivery for
    /// this session is in flight; two interleaved audio streams on one
    /// connection would be a protocol violation.
    pub fn begin_delivery(&self) -> bool {
        self.delivering
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_delivery(&self) {
        self.delivering.store(false, Ordering::Release);
    }
}

/// Arena of live sessions keyed by connection id.
///
/// The only state shared across connections; insertion and removal are
/// atomic with respect to lookups via the single lock.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<tokio::sync::RwLock<HashMap<ConnectionId, Arc<Session>>>>,
    next_id: Arc<AtomicU64>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a session for a newly accepted connection.
    pub async fn insert(
        &self,
        remote_addr: SocketAddr,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Arc<Session> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session::new(id, remote_addr, outbound));
        let mut sessions = self.sessions.write().await;
        sessions.insert(id, session.clone());
        info!(connection_id = id, %remote_addr, count = sessions.len(), "session created");
        session
    }

    /// Removes a session on disconnect. Its buffer and pending handles go
    /// with it; any tool result arriving later is dropped.
    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(&id);
        if removed.is_some() {
            info!(connection_id = id, count = sessions.len(), "session removed");
        }
        removed
    }

    pub async fn get(&self, id: ConnectionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
