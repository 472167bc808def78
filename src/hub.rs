//! Session hub: per-session authoritative state and fan-out.
//!
//! Architecture:
//! ```text
//! Conn A ──┐
//!           ├── Session (id) ── Mutex<DocumentState + PresenceRegistry>
//! Conn B ──┘        │
//!                    └── broadcast channel (ordered fan-out)
//!                              │
//!                   ┌──────────┴──────────┐
//!                   ▼                     ▼
//!                Conn A                Conn B
//! ```
//!
//! Each session serializes its mutations behind one async mutex: the
//! mutate-then-broadcast pair runs as a single atomic step, so every
//! recipient observes broadcasts in the order the hub issued them.
//! Sessions share no mutable state with each other and proceed fully in
//! parallel.
//!
//! Sender filtering happens on the receiving side: every broadcast carries
//! its origin connection and a scope, and each connection's write loop
//! drops frames that are scoped away from it. Identity is by connection,
//! never by display name.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};

use crate::document::DocumentState;
use crate::presence::PresenceRegistry;
use crate::protocol::{
    CollaboratorMap, CursorPos, ParticipantId, SelectionRange, ServerMessage,
};

/// Who a broadcast frame is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastScope {
    /// Every connected participant, sender included (`collaborators`).
    Everyone,
    /// Every participant except the originating connection (`code`).
    ExceptOrigin,
}

/// A pre-encoded frame travelling through a session's broadcast channel.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub origin: ParticipantId,
    pub scope: BroadcastScope,
    pub frame: Arc<String>,
}

impl Outbound {
    /// Whether the given connection should deliver this frame.
    pub fn addressed_to(&self, participant: ParticipantId) -> bool {
        match self.scope {
            BroadcastScope::Everyone => true,
            BroadcastScope::ExceptOrigin => self.origin != participant,
        }
    }
}

/// Result of detaching a participant from a session.
#[derive(Debug)]
pub struct DetachOutcome {
    /// Participants still attached after the detach.
    pub remaining: usize,
    /// The document text at the moment the session emptied, for the
    /// caller's best-effort persistence hook. `None` while participants
    /// remain.
    pub final_code: Option<String>,
}

/// State guarded by the per-session ordering authority.
#[derive(Debug, Default)]
struct SessionState {
    document: DocumentState,
    presence: PresenceRegistry,
    // Set when the registry disposes this session. A handle resolved
    // before the dispose must not attach to the orphan.
    closed: bool,
}

/// One active collaborative session: document, presence, fan-out channel.
pub struct Session {
    id: String,
    state: Mutex<SessionState>,
    broadcast: broadcast::Sender<Outbound>,
}

impl Session {
    /// Create a session seeded with stored text.
    pub fn new(id: impl Into<String>, seed_code: impl Into<String>, capacity: usize) -> Self {
        let (broadcast, _) = broadcast::channel(capacity);
        Self {
            id: id.into(),
            state: Mutex::new(SessionState {
                document: DocumentState::with_code(seed_code),
                presence: PresenceRegistry::new(),
                closed: false,
            }),
            broadcast,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Register a joining participant.
    ///
    /// Returns the current document text — the caller must deliver it to
    /// the new connection before draining the returned receiver — and a
    /// broadcast receiver subscribed *before* the join `collaborators`
    /// snapshot is issued, so the joiner sees itself appear.
    ///
    /// Returns `None` when the registry disposed this session after the
    /// caller resolved its handle; resolve a fresh handle and retry, or
    /// the id splits across two live sessions.
    pub async fn attach(
        &self,
        participant: ParticipantId,
        name: &str,
    ) -> Option<(String, broadcast::Receiver<Outbound>)> {
        let mut state = self.state.lock().await;
        if state.closed {
            return None;
        }
        state.presence.upsert(participant, name, None, None);
        let rx = self.broadcast.subscribe();
        let code = state.document.code().to_string();
        self.send_snapshot(participant, &state.presence);
        log::info!(
            "participant {participant} ({name}) joined session {} ({} connected)",
            self.id,
            state.presence.len()
        );
        Some((code, rx))
    }

    /// Last-writer-wins replace, then `code` broadcast to everyone except
    /// the originating connection.
    pub async fn replace_code(&self, origin: ParticipantId, code: String) {
        let mut state = self.state.lock().await;
        let revision = state.document.replace(code.clone());
        log::debug!("session {}: document replaced at revision {revision}", self.id);
        self.send(origin, BroadcastScope::ExceptOrigin, &ServerMessage::Code { code });
    }

    /// Partial presence update, then a full `collaborators` snapshot to
    /// every participant including the sender.
    pub async fn update_cursor(
        &self,
        origin: ParticipantId,
        name: &str,
        cursor: Option<CursorPos>,
        selection: Option<SelectionRange>,
    ) {
        let mut state = self.state.lock().await;
        state.presence.upsert(origin, name, cursor, selection);
        self.send_snapshot(origin, &state.presence);
    }

    /// Unregister a leaving participant and notify the remainder.
    pub async fn detach(&self, participant: ParticipantId) -> DetachOutcome {
        let mut state = self.state.lock().await;
        if state.presence.remove(&participant).is_none() {
            // Already detached; keep the operation idempotent.
            return DetachOutcome {
                remaining: state.presence.len(),
                final_code: None,
            };
        }

        let remaining = state.presence.len();
        log::info!(
            "participant {participant} left session {} ({remaining} remaining)",
            self.id
        );

        if remaining > 0 {
            self.send_snapshot(participant, &state.presence);
            DetachOutcome {
                remaining,
                final_code: None,
            }
        } else {
            DetachOutcome {
                remaining: 0,
                final_code: Some(state.document.code().to_string()),
            }
        }
    }

    /// Current presence snapshot (for tests and diagnostics).
    pub async fn snapshot(&self) -> CollaboratorMap {
        self.state.lock().await.presence.snapshot()
    }

    /// Current `(text, revision)`.
    pub async fn document(&self) -> (String, u64) {
        let state = self.state.lock().await;
        let (code, revision) = state.document.read();
        (code.to_string(), revision)
    }

    pub async fn participant_count(&self) -> usize {
        self.state.lock().await.presence.len()
    }

    /// Whether the registry has disposed this session.
    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Subscribe without attaching (diagnostic taps, tests).
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.broadcast.subscribe()
    }

    fn send_snapshot(&self, origin: ParticipantId, presence: &PresenceRegistry) {
        self.send(
            origin,
            BroadcastScope::Everyone,
            &ServerMessage::Collaborators {
                collaborators: presence.snapshot(),
            },
        );
    }

    /// Encode and enqueue one broadcast. A send error only means no
    /// receiver is currently subscribed, which is fine during teardown.
    fn send(&self, origin: ParticipantId, scope: BroadcastScope, message: &ServerMessage) {
        match message.encode() {
            Ok(frame) => {
                let _ = self.broadcast.send(Outbound {
                    origin,
                    scope,
                    frame: Arc::new(frame),
                });
            }
            Err(e) => {
                log::error!("session {}: failed to encode broadcast: {e}", self.id);
            }
        }
    }
}

/// Maps session ids to live sessions with an explicit lifecycle.
///
/// This is injected into the connection gateway rather than living in
/// process-global state, so multiple gateways (or tests) can each own an
/// isolated registry.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    broadcast_capacity: usize,
}

impl SessionRegistry {
    pub fn new(broadcast_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            broadcast_capacity,
        }
    }

    /// Get the live session for `id`, creating it seeded with `seed_code`
    /// on first reference. The seed is ignored when the session already
    /// exists — stored text is never authoritative while a session is live.
    pub async fn get_or_create(&self, id: &str, seed_code: String) -> Arc<Session> {
        // Fast path: read lock.
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(id) {
                return session.clone();
            }
        }

        // Slow path: write lock, re-check after acquiring.
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(id) {
            return session.clone();
        }

        let session = Arc::new(Session::new(id, seed_code, self.broadcast_capacity));
        sessions.insert(id.to_string(), session.clone());
        log::info!("session {id} created");
        session
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Drop a session once its last participant has detached.
    ///
    /// The closed flag is set under the session mutex before the registry
    /// entry goes away, so an attach racing this dispose either lands
    /// first (the session is not empty, nothing is disposed) or observes
    /// the closed session and retries through the registry.
    pub async fn dispose_if_empty(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(id) {
            let mut state = session.state.lock().await;
            if state.presence.is_empty() {
                state.closed = true;
                drop(state);
                sessions.remove(id);
                log::info!("session {id} disposed (empty)");
                return true;
            }
        }
        false
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn active_sessions(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }
}
