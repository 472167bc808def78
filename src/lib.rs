//! # tigerpad — session synchronization core for collaborative editing
//!
//! Multiple clients connect to a shared document by session id, edit the
//! same text concurrently, and see each other's cursors and selections.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    WebSocket     ┌──────────────┐
//! │ CollabClient │ ◄──────────────► │ CollabServer │
//! │ (per user)   │   JSON frames    │  (gateway)   │
//! └──────┬───────┘                  └──────┬───────┘
//!        │                                 │
//!        ▼                                 ▼
//! ┌──────────────┐                  ┌──────────────────┐
//! │ Reconciler   │                  │ Session (per id)  │
//! │ (decorations)│                  │  DocumentState    │
//! └──────────────┘                  │  PresenceRegistry │
//!                                   └────────┬─────────┘
//!                                            │
//!                                   ┌────────┴─────────┐
//!                                   │ broadcast channel │
//!                                   │ (ordered fan-out) │
//!                                   └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — JSON wire frames (`code`, `cursor_update`, `collaborators`)
//! - [`presence`] — per-session participant registry
//! - [`document`] — last-writer-wins document state
//! - [`hub`] — per-session ordering authority and fan-out, session registry
//! - [`gateway`] — WebSocket server
//! - [`client`] — WebSocket client
//! - [`reconcile`] — client-side decoration reconciliation
//! - [`store`] — session persistence interface (seed on attach, save on empty)
//! - [`advisor`] — advisory suggestion service interface and poller
//!
//! ## Conflict policy
//!
//! Text edits are whole-document replacements resolved last-writer-wins
//! per session. There is no operational transform and no CRDT merge; two
//! concurrent edits resolve to whichever the session processed second.

pub mod advisor;
pub mod client;
pub mod document;
pub mod gateway;
pub mod hub;
pub mod presence;
pub mod protocol;
pub mod reconcile;
pub mod store;

// Re-exports for convenience
pub use advisor::{
    AdvisoryError, AdvisoryService, HttpAdvisor, Suggestion, SuggestionKind, SuggestionPoller,
    DEFAULT_SUGGEST_INTERVAL,
};
pub use client::{CollabClient, CollabEvent, ConnectionState};
pub use document::DocumentState;
pub use gateway::{CollabServer, GatewayError, ServerConfig, ServerStats, ANONYMOUS_NAME};
pub use hub::{BroadcastScope, DetachOutcome, Outbound, Session, SessionRegistry};
pub use presence::PresenceRegistry;
pub use protocol::{
    ClientMessage, CollaboratorMap, CursorPos, Participant, ParticipantId, ProtocolError,
    SelectionRange, ServerMessage,
};
pub use reconcile::{
    color_for_index, Decoration, DecorationKind, OverlayMarker, ReconcileOutcome, Reconciler,
    Severity, PALETTE,
};
pub use store::{MemoryStore, SessionStore, StoreError, StoredSession};
