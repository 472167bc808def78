//! JSON wire protocol for the collaboration session.
//!
//! Frames are UTF-8 text, one JSON object per WebSocket message, tagged
//! by a `"type"` field:
//!
//! ```text
//! client → server   {"type":"code","code":"..."}
//!                   {"type":"cursor_update","cursor":{...},"selection":{...}}
//! server → client   {"type":"code","code":"..."}
//!                   {"type":"collaborators","collaborators":{"<id>":{...},...}}
//! ```
//!
//! The `collaborators` payload is always the full participant map, never a
//! delta, serialized in registry insertion order so every client derives
//! the same index → color mapping.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Connection-scoped participant identity. Unique per socket, not per user.
pub type ParticipantId = Uuid;

/// A cursor position in the shared document (1-based, editor convention).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPos {
    pub line: u32,
    pub column: u32,
}

impl CursorPos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A selection range in the shared document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRange {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SelectionRange {
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }
}

/// One connected collaborator's presence as known to the server.
///
/// `cursor` and `selection` are omitted from the wire entirely while unset,
/// so a participant that never moved its cursor serializes as `{"name":...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPos>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionRange>,
}

impl Participant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cursor: None,
            selection: None,
        }
    }
}

/// Full collaborator snapshot, keyed by participant id in insertion order.
pub type CollaboratorMap = IndexMap<ParticipantId, Participant>;

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Full-text replacement of the shared document.
    Code { code: String },
    /// Cursor and/or selection movement. Either field may be absent;
    /// absent fields leave the server-side state untouched.
    CursorUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cursor: Option<CursorPos>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selection: Option<SelectionRange>,
    },
}

/// Messages the server sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authoritative document text after a replace (or on attach).
    Code { code: String },
    /// Full presence snapshot for the session.
    Collaborators { collaborators: CollaboratorMap },
}

impl ClientMessage {
    /// Serialize to a wire frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Parse an inbound frame. Malformed input is reported, never panics.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(frame).map_err(ProtocolError::Malformed)
    }
}

impl ServerMessage {
    /// Serialize to a wire frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Parse an inbound frame.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(frame).map_err(ProtocolError::Malformed)
    }
}

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("connection closed")]
    ConnectionClosed,
}
