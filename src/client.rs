//! WebSocket client for joining a collaboration session.
//!
//! Manages one connection to the gateway, decodes inbound frames into
//! [`CollabEvent`]s for the embedding editor, and serializes local edits
//! and cursor movement back onto the wire. There is no auto-reconnect:
//! when the connection drops, presence and code updates stop until the
//! application connects again.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{
    ClientMessage, CollaboratorMap, CursorPos, ProtocolError, SelectionRange, ServerMessage,
};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted to the embedding editor.
#[derive(Debug, Clone)]
pub enum CollabEvent {
    /// Connection established.
    Connected,
    /// Connection lost; no further events until a new connect.
    Disconnected,
    /// Authoritative document text (initial send or a remote replace).
    Code(String),
    /// Full presence snapshot for the session.
    Collaborators(CollaboratorMap),
}

/// One participant's connection to the collaboration server.
pub struct CollabClient {
    server_url: String,
    session_id: String,
    name: String,
    state: Arc<RwLock<ConnectionState>>,
    outgoing_tx: Option<mpsc::Sender<String>>,
    event_tx: mpsc::Sender<CollabEvent>,
    event_rx: Option<mpsc::Receiver<CollabEvent>>,
}

impl CollabClient {
    /// Create a client for `session_id`, labeled with `name`.
    pub fn new(
        server_url: impl Into<String>,
        session_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            server_url: server_url.into(),
            session_id: session_id.into(),
            name: name.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<CollabEvent>> {
        self.event_rx.take()
    }

    // Session id and name are user input; percent-encode so names with
    // spaces, '&' or non-ASCII survive the URI parse and the wire.
    fn connect_url(&self) -> String {
        format!(
            "{}/ws/{}?name={}",
            self.server_url,
            urlencoding::encode(&self.session_id),
            urlencoding::encode(&self.name)
        )
    }

    /// Connect to the server and spawn the reader/writer tasks.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let url = self.connect_url();
        let (ws_stream, _) = match tokio_tungstenite::connect_async(&url).await {
            Ok(ok) => ok,
            Err(e) => {
                log::debug!("connect to {url} failed: {e}");
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::ConnectionClosed);
            }
        };

        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward the outgoing channel to the socket.
        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if ws_writer.send(Message::Text(frame.into())).await.is_err() {
                    return;
                }
            }
            // Outgoing channel dropped: close the socket cleanly so the
            // server detaches us promptly.
            let _ = ws_writer.send(Message::Close(None)).await;
        });

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(CollabEvent::Connected).await;

        // Reader task: decode inbound frames into events.
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(inbound) = ws_reader.next().await {
                match inbound {
                    Ok(Message::Text(frame)) => match ServerMessage::decode(frame.as_str()) {
                        Ok(ServerMessage::Code { code }) => {
                            let _ = event_tx.send(CollabEvent::Code(code)).await;
                        }
                        Ok(ServerMessage::Collaborators { collaborators }) => {
                            let _ = event_tx.send(CollabEvent::Collaborators(collaborators)).await;
                        }
                        Err(e) => {
                            log::warn!("ignoring malformed server frame: {e}");
                        }
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(CollabEvent::Disconnected).await;
        });

        Ok(())
    }

    /// Send a full-text replacement of the document.
    pub async fn send_code(&self, code: impl Into<String>) -> Result<(), ProtocolError> {
        self.send(&ClientMessage::Code { code: code.into() }).await
    }

    /// Send a cursor/selection update. Absent fields leave the server-side
    /// presence untouched.
    pub async fn send_cursor_update(
        &self,
        cursor: Option<CursorPos>,
        selection: Option<SelectionRange>,
    ) -> Result<(), ProtocolError> {
        self.send(&ClientMessage::CursorUpdate { cursor, selection })
            .await
    }

    async fn send(&self, message: &ClientMessage) -> Result<(), ProtocolError> {
        if *self.state.read().await != ConnectionState::Connected {
            return Err(ProtocolError::ConnectionClosed);
        }
        let frame = message.encode()?;
        match &self.outgoing_tx {
            Some(tx) => tx
                .send(frame)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Close the connection. The reader task emits
    /// [`CollabEvent::Disconnected`] once the close completes. There is
    /// no automatic reconnect; call [`CollabClient::connect`] again to
    /// rejoin.
    pub fn disconnect(&mut self) {
        self.outgoing_tx = None;
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}
