//! WebSocket connection gateway.
//!
//! Accepts sockets at `ws://{addr}/ws/{session_id}?name={display_name}`,
//! attaches each connection to its session, and drives one read/write
//! loop per connection:
//!
//! - inbound text frames deserialize to [`ClientMessage`] and are handed
//!   to the session hub; malformed frames are logged and dropped with the
//!   connection left open,
//! - outbound frames come from the session's broadcast channel and are
//!   filtered by scope before the socket write,
//! - on close or error the participant is detached exactly once, and a
//!   session that empties is saved best-effort and disposed.
//!
//! A failure on one connection never touches any other connection: each
//! socket lives on its own task and failures stop at the detach.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use thiserror::Error;
use uuid::Uuid;

use crate::hub::{Outbound, Session, SessionRegistry};
use crate::protocol::{ClientMessage, ParticipantId, ProtocolError, ServerMessage};
use crate::store::SessionStore;

/// Display name used when the connect URL carries none.
pub const ANONYMOUS_NAME: &str = "Collaborator";

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: String,
    /// Broadcast channel capacity per session.
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            broadcast_capacity: 256,
        }
    }
}

/// Gateway statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub active_sessions: usize,
}

/// Gateway errors. These are per-connection or bind-time failures; none of
/// them is fatal to other connections or sessions.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Identity a connection presents at handshake time.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ConnectRequest {
    session_id: String,
    name: String,
}

/// Parse `/ws/{session_id}?name={name}` into a connect request.
///
/// Returns `None` for any other path, which rejects the handshake.
/// Both values arrive percent-encoded and are decoded here; a name that
/// does not decode to valid UTF-8 falls back to the anonymous label.
fn parse_connect(path: &str, query: Option<&str>) -> Option<ConnectRequest> {
    let raw_id = path.strip_prefix("/ws/")?;
    if raw_id.is_empty() || raw_id.contains('/') {
        return None;
    }
    let session_id = urlencoding::decode(raw_id).ok()?;

    let name = query
        .and_then(|q| {
            q.split('&')
                .find_map(|pair| pair.strip_prefix("name="))
                .filter(|v| !v.is_empty())
        })
        .and_then(|v| urlencoding::decode(v).ok())
        .map(|v| v.into_owned())
        .unwrap_or_else(|| ANONYMOUS_NAME.to_string());

    Some(ConnectRequest {
        session_id: session_id.into_owned(),
        name,
    })
}

/// The collaboration gateway server.
pub struct CollabServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    store: Arc<dyn SessionStore>,
    stats: Arc<RwLock<ServerStats>>,
}

impl CollabServer {
    /// Create a gateway backed by the given session store.
    pub fn new(config: ServerConfig, store: Arc<dyn SessionStore>) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.broadcast_capacity));
        Self {
            config,
            registry,
            store,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Start accepting WebSocket connections. Runs the accept loop forever.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("collab server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("new TCP connection from {addr}");

            let registry = self.registry.clone();
            let store = self.store.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, registry, store, stats).await
                {
                    log::debug!("connection from {addr} ended with error: {e}");
                }
            });
        }
    }

    /// Handle one WebSocket connection from handshake to detach.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        registry: Arc<SessionRegistry>,
        store: Arc<dyn SessionStore>,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), GatewayError> {
        let mut connect: Option<ConnectRequest> = None;
        let ws_stream = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request, resp: Response| match parse_connect(req.uri().path(), req.uri().query())
            {
                Some(c) => {
                    connect = Some(c);
                    Ok(resp)
                }
                None => {
                    let mut err = ErrorResponse::new(None);
                    *err.status_mut() = StatusCode::NOT_FOUND;
                    Err(err)
                }
            },
        )
        .await?;

        let connect = match connect {
            Some(c) => c,
            // Unreachable: a rejected handshake errors out above.
            None => return Ok(()),
        };

        log::info!(
            "websocket established from {addr} for session {} as {}",
            connect.session_id,
            connect.name
        );

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        // Seed a fresh session from the store, best-effort. The store is
        // only consulted here; once the session is live it is authoritative.
        let seed = match store.get(&connect.session_id).await {
            Ok(Some(stored)) => stored.code,
            Ok(None) => String::new(),
            Err(e) => {
                log::warn!("store lookup failed for session {}: {e}", connect.session_id);
                String::new()
            }
        };

        let participant: ParticipantId = Uuid::new_v4();
        // A concurrent teardown can dispose the session between our
        // get_or_create and attach; attach refuses the orphan and we
        // resolve a fresh handle, so one id never splits across two
        // live sessions.
        let (session, initial_code, rx) = loop {
            let session = registry
                .get_or_create(&connect.session_id, seed.clone())
                .await;
            if let Some((code, rx)) = session.attach(participant, &connect.name).await {
                break (session, code, rx);
            }
        };

        {
            let mut s = stats.write().await;
            s.active_sessions = registry.session_count().await;
        }

        let result =
            Self::serve_participant(ws_stream, &session, participant, &connect, initial_code, rx, &stats)
                .await;

        // Detach exactly once, whether we got here via a clean close, a
        // read error, or a failed send.
        let outcome = session.detach(participant).await;
        if let Some(code) = outcome.final_code {
            if let Err(e) = store.save(&connect.session_id, &code).await {
                log::warn!(
                    "best-effort save failed for session {}: {e}",
                    connect.session_id
                );
            }
            registry.dispose_if_empty(&connect.session_id).await;
        }

        {
            let mut s = stats.write().await;
            s.active_connections -= 1;
            s.active_sessions = registry.session_count().await;
        }

        result
    }

    /// Drive one participant's read/write loop until the socket closes.
    async fn serve_participant(
        ws_stream: WebSocketStream<TcpStream>,
        session: &Session,
        participant: ParticipantId,
        connect: &ConnectRequest,
        initial_code: String,
        mut rx: broadcast::Receiver<Outbound>,
        stats: &RwLock<ServerStats>,
    ) -> Result<(), GatewayError> {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        // The joiner must see the current text before any broadcast
        // triggered by its own join.
        let initial = ServerMessage::Code { code: initial_code }.encode()?;
        ws_sender.send(Message::Text(initial.into())).await?;

        loop {
            tokio::select! {
                inbound = ws_receiver.next() => {
                    match inbound {
                        Some(Ok(Message::Text(frame))) => {
                            {
                                let mut s = stats.write().await;
                                s.total_messages += 1;
                            }
                            match ClientMessage::decode(frame.as_str()) {
                                Ok(ClientMessage::Code { code }) => {
                                    session.replace_code(participant, code).await;
                                }
                                Ok(ClientMessage::CursorUpdate { cursor, selection }) => {
                                    session
                                        .update_cursor(participant, &connect.name, cursor, selection)
                                        .await;
                                }
                                Err(e) => {
                                    // Drop the frame, keep the connection.
                                    log::warn!(
                                        "dropping malformed frame from {participant}: {e}"
                                    );
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            log::debug!("connection closed for participant {participant}");
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            log::debug!("read error for participant {participant}: {e}");
                            return Ok(());
                        }
                        Some(Ok(_)) => {
                            // Binary and pong frames carry nothing for us.
                        }
                    }
                }

                outbound = rx.recv() => {
                    match outbound {
                        Ok(out) => {
                            if !out.addressed_to(participant) {
                                continue;
                            }
                            ws_sender.send(Message::Text(out.frame.as_str().into())).await?;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            // The dropped frames are unrecoverable; push the
                            // current state so the connection catches up.
                            log::warn!(
                                "participant {participant} lagged by {n} broadcasts, resyncing"
                            );
                            for frame in Self::resync_frames(session).await? {
                                ws_sender.send(Message::Text(frame.into())).await?;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Frames that bring a connection back in step after it fell behind
    /// the broadcast channel: the current document text, then the current
    /// presence snapshot.
    async fn resync_frames(session: &Session) -> Result<Vec<String>, ProtocolError> {
        let (code, _) = session.document().await;
        let collaborators = session.snapshot().await;
        Ok(vec![
            ServerMessage::Code { code }.encode()?,
            ServerMessage::Collaborators { collaborators }.encode()?,
        ])
    }

    /// Current gateway statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// The session registry this gateway routes into.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}
