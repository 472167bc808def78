//! Standalone collaboration server.
//!
//! Binds to `TIGERPAD_BIND` (default `127.0.0.1:8000`) and serves
//! WebSocket sessions at `/ws/{session_id}?name={display_name}`, backed
//! by an in-memory session store.

use std::sync::Arc;

use tigerpad::gateway::{CollabServer, ServerConfig};
use tigerpad::store::MemoryStore;

#[tokio::main]
async fn main() {
    env_logger::init();

    let bind_addr =
        std::env::var("TIGERPAD_BIND").unwrap_or_else(|_| "127.0.0.1:8000".to_string());
    let config = ServerConfig {
        bind_addr,
        ..ServerConfig::default()
    };

    let server = CollabServer::new(config, Arc::new(MemoryStore::new()));
    if let Err(e) = server.run().await {
        log::error!("server exited: {e}");
        std::process::exit(1);
    }
}
