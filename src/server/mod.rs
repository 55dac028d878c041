//! Chat server
//!
//! [`ChatServer`] accepts TCP connections and runs one [`SessionHandler`]
//! task per client. All sessions share one [`ServerState`], which owns the
//! username registry, the router, and the shared file store.
//!
//! # Example
//!
//! ```no_run
//! use chatrelay::config::ServerConfig;
//! use chatrelay::server::ChatServer;
//!
//! # async fn example() -> chatrelay::Result<()> {
//! let config = ServerConfig::default().with_files_dir("./download");
//! let server = ChatServer::bind(config).await?;
//! println!("listening on {}", server.local_addr()?);
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

mod files;
mod listener;
mod session;

pub use files::{sanitize_filename, FileStore};
pub use listener::ChatServer;
pub use session::{SessionHandler, SessionState};

use crate::config::ServerConfig;
use crate::network::{Connection, ConnectionId, ConnectionOptions};
use crate::protocol::Message;
use crate::routing::{ConnectionRegistry, Router};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::warn;

/// Announcement text when `username` registers
pub fn joined_text(username: &str) -> String {
    format!("{} has joined the chat", username)
}

/// Announcement text when `username` leaves or is evicted
pub fn left_text(username: &str) -> String {
    format!("{} has left the chat", username)
}

/// State shared by every session on one server
#[derive(Debug)]
pub struct ServerState {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    router: Router,
    files: FileStore,
    connections: DashMap<ConnectionId, Arc<Connection>>,
}

impl ServerState {
    /// Create server state for `config`
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Router::new(registry.clone());
        let files = FileStore::new(config.files_dir.clone());

        Self {
            config,
            registry,
            router,
            files,
            connections: DashMap::new(),
        }
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Username registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Frame router
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Shared file store
    pub fn files(&self) -> &FileStore {
        &self.files
    }

    /// Send options for new connections
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            queue_capacity: self.config.outbound_queue_capacity,
            chunk_size: self.config.chunk_size,
        }
    }

    /// Number of open connections, registered or not
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Open connection by id
    pub fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    /// Broadcast a server announcement, evicting anyone who cannot take it
    pub fn announce(&self, text: &str, exclude: &[&str]) {
        let frame = Message::Announcement {
            text: text.to_string(),
        }
        .into_frame();

        match self.router.broadcast(&frame, None, exclude) {
            Ok(report) => self.evict(report.failed),
            Err(e) => warn!(error = %e, "Failed to encode announcement"),
        }
    }

    /// Disconnect users whose connections refused a frame
    ///
    /// Each evicted user is announced as having left; anyone who cannot take
    /// that announcement is evicted in turn.
    pub fn evict(&self, failed: Vec<(String, Arc<Connection>)>) {
        let mut pending = failed;

        while let Some((username, conn)) = pending.pop() {
            if !self.registry.remove_connection(&username, conn.id()) {
                continue;
            }
            conn.close();
            warn!(username = %username, peer = %conn.peer_addr(), "Evicted unresponsive client");

            let frame = Message::Announcement {
                text: left_text(&username),
            }
            .into_frame();
            match self.router.broadcast(&frame, None, &[]) {
                Ok(report) => pending.extend(report.failed),
                Err(e) => warn!(error = %e, "Failed to encode announcement"),
            }
        }
    }

    /// Close every open connection
    pub fn close_all(&self) {
        for entry in self.connections.iter() {
            entry.value().close();
        }
    }

    fn track(&self, conn: Arc<Connection>) {
        self.connections.insert(conn.id(), conn);
    }

    fn untrack(&self, id: ConnectionId) {
        self.connections.remove(&id);
    }
}
