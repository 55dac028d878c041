//! TCP accept loop

use crate::config::ServerConfig;
use crate::error::{NetworkError, Result};
use crate::network::{Connection, FrameReader};
use crate::server::{ServerState, SessionHandler};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Pause after a failed accept, e.g. when out of file descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A bound chat server
pub struct ChatServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl ChatServer {
    /// Validate `config` and bind its listen address
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let address = config.listen_addr;
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| NetworkError::ConnectionFailed {
                address: address.to_string(),
                reason: format!("Failed to bind listener: {}", e),
            })?;

        info!(
            addr = %address,
            files = %config.files_dir.display(),
            chunk_size = config.chunk_size,
            "Server started"
        );

        Ok(Self {
            listener,
            state: Arc::new(ServerState::new(config)),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr().map_err(NetworkError::Io)?)
    }

    /// Shared server state
    pub fn state(&self) -> Arc<ServerState> {
        self.state.clone()
    }

    /// Accept clients forever
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accept clients until `shutdown` completes, then close every connection
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(addr = %self.local_addr()?, "Server listening");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Server closing");
                    break;
                },
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => self.spawn_session(stream, peer_addr),
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    },
                },
            }
        }

        self.state.close_all();
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream, peer_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer_addr, error = %e, "Failed to set TCP_NODELAY");
        }

        let config = self.state.config();
        let (read_half, write_half) = stream.into_split();
        let conn = Connection::new(write_half, peer_addr, self.state.connection_options());
        let reader = FrameReader::new(read_half)
            .with_chunk_size(config.chunk_size)
            .with_max_payload(config.max_payload_size);

        let handler = SessionHandler::new(self.state.clone(), conn);
        tokio::spawn(handler.run(reader));
    }
}
