//! Common test helpers and utilities
//!
//! Starts a real server on a loopback port with a temporary files
//! directory, and provides a raw frame-level client for driving it.

#![allow(dead_code)]

use chatrelay::config::ServerConfig;
use chatrelay::network::FrameReader;
use chatrelay::protocol::{Frame, Message};
use chatrelay::server::{ChatServer, ServerState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::{timeout, Duration};

/// How long any single expected frame may take to arrive
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait before concluding nothing is coming
pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// A server running on a background task
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
    pub files: TempDir,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Write a file into the server's shared directory
    pub fn write_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.files.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Start a server on `127.0.0.1:0` with an empty files directory
pub async fn start_server() -> TestServer {
    start_server_with(|config| config).await
}

/// Start a server after adjusting its config
pub async fn start_server_with(adjust: impl FnOnce(ServerConfig) -> ServerConfig) -> TestServer {
    let files = TempDir::new().unwrap();
    let config = ServerConfig::default()
        .with_listen_addr("127.0.0.1:0".parse().unwrap())
        .with_files_dir(files.path());
    let server = ChatServer::bind(adjust(config)).await.unwrap();
    let addr = server.local_addr().unwrap();
    let state = server.state();

    let (shutdown, stop) = oneshot::channel();
    tokio::spawn(server.run_until(async move {
        let _ = stop.await;
    }));

    TestServer {
        addr,
        state,
        files,
        shutdown: Some(shutdown),
    }
}

/// A client that speaks frames directly
pub struct RawClient {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl RawClient {
    /// Open a connection without registering
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            reader: FrameReader::new(read_half).with_max_payload(64 * 1024 * 1024),
            writer,
        }
    }

    /// Connect and register `username`, waiting until the server has
    /// processed the registration
    pub async fn register(addr: SocketAddr, username: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client
            .send(Message::Username {
                username: username.to_string(),
            })
            .await;
        client.sync().await;
        client
    }

    /// Round-trip a file list request so every earlier frame has been handled
    pub async fn sync(&mut self) {
        self.send(Message::FileListRequest).await;
        self.recv_matching(|m| matches!(m, Message::FileList { .. }))
            .await;
    }

    /// Send a typed message
    pub async fn send(&mut self, message: Message) {
        let encoded = message.into_frame().encode().unwrap();
        self.send_raw(&encoded).await;
    }

    /// Send raw bytes
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Receive the next frame, payload buffered
    pub async fn recv_frame(&mut self) -> Frame {
        timeout(RECV_TIMEOUT, self.reader.read_frame())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .expect("connection closed while waiting for a frame")
    }

    /// Receive the next frame as a message
    pub async fn recv(&mut self) -> Message {
        let frame = self.recv_frame().await;
        Message::from_frame(&frame).unwrap()
    }

    /// Receive messages until one matches, discarding the rest
    pub async fn recv_matching(&mut self, predicate: impl Fn(&Message) -> bool) -> Message {
        loop {
            let message = self.recv().await;
            if predicate(&message) {
                return message;
            }
        }
    }

    /// Assert that nothing arrives for a short while
    pub async fn assert_quiet(&mut self) {
        if let Ok(result) = timeout(QUIET_PERIOD, self.reader.read_frame()).await {
            panic!("expected no frame, got {:?}", result.map(|f| f.map(|f| f.frame_type)));
        }
    }

    /// Whether the server has closed this connection
    pub async fn is_closed_by_server(&mut self) -> bool {
        matches!(
            timeout(RECV_TIMEOUT, self.reader.read_frame()).await,
            Ok(Ok(None)) | Ok(Err(_))
        )
    }

    /// Close the write side, signalling a clean disconnect
    pub async fn disconnect(mut self) {
        let _ = self.writer.shutdown().await;
    }
}

/// Deterministic test data of `len` bytes
pub fn pattern_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Announcement text helper
pub fn announcement(text: &str) -> Message {
    Message::Announcement {
        text: text.to_string(),
    }
}
