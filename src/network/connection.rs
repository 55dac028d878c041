//! Live peer connections
//!
//! Every accepted socket is split in two: the session handler owns the read
//! half, and a dedicated writer task owns the write half. Everything sent to
//! the peer goes through the connection's bounded outbound queue, so a slow
//! or dead peer only ever stalls its own writer task.

use crate::error::{NetworkError, TransferError};
use crate::network::transfer::{copy_exact, DEFAULT_CHUNK_SIZE};
use crate::protocol::{Frame, Header, Message};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default depth of a connection's outbound queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tuning for a connection's send path
#[derive(Debug, Clone, Copy)]
pub struct ConnectionOptions {
    /// Outbound queue depth; a full queue is a send failure
    pub queue_capacity: usize,
    /// Chunk size used when streaming files
    pub chunk_size: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Work item for a connection's writer task
enum Outbound {
    /// A fully encoded frame
    Frame(Bytes),
    /// A DOWNLOAD header followed by `size` bytes streamed from `file`
    File {
        header: Bytes,
        file: File,
        size: u64,
    },
    /// Stop writing and shut the socket down
    Close,
}

/// A live connection to one chat client
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    username: RwLock<Option<String>>,
    outbound: mpsc::Sender<Outbound>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
    bytes_sent: Arc<AtomicU64>,
    created_at: Instant,
}

impl Connection {
    /// Take ownership of a write half and start its writer task
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<W>(writer: W, peer_addr: SocketAddr, options: ConnectionOptions) -> Arc<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let bytes_sent = Arc::new(AtomicU64::new(0));
        let id = ConnectionId::next();

        let task = tokio::spawn(run_writer(
            writer,
            rx,
            id,
            peer_addr,
            options.chunk_size.max(1),
            bytes_sent.clone(),
        ));

        Arc::new(Self {
            id,
            peer_addr,
            username: RwLock::new(None),
            outbound: tx,
            writer_task: Mutex::new(Some(task)),
            bytes_sent,
            created_at: Instant::now(),
        })
    }

    /// Connection identifier
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Registered username, if any
    pub fn username(&self) -> Option<String> {
        self.username.read().clone()
    }

    /// Record the username this connection registered under
    pub fn set_username(&self, username: Option<String>) {
        *self.username.write() = username;
    }

    /// Queue an already-encoded frame without waiting
    ///
    /// # Errors
    ///
    /// `SendQueueFull` if the peer is not keeping up, `ConnectionClosed` if
    /// the writer task has stopped.
    pub fn send_encoded(&self, encoded: Bytes) -> Result<(), NetworkError> {
        self.outbound
            .try_send(Outbound::Frame(encoded))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => NetworkError::SendQueueFull {
                    peer: self.label(),
                },
                mpsc::error::TrySendError::Closed(_) => NetworkError::ConnectionClosed {
                    peer: self.label(),
                },
            })
    }

    /// Encode and queue a frame
    pub fn send_frame(&self, frame: &Frame) -> crate::Result<()> {
        let encoded = frame.encode()?;
        self.send_encoded(encoded)?;
        Ok(())
    }

    /// Encode and queue a message
    pub fn send_message(&self, message: Message) -> crate::Result<()> {
        self.send_frame(&message.into_frame())
    }

    /// Queue a DOWNLOAD header and file body
    ///
    /// The header must already carry the file's final size. Waits for queue
    /// space rather than failing, since the requester is the one waiting.
    pub async fn send_file(&self, header: &Header, file: File) -> crate::Result<()> {
        let encoded = Bytes::copy_from_slice(&header.encode()?);
        self.outbound
            .send(Outbound::File {
                header: encoded,
                file,
                size: header.payload_size,
            })
            .await
            .map_err(|_| NetworkError::ConnectionClosed { peer: self.label() })?;
        Ok(())
    }

    /// Ask the writer task to flush what is queued and shut down
    ///
    /// If the queue is full the writer task is aborted instead.
    pub fn close(&self) {
        if self.outbound.try_send(Outbound::Close).is_err() {
            if let Some(task) = self.writer_task.lock().take() {
                task.abort();
            }
        }
    }

    /// Whether the writer task has stopped
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Wait until the writer task has stopped
    pub async fn closed(&self) {
        self.outbound.closed().await
    }

    /// Total bytes written to the peer
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Connection age
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    fn label(&self) -> String {
        match self.username() {
            Some(name) => format!("{} ({})", name, self.peer_addr),
            None => self.peer_addr.to_string(),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("username", &self.username())
            .finish()
    }
}

async fn run_writer<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<Outbound>,
    id: ConnectionId,
    peer_addr: SocketAddr,
    chunk_size: usize,
    bytes_sent: Arc<AtomicU64>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(item) = rx.recv().await {
        let result = match item {
            Outbound::Frame(bytes) => write_frame(&mut writer, &bytes).await,
            Outbound::File {
                header,
                mut file,
                size,
            } => write_file(&mut writer, &header, &mut file, size, chunk_size).await,
            Outbound::Close => break,
        };

        match result {
            Ok(written) => {
                bytes_sent.fetch_add(written, Ordering::Relaxed);
            },
            Err(e) => {
                warn!(connection = %id, peer = %peer_addr, error = %e, "Write failed, closing connection");
                break;
            },
        }
    }

    rx.close();
    let _ = writer.shutdown().await;
    debug!(connection = %id, peer = %peer_addr, "Writer task stopped");
}

async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> Result<u64, TransferError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(bytes.len() as u64)
}

async fn write_file<W>(
    writer: &mut W,
    header: &[u8],
    file: &mut File,
    size: u64,
    chunk_size: usize,
) -> Result<u64, TransferError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(header).await?;
    let body = copy_exact(file, writer, size, chunk_size).await?;
    writer.flush().await?;
    Ok(header.len() as u64 + body)
}
