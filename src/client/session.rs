//! Client side of a chat connection

use crate::client::{ClientEvent, Command};
use crate::config::ClientConfig;
use crate::error::{NetworkError, RelayError, Result};
use crate::network::{ChunkStream, FrameReader, Incoming};
use crate::protocol::{validate_username, ErrorCode, Message};
use crate::server::sanitize_filename;
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type SharedWriter = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

/// What [`ClientSession::submit_line`] did with a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// A frame was written to the server
    Sent,
    /// A rename is pending or unconfirmed; the frame is queued and sent once
    /// the server has accepted the new username
    Deferred,
    /// The line was used as a new username
    Renamed(String),
    /// The user asked for the command list
    Help,
    /// The session was closed
    Disconnect,
}

/// State shared with the reader task
#[derive(Debug)]
struct Shared {
    username: RwLock<String>,
    pending_rename: AtomicBool,
    /// A retry USERNAME was followed by a FILE_LIST_REQUEST; its answer says
    /// whether the name was accepted
    confirming: AtomicBool,
    /// The confirmation request was refused with `not_registered`, and that
    /// error should not reach the user
    swallow_refusal: AtomicBool,
    deferred: Mutex<Vec<Message>>,
}

impl Shared {
    fn is_holding(&self) -> bool {
        self.pending_rename.load(Ordering::SeqCst) || self.confirming.load(Ordering::SeqCst)
    }
}

/// A connected chat client
///
/// Inbound frames are handled by a background task and surface as
/// [`ClientEvent`]s on the receiver returned by [`ClientSession::connect`].
/// Downloads are written straight to disk as their chunks arrive.
pub struct ClientSession {
    config: ClientConfig,
    shared: Arc<Shared>,
    writer: SharedWriter,
    reader_task: JoinHandle<()>,
}

impl ClientSession {
    /// Connect to the server and request `config.username`
    pub async fn connect(config: ClientConfig) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>)> {
        config.validate()?;

        let stream = TcpStream::connect(&config.server_addr)
            .await
            .map_err(|e| NetworkError::ConnectionFailed {
                address: config.server_addr.clone(),
                reason: e.to_string(),
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        let (read_half, write_half) = stream.into_split();
        let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(write_half));
        let shared = Arc::new(Shared {
            username: RwLock::new(config.username.clone()),
            pending_rename: AtomicBool::new(false),
            confirming: AtomicBool::new(false),
            swallow_refusal: AtomicBool::new(false),
            deferred: Mutex::new(Vec::new()),
        });

        write_message(
            &mut *writer.lock().await,
            Message::Username {
                username: config.username.clone(),
            },
        )
        .await?;
        info!(server = %config.server_addr, username = %config.username, "Connected");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let reader = FrameReader::new(read_half)
            .with_chunk_size(config.chunk_size)
            .with_max_payload(config.max_payload_size);
        let reader_task = tokio::spawn(read_loop(
            reader,
            config.clone(),
            shared.clone(),
            writer.clone(),
            events_tx,
        ));

        Ok((
            Self {
                config,
                shared,
                writer,
                reader_task,
            },
            events_rx,
        ))
    }

    /// The username this session last requested
    pub fn username(&self) -> String {
        self.shared.username.read().clone()
    }

    /// Whether the server refused the username and a new one is awaited
    pub fn is_pending_rename(&self) -> bool {
        self.shared.pending_rename.load(Ordering::SeqCst)
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Handle one line of user input
    ///
    /// While a rename is pending the line is taken as the new username,
    /// except for `/disconnect` and `/help`. Otherwise it is parsed as a
    /// [`Command`].
    pub async fn submit_line(&self, line: &str) -> Result<LineOutcome> {
        if self.is_pending_rename() {
            match Command::parse(line, &self.username()) {
                Ok(command @ (Command::Disconnect | Command::Help)) => {
                    return self.send_command(command).await
                },
                _ => {
                    let username = line.trim().to_string();
                    self.rename(&username).await?;
                    return Ok(LineOutcome::Renamed(username));
                },
            }
        }

        let command = Command::parse(line, &self.username())?;
        self.send_command(command).await
    }

    /// Send a parsed command
    pub async fn send_command(&self, command: Command) -> Result<LineOutcome> {
        match command {
            Command::Disconnect => {
                self.disconnect().await?;
                return Ok(LineOutcome::Disconnect);
            },
            Command::Help => return Ok(LineOutcome::Help),
            _ => {},
        }

        let Some(message) = command.into_message() else {
            return Ok(LineOutcome::Sent);
        };

        let mut writer = self.writer.lock().await;
        if self.shared.is_holding() {
            self.shared.deferred.lock().push(message);
            return Ok(LineOutcome::Deferred);
        }
        write_message(&mut *writer, message).await?;
        Ok(LineOutcome::Sent)
    }

    /// Request a new username
    ///
    /// A FILE_LIST_REQUEST follows the USERNAME frame. Its reply tells the
    /// reader task whether the name was taken; commands queued meanwhile are
    /// flushed only once the name is accepted.
    pub async fn rename(&self, username: &str) -> Result<()> {
        validate_username(username)?;

        let mut writer = self.writer.lock().await;
        write_message(
            &mut *writer,
            Message::Username {
                username: username.to_string(),
            },
        )
        .await?;
        write_message(&mut *writer, Message::FileListRequest).await?;
        *self.shared.username.write() = username.to_string();
        self.shared.confirming.store(true, Ordering::SeqCst);
        self.shared.pending_rename.store(false, Ordering::SeqCst);
        info!(username = %username, "Requested new username");
        Ok(())
    }

    /// Close the write side; the reader task ends once the server hangs up
    pub async fn disconnect(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await.map_err(NetworkError::Io)?;
        info!("Disconnected");
        Ok(())
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn write_message<W>(writer: &mut W, message: Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let encoded = message.into_frame().encode()?;
    writer.write_all(&encoded).await.map_err(NetworkError::Io)?;
    writer.flush().await.map_err(NetworkError::Io)?;
    Ok(())
}

async fn read_loop(
    mut reader: FrameReader<OwnedReadHalf>,
    config: ClientConfig,
    shared: Arc<Shared>,
    writer: SharedWriter,
    events: mpsc::UnboundedSender<ClientEvent>,
) {
    let reason = loop {
        match reader.next().await {
            Ok(None) => break None,
            Ok(Some(Incoming::Message(message))) => {
                if let Some(event) = handle_message(message, &shared, &writer).await {
                    let _ = events.send(event);
                }
            },
            Ok(Some(Incoming::Download {
                filename,
                size,
                mut body,
            })) => {
                let username = shared.username.read().clone();
                let dir = config.download_dir(&username);
                let event = match save_download(&dir, &filename, &mut body).await {
                    Ok(path) => {
                        info!(file = %filename, bytes = size, path = %path.display(), "Download saved");
                        ClientEvent::FileSaved { path, bytes: size }
                    },
                    Err(e) => {
                        warn!(file = %filename, error = %e, "Download failed");
                        ClientEvent::DownloadFailed {
                            filename,
                            reason: e.to_string(),
                        }
                    },
                };
                let _ = events.send(event);

                if let Err(e) = body.drain().await {
                    break Some(e.to_string());
                }
            },
            Err(e) => break Some(e.to_string()),
        }
    };

    debug!(reason = ?reason, "Reader finished");
    let _ = events.send(ClientEvent::Disconnected { reason });
}

async fn handle_message(message: Message, shared: &Shared, writer: &SharedWriter) -> Option<ClientEvent> {
    match message {
        Message::InMessage { content, sender } => Some(ClientEvent::Message { sender, content }),
        Message::Announcement { text } => Some(ClientEvent::Announcement { text }),
        Message::FileList { files } => {
            let mut writer = writer.lock().await;
            if !shared.confirming.swap(false, Ordering::SeqCst) {
                return Some(ClientEvent::FileList { files });
            }

            let deferred = std::mem::take(&mut *shared.deferred.lock());
            debug!(count = deferred.len(), "Username accepted, sending queued commands");
            for message in deferred {
                if let Err(e) = write_message(&mut *writer, message).await {
                    warn!(error = %e, "Failed to send queued command");
                    break;
                }
            }
            None
        },
        Message::DuplicateUsername { connected } => {
            // Hold the writer so no command slips out between the refusal and the flag
            let _writer = writer.lock().await;
            shared.pending_rename.store(true, Ordering::SeqCst);
            if shared.confirming.swap(false, Ordering::SeqCst) {
                shared.swallow_refusal.store(true, Ordering::SeqCst);
            }
            let attempted = shared.username.read().clone();
            warn!(username = %attempted, "Username already taken");
            Some(ClientEvent::DuplicateUsername { attempted, connected })
        },
        Message::Error {
            code: ErrorCode::NotRegistered,
            ..
        } if shared.swallow_refusal.swap(false, Ordering::SeqCst) => None,
        Message::Error { code, reason } => Some(ClientEvent::ServerError { code, reason }),
        other => {
            debug!(frame = %other.frame_type(), "Ignoring client-only frame from server");
            None
        },
    }
}

/// Stream a download body into `dir`, removing the partial file on failure
async fn save_download<R>(dir: &std::path::Path, filename: &str, body: &mut ChunkStream<'_, R>) -> Result<PathBuf>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let name = sanitize_filename(filename)?;
    fs::create_dir_all(dir).await?;
    let path = dir.join(name);

    let mut file = File::create(&path).await?;
    match write_body(&mut file, body).await {
        Ok(()) => Ok(path),
        Err(e) => {
            drop(file);
            if let Err(remove_err) = fs::remove_file(&path).await {
                debug!(path = %path.display(), error = %remove_err, "Failed to remove partial download");
            }
            Err(e)
        },
    }
}

async fn write_body<R>(file: &mut File, body: &mut ChunkStream<'_, R>) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    while let Some(chunk) = body.next_chunk().await {
        file.write_all(&chunk?).await.map_err(RelayError::Io)?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}
