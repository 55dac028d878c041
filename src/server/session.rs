//! Per-connection session handling
//!
//! A session moves through `Unnamed -> Named -> Closed`. While `Unnamed`
//! only USERNAME frames are served; a taken name is answered with
//! DUPLICATE_USERNAME and the client may retry. Once `Named` the client can
//! chat, list files, and request downloads. Any read or decode failure ends
//! the session.

use crate::error::{RelayError, RoutingError, StorageError};
use crate::network::{Connection, FrameReader, Incoming};
use crate::protocol::{param, validate_username, ErrorCode, FrameType, Header, Message};
use crate::server::{joined_text, left_text, ServerState};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

/// Protocol state of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no username yet
    Unnamed,
    /// Registered under a username
    Named(String),
    /// Finished; terminal
    Closed,
}

/// Serves one client connection
pub struct SessionHandler {
    state: Arc<ServerState>,
    conn: Arc<Connection>,
    session: SessionState,
}

impl SessionHandler {
    /// Create a handler for a freshly accepted connection
    pub fn new(state: Arc<ServerState>, conn: Arc<Connection>) -> Self {
        state.track(conn.clone());
        Self {
            state,
            conn,
            session: SessionState::Unnamed,
        }
    }

    /// Current protocol state
    pub fn session_state(&self) -> &SessionState {
        &self.session
    }

    /// Serve frames from `reader` until the client goes away
    pub async fn run<R>(mut self, mut reader: FrameReader<R>)
    where
        R: AsyncRead + Unpin,
    {
        info!(connection = %self.conn.id(), peer = %self.conn.peer_addr(), "Client connected");

        loop {
            let incoming = tokio::select! {
                biased;
                _ = self.conn.closed() => {
                    debug!(connection = %self.conn.id(), "Writer stopped, ending session");
                    break;
                },
                incoming = reader.next() => incoming,
            };

            match incoming {
                Ok(Some(Incoming::Message(message))) => {
                    if let Err(e) = self.handle(message).await {
                        warn!(connection = %self.conn.id(), error = %e, "Session failed");
                        break;
                    }
                },
                Ok(Some(Incoming::Download {
                    filename, mut body, ..
                })) => {
                    warn!(connection = %self.conn.id(), filename = %filename, "Client sent a DOWNLOAD frame, discarding");
                    if let Err(e) = body.drain().await {
                        debug!(connection = %self.conn.id(), error = %e, "Read failed");
                        break;
                    }
                },
                Ok(None) => {
                    debug!(connection = %self.conn.id(), "Client closed the connection");
                    break;
                },
                Err(e) => {
                    match &e {
                        RelayError::Transfer(_) | RelayError::Network(_) | RelayError::Io(_) => {
                            debug!(connection = %self.conn.id(), error = %e, "Read failed")
                        },
                        _ => {
                            warn!(connection = %self.conn.id(), error = %e, "Protocol violation, closing connection")
                        },
                    }
                    break;
                },
            }
        }

        self.close();
    }

    async fn handle(&mut self, message: Message) -> crate::Result<()> {
        debug!(
            connection = %self.conn.id(),
            frame_type = %message.frame_type(),
            "Frame received"
        );

        let current = match &self.session {
            SessionState::Closed => return Ok(()),
            SessionState::Unnamed => None,
            SessionState::Named(username) => Some(username.clone()),
        };

        match (current, message) {
            (
                _,
                message @ (Message::InMessage { .. }
                | Message::Announcement { .. }
                | Message::FileList { .. }
                | Message::DuplicateUsername { .. }
                | Message::Error { .. }),
            ) => {
                debug!(
                    connection = %self.conn.id(),
                    frame_type = %message.frame_type(),
                    "Ignoring server-only frame"
                );
                Ok(())
            },
            (None, Message::Username { username }) => self.register(username),
            (Some(_), Message::Username { .. }) => {
                self.reply_error(ErrorCode::AlreadyRegistered, "already registered")
            },
            (None, _) => self.reply_error(ErrorCode::NotRegistered, "register a username first"),
            (Some(sender), Message::OutMessage { content, recipient }) => {
                self.relay(&sender, content, recipient)
            },
            (Some(sender), Message::FileListRequest) => self.send_file_list(&sender).await,
            (Some(sender), Message::DownloadRequest { filename }) => {
                self.send_download(&sender, filename).await
            },
        }
    }

    fn register(&mut self, username: String) -> crate::Result<()> {
        if let Err(e) = validate_username(&username) {
            info!(connection = %self.conn.id(), username = %username, "Rejected invalid username");
            return self.reply_error(ErrorCode::InvalidUsername, &e.to_string());
        }

        match self.state.registry().register(&username, self.conn.clone()) {
            Ok(()) => {
                info!(connection = %self.conn.id(), username = %username, "Client registered");
                self.state.announce(&joined_text(&username), &[username.as_str()]);
                self.session = SessionState::Named(username);
                Ok(())
            },
            Err(RoutingError::DuplicateUsername { .. }) => {
                info!(connection = %self.conn.id(), username = %username, "Username already taken");
                self.conn.send_message(Message::DuplicateUsername {
                    connected: self.state.registry().usernames(),
                })
            },
            Err(e) => Err(e.into()),
        }
    }

    fn relay(&self, sender: &str, content: String, recipient: Option<String>) -> crate::Result<()> {
        debug!(sender, recipient = ?recipient, content = %content, "Chat message received");

        let template = Message::InMessage {
            content,
            sender: None,
        }
        .into_frame();

        let Some(recipient) = recipient else {
            let report = self.state.router().broadcast(&template, Some(sender), &[])?;
            self.state.evict(report.failed);
            return Ok(());
        };

        if recipient == sender {
            return self.reply_error(
                ErrorCode::InvalidRecipient,
                "select someone other than yourself to directly message",
            );
        }

        match self.state.router().unicast(&template, &recipient, Some(sender)) {
            Ok(()) => Ok(()),
            Err(RelayError::Routing(RoutingError::RecipientNotFound { .. })) => {
                info!(sender, recipient = %recipient, "Direct message to unknown user");
                self.reply_error(
                    ErrorCode::RecipientNotFound,
                    &format!("{} is not connected", recipient),
                )
            },
            Err(RelayError::Routing(RoutingError::DeliveryFailed { connection, .. })) => {
                // Evict the connection that failed, not whoever holds the name now
                if let Some(conn) = self.state.connection(connection) {
                    self.state.evict(vec![(recipient, conn)]);
                }
                Ok(())
            },
            Err(e) => Err(e),
        }
    }

    async fn send_file_list(&self, requester: &str) -> crate::Result<()> {
        info!(username = %requester, "File list requested");

        match self.state.files().list().await {
            Ok(files) => self.conn.send_message(Message::FileList { files }),
            Err(e) => {
                warn!(root = %self.state.files().root().display(), error = %e, "Failed to list files");
                self.reply_error(ErrorCode::FileUnavailable, "file list unavailable")
            },
        }
    }

    async fn send_download(&self, requester: &str, filename: String) -> crate::Result<()> {
        info!(username = %requester, filename = %filename, "Download requested");

        let (file, size) = match self.state.files().open(&filename).await {
            Ok(opened) => opened,
            Err(StorageError::InvalidFilename { .. }) => {
                warn!(username = %requester, filename = %filename, "Rejected unsafe filename");
                return self.reply_error(ErrorCode::InvalidFilename, "invalid filename");
            },
            Err(StorageError::FileNotFound { .. }) => {
                info!(filename = %filename, "Requested file not found");
                return self.reply_error(
                    ErrorCode::FileNotFound,
                    &format!("file not found: {}", filename),
                );
            },
            Err(e) => {
                warn!(filename = %filename, error = %e, "Failed to open file");
                return self.reply_error(ErrorCode::FileUnavailable, "file could not be read");
            },
        };

        let header = Header::new(FrameType::Download, size).with_param(param::FILENAME, filename.as_str());
        match self.conn.send_file(&header, file).await {
            Ok(()) => {
                debug!(filename = %filename, size, "Download queued");
                Ok(())
            },
            Err(RelayError::Protocol(e)) => {
                warn!(filename = %filename, error = %e, "Filename cannot be sent");
                self.reply_error(ErrorCode::InvalidFilename, "invalid filename")
            },
            Err(e) => Err(e),
        }
    }

    fn reply_error(&self, code: ErrorCode, reason: &str) -> crate::Result<()> {
        self.conn.send_message(Message::Error {
            code,
            reason: reason.to_string(),
        })
    }

    fn close(&mut self) {
        let previous = std::mem::replace(&mut self.session, SessionState::Closed);

        if let SessionState::Named(username) = previous {
            if self.state.registry().remove_connection(&username, self.conn.id()) {
                self.state.announce(&left_text(&username), &[]);
            }
            info!(connection = %self.conn.id(), username = %username, "Client disconnected");
        } else {
            info!(connection = %self.conn.id(), "Unregistered client disconnected");
        }

        self.conn.close();
        self.state.untrack(self.conn.id());
    }
}
