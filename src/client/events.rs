//! Events delivered to the client front end
//!
//! The client session's reader task turns inbound frames into
//! [`ClientEvent`]s. The `Display` impl renders each event as the line a
//! terminal user should see.

use crate::protocol::ErrorCode;
use std::fmt;
use std::path::PathBuf;

/// Something that happened on the client's connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A chat message from another user
    Message {
        /// Originating user, if the server named one
        sender: Option<String>,
        /// Message text
        content: String,
    },

    /// A server notice such as a join or departure
    Announcement {
        /// Notice text
        text: String,
    },

    /// The server's shared file listing
    FileList {
        /// Available file names
        files: Vec<String>,
    },

    /// The requested username is taken; the next input line is used as
    /// the replacement
    DuplicateUsername {
        /// The name that was refused
        attempted: String,
        /// Users currently connected
        connected: Vec<String>,
    },

    /// A download finished and was flushed to disk
    FileSaved {
        /// Where the file was written
        path: PathBuf,
        /// File size in bytes
        bytes: u64,
    },

    /// A download could not be saved
    DownloadFailed {
        /// File the server sent
        filename: String,
        /// What went wrong
        reason: String,
    },

    /// The server refused a request
    ServerError {
        /// Machine-readable reason
        code: ErrorCode,
        /// Human-readable reason
        reason: String,
    },

    /// The connection ended; no further events follow
    Disconnected {
        /// Why, if it was not a clean close
        reason: Option<String>,
    },
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message {
                sender: Some(sender),
                content,
            } => write!(f, "{}: {}", sender, content),
            Self::Message {
                sender: None,
                content,
            } => write!(f, "{}", content),
            Self::Announcement { text } => write!(f, "*** {} ***", text),
            Self::FileList { files } if files.is_empty() => {
                write!(f, "No files available on the server")
            },
            Self::FileList { files } => {
                write!(f, "Available files:")?;
                for file in files {
                    write!(f, "\n|-- {}", file)?;
                }
                Ok(())
            },
            Self::DuplicateUsername {
                attempted,
                connected,
            } => write!(
                f,
                "Username '{}' is already taken. Connected users: {}\nEnter a new username:",
                attempted,
                connected.join(", ")
            ),
            Self::FileSaved { path, bytes } => {
                write!(f, "File saved to: {} ({} bytes)", path.display(), bytes)
            },
            Self::DownloadFailed { filename, reason } => {
                write!(f, "Download of {} failed: {}", filename, reason)
            },
            Self::ServerError { code, reason } => write!(f, "Server error ({}): {}", code, reason),
            Self::Disconnected { reason: None } => write!(f, "Disconnected from server"),
            Self::Disconnected {
                reason: Some(reason),
            } => write!(f, "Disconnected from server: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_message() {
        let event = ClientEvent::Message {
            sender: Some("alice".to_string()),
            content: "hello".to_string(),
        };
        assert_eq!(event.to_string(), "alice: hello");
    }

    #[test]
    fn test_render_file_list() {
        let event = ClientEvent::FileList {
            files: vec!["a.txt".to_string(), "b.txt".to_string()],
        };
        assert_eq!(event.to_string(), "Available files:\n|-- a.txt\n|-- b.txt");

        let empty = ClientEvent::FileList { files: Vec::new() };
        assert_eq!(empty.to_string(), "No files available on the server");
    }

    #[test]
    fn test_render_duplicate_username() {
        let event = ClientEvent::DuplicateUsername {
            attempted: "alice".to_string(),
            connected: vec!["alice".to_string(), "bob".to_string()],
        };
        let text = event.to_string();
        assert!(text.contains("'alice' is already taken"));
        assert!(text.contains("alice, bob"));
    }

    #[test]
    fn test_render_server_error() {
        let event = ClientEvent::ServerError {
            code: ErrorCode::FileNotFound,
            reason: "file not found: x".to_string(),
        };
        assert_eq!(event.to_string(), "Server error (file_not_found): file not found: x");
    }
}
