//! Input line parsing
//!
//! Lines starting with `/` are commands; anything else is broadcast to the
//! room as typed (trailing whitespace removed).

use crate::error::CommandError;
use crate::protocol::Message;

/// Usage for `/msg`
pub const MSG_USAGE: &str = "/msg <username> <message>";
/// Usage for `/download`
pub const DOWNLOAD_USAGE: &str = "/download <filename>";
/// Usage for `/list_files`
pub const LIST_FILES_USAGE: &str = "/list_files";
/// Usage for `/disconnect`
pub const DISCONNECT_USAGE: &str = "/disconnect";

/// Help text listing every command
pub const HELP: &str = "\
Commands:
  /msg <username> <message>   send a direct message
  /list_files                 list files available on the server
  /download <filename>        download a file from the server
  /disconnect                 leave the chat
  /help                       show this help
Anything else is sent to everyone.";

/// A parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Leave the chat
    Disconnect,
    /// Show the command list
    Help,
    /// Send `text` to `recipient` only
    DirectMessage {
        /// Target username
        recipient: String,
        /// Message text
        text: String,
    },
    /// Ask for the server's file list
    ListFiles,
    /// Download a file from the server
    Download {
        /// File to fetch
        filename: String,
    },
    /// Send `text` to everyone
    Broadcast {
        /// Message text
        text: String,
    },
}

impl Command {
    /// Parse one input line typed by `own_username`
    ///
    /// # Errors
    ///
    /// - `Empty` for blank lines
    /// - `Usage` when a known command has the wrong arguments
    /// - `UnknownCommand` for any other `/word`
    /// - `SelfMessage` for `/msg` to `own_username`
    pub fn parse(line: &str, own_username: &str) -> Result<Self, CommandError> {
        let line = line.trim_end();
        let trimmed = line.trim_start();

        if trimmed.is_empty() {
            return Err(CommandError::Empty);
        }
        if !trimmed.starts_with('/') {
            return Ok(Self::Broadcast {
                text: line.to_string(),
            });
        }

        let (word, rest) = split_word(trimmed);
        match word {
            "/disconnect" if rest.is_empty() => Ok(Self::Disconnect),
            "/disconnect" => Err(CommandError::Usage {
                usage: DISCONNECT_USAGE,
            }),
            "/help" => Ok(Self::Help),
            "/list_files" if rest.is_empty() => Ok(Self::ListFiles),
            "/list_files" => Err(CommandError::Usage {
                usage: LIST_FILES_USAGE,
            }),
            "/download" => match split_word(rest) {
                (filename, "") if !filename.is_empty() => Ok(Self::Download {
                    filename: filename.to_string(),
                }),
                _ => Err(CommandError::Usage {
                    usage: DOWNLOAD_USAGE,
                }),
            },
            "/msg" => {
                let (recipient, text) = split_word(rest);
                if recipient.is_empty() || text.is_empty() {
                    return Err(CommandError::Usage { usage: MSG_USAGE });
                }
                if recipient == own_username {
                    return Err(CommandError::SelfMessage);
                }
                Ok(Self::DirectMessage {
                    recipient: recipient.to_string(),
                    text: text.to_string(),
                })
            },
            other => Err(CommandError::UnknownCommand {
                name: other.to_string(),
            }),
        }
    }

    /// The frame this command sends, if any
    pub fn into_message(self) -> Option<Message> {
        match self {
            Self::Disconnect | Self::Help => None,
            Self::DirectMessage { recipient, text } => Some(Message::OutMessage {
                content: text,
                recipient: Some(recipient),
            }),
            Self::ListFiles => Some(Message::FileListRequest),
            Self::Download { filename } => Some(Message::DownloadRequest { filename }),
            Self::Broadcast { text } => Some(Message::OutMessage {
                content: text,
                recipient: None,
            }),
        }
    }
}

/// Split off the first whitespace-delimited word
fn split_word(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}
