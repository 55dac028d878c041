//! Frame construction and parsing
//!
//! A [`Frame`] is a header plus an in-memory payload. [`Message`] is the
//! typed view of a frame used for dispatch: every frame type except DOWNLOAD
//! (whose body is streamed, never buffered) has a variant.

use crate::error::ProtocolError;
use crate::protocol::{param, FrameType, Header, Params, HEADER_SIZE};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// A complete frame with its payload held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame type
    pub frame_type: FrameType,
    /// Out-of-band params
    pub params: Params,
    payload: Bytes,
}

impl Frame {
    /// Create an empty frame of the given type
    pub fn new(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            params: Params::new(),
            payload: Bytes::new(),
        }
    }

    /// Add a param
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Replace the payload
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Rebuild a frame from a decoded header and the payload read after it
    ///
    /// Fails if the payload length disagrees with the header.
    pub fn from_parts(header: Header, payload: Bytes) -> Result<Self, ProtocolError> {
        if payload.len() as u64 != header.payload_size {
            return Err(ProtocolError::MalformedHeader {
                reason: format!(
                    "header announces {} payload bytes, got {}",
                    header.payload_size,
                    payload.len()
                ),
            });
        }

        Ok(Self {
            frame_type: header.frame_type,
            params: header.params,
            payload,
        })
    }

    /// Payload bytes
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload length, always equal to the length of `payload()`
    pub fn payload_size(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Look up a param value
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Header describing this frame
    pub fn header(&self) -> Header {
        Header {
            frame_type: self.frame_type,
            payload_size: self.payload_size(),
            params: self.params.clone(),
        }
    }

    /// Payload decoded as UTF-8 text
    pub fn text(&self) -> Result<&str, ProtocolError> {
        std::str::from_utf8(&self.payload).map_err(|_| ProtocolError::InvalidUtf8)
    }

    /// Encode header and payload into one contiguous buffer
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let header = crate::protocol::encode_header(
            self.frame_type,
            self.payload_size(),
            &self.params,
        )?;

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_slice(&header);
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }
}

/// Machine-readable reason carried by an ERROR frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    /// A request other than USERNAME arrived before registration
    NotRegistered,
    /// USERNAME arrived after the session was already registered
    AlreadyRegistered,
    /// The requested username cannot be registered
    InvalidUsername,
    /// Direct message target is not connected
    RecipientNotFound,
    /// Direct message target is the sender
    InvalidRecipient,
    /// Requested download does not exist
    FileNotFound,
    /// Requested download name is not a plain filename
    InvalidFilename,
    /// Requested download exists but could not be read
    FileUnavailable,
    /// A code this build does not know
    Other(String),
}

impl ErrorCode {
    /// Wire representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::NotRegistered => "not_registered",
            Self::AlreadyRegistered => "already_registered",
            Self::InvalidUsername => "invalid_username",
            Self::RecipientNotFound => "recipient_not_found",
            Self::InvalidRecipient => "invalid_recipient",
            Self::FileNotFound => "file_not_found",
            Self::InvalidFilename => "invalid_filename",
            Self::FileUnavailable => "file_unavailable",
            Self::Other(code) => code.as_str(),
        }
    }

    /// Parse a wire code; unknown codes are preserved as `Other`
    pub fn parse(code: &str) -> Self {
        match code {
            "not_registered" => Self::NotRegistered,
            "already_registered" => Self::AlreadyRegistered,
            "invalid_username" => Self::InvalidUsername,
            "recipient_not_found" => Self::RecipientNotFound,
            "invalid_recipient" => Self::InvalidRecipient,
            "file_not_found" => Self::FileNotFound,
            "invalid_filename" => Self::InvalidFilename,
            "file_unavailable" => Self::FileUnavailable,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed protocol messages
///
/// DOWNLOAD has no variant: its payload is a file body that is always
/// streamed through `network::transfer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Register or retry a username
    Username {
        /// Requested name
        username: String,
    },
    /// Chat message from a client
    OutMessage {
        /// Message text
        content: String,
        /// Direct message target, `None` to broadcast
        recipient: Option<String>,
    },
    /// Chat message relayed by the server
    InMessage {
        /// Message text
        content: String,
        /// Originating user
        sender: Option<String>,
    },
    /// Server notice
    Announcement {
        /// Notice text
        text: String,
    },
    /// Ask for the shared file listing
    FileListRequest,
    /// Shared file listing
    FileList {
        /// File names, one per payload line
        files: Vec<String>,
    },
    /// Username rejected; lists who is connected
    DuplicateUsername {
        /// Currently registered usernames
        connected: Vec<String>,
    },
    /// Ask to download a shared file
    DownloadRequest {
        /// Requested file name
        filename: String,
    },
    /// Request could not be satisfied
    Error {
        /// Machine-readable reason
        code: ErrorCode,
        /// Human-readable reason
        reason: String,
    },
}

impl Message {
    /// Frame type this message is carried in
    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Username { .. } => FrameType::Username,
            Self::OutMessage { .. } => FrameType::OutMessage,
            Self::InMessage { .. } => FrameType::InMessage,
            Self::Announcement { .. } => FrameType::Announcement,
            Self::FileListRequest => FrameType::FileListRequest,
            Self::FileList { .. } => FrameType::FileList,
            Self::DuplicateUsername { .. } => FrameType::DuplicateUsername,
            Self::DownloadRequest { .. } => FrameType::DownloadRequest,
            Self::Error { .. } => FrameType::Error,
        }
    }

    /// Build the frame for this message
    pub fn into_frame(self) -> Frame {
        let frame = Frame::new(self.frame_type());
        match self {
            Self::Username { username } => frame.with_param(param::USERNAME, username),
            Self::OutMessage { content, recipient } => {
                let frame = frame.with_payload(content);
                match recipient {
                    Some(recipient) => frame.with_param(param::RECIPIENT, recipient),
                    None => frame,
                }
            },
            Self::InMessage { content, sender } => {
                let frame = frame.with_payload(content);
                match sender {
                    Some(sender) => frame.with_param(param::SENDER, sender),
                    None => frame,
                }
            },
            Self::Announcement { text } => frame.with_payload(text),
            Self::FileListRequest => frame,
            Self::FileList { files } => frame.with_payload(files.join("\n")),
            Self::DuplicateUsername { connected } => frame.with_payload(connected.join(", ")),
            Self::DownloadRequest { filename } => frame.with_param(param::FILENAME, filename),
            Self::Error { code, reason } => frame
                .with_param(param::CODE, code.as_str())
                .with_payload(reason),
        }
    }

    /// Parse a received frame
    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        let message = match frame.frame_type {
            FrameType::Username => Self::Username {
                username: required(frame, param::USERNAME)?,
            },
            FrameType::OutMessage => Self::OutMessage {
                content: frame.text()?.to_string(),
                recipient: optional(frame, param::RECIPIENT),
            },
            FrameType::InMessage => Self::InMessage {
                content: frame.text()?.to_string(),
                sender: optional(frame, param::SENDER),
            },
            FrameType::Announcement => Self::Announcement {
                text: frame.text()?.to_string(),
            },
            FrameType::FileListRequest => Self::FileListRequest,
            FrameType::FileList => Self::FileList {
                files: frame
                    .text()?
                    .lines()
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect(),
            },
            FrameType::DuplicateUsername => Self::DuplicateUsername {
                connected: frame
                    .text()?
                    .split(", ")
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect(),
            },
            FrameType::DownloadRequest => Self::DownloadRequest {
                filename: required(frame, param::FILENAME)?,
            },
            FrameType::Download => {
                return Err(ProtocolError::MalformedHeader {
                    reason: "DOWNLOAD body must be streamed, not buffered".to_string(),
                })
            },
            FrameType::Error => Self::Error {
                code: ErrorCode::parse(&required(frame, param::CODE)?),
                reason: frame.text()?.to_string(),
            },
        };

        Ok(message)
    }
}

fn required(frame: &Frame, key: &str) -> Result<String, ProtocolError> {
    frame
        .param(key)
        .map(str::to_string)
        .ok_or_else(|| ProtocolError::MissingParam {
            key: key.to_string(),
        })
}

fn optional(frame: &Frame, key: &str) -> Option<String> {
    frame
        .param(key)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_header;

    #[test]
    fn test_encode_attaches_payload_after_header() {
        let frame = Message::OutMessage {
            content: "hello".to_string(),
            recipient: Some("bob".to_string()),
        }
        .into_frame();

        let encoded = frame.encode().unwrap();
        assert_eq!(encoded.len(), HEADER_SIZE + 5);
        assert_eq!(&encoded[HEADER_SIZE..], b"hello");

        let header = decode_header(&encoded[..HEADER_SIZE]).unwrap();
        assert_eq!(header.frame_type, FrameType::OutMessage);
        assert_eq!(header.payload_size, 5);
        assert_eq!(header.param(param::RECIPIENT), Some("bob"));
    }

    #[test]
    fn test_payload_size_tracks_payload() {
        let frame = Frame::new(FrameType::Announcement).with_payload("abc");
        assert_eq!(frame.payload_size(), 3);
        assert_eq!(frame.header().payload_size, 3);

        let frame = frame.with_payload(Bytes::new());
        assert_eq!(frame.payload_size(), 0);
    }

    #[test]
    fn test_from_parts_rejects_length_mismatch() {
        let header = Header::new(FrameType::Announcement, 10);
        let result = Frame::from_parts(header, Bytes::from_static(b"short"));
        assert!(matches!(result, Err(ProtocolError::MalformedHeader { .. })));
    }

    #[test]
    fn test_message_round_trips_through_frame() {
        let messages = vec![
            Message::Username {
                username: "alice".to_string(),
            },
            Message::OutMessage {
                content: "hi all".to_string(),
                recipient: None,
            },
            Message::InMessage {
                content: "hello".to_string(),
                sender: Some("alice".to_string()),
            },
            Message::Announcement {
                text: "bob has joined the chat".to_string(),
            },
            Message::FileListRequest,
            Message::FileList {
                files: vec!["a.txt".to_string(), "b.bin".to_string()],
            },
            Message::DuplicateUsername {
                connected: vec!["alice".to_string(), "bob".to_string()],
            },
            Message::DownloadRequest {
                filename: "a.txt".to_string(),
            },
            Message::Error {
                code: ErrorCode::FileNotFound,
                reason: "no such file".to_string(),
            },
        ];

        for message in messages {
            let frame = message.clone().into_frame();
            assert_eq!(frame.frame_type, message.frame_type());
            assert_eq!(Message::from_frame(&frame).unwrap(), message);
        }
    }

    #[test]
    fn test_empty_file_list() {
        let frame = Message::FileList { files: Vec::new() }.into_frame();
        assert_eq!(frame.payload_size(), 0);
        assert_eq!(
            Message::from_frame(&frame).unwrap(),
            Message::FileList { files: Vec::new() }
        );
    }

    #[test]
    fn test_duplicate_username_payload_format() {
        let frame = Message::DuplicateUsername {
            connected: vec!["alice".to_string(), "bob".to_string()],
        }
        .into_frame();
        assert_eq!(frame.text().unwrap(), "alice, bob");
    }

    #[test]
    fn test_missing_required_param() {
        let frame = Frame::new(FrameType::Username);
        assert_eq!(
            Message::from_frame(&frame),
            Err(ProtocolError::MissingParam {
                key: param::USERNAME.to_string()
            })
        );
    }

    #[test]
    fn test_invalid_utf8_payload() {
        let frame = Frame::new(FrameType::OutMessage).with_payload(vec![0xff, 0xfe]);
        assert_eq!(Message::from_frame(&frame), Err(ProtocolError::InvalidUtf8));
    }

    #[test]
    fn test_download_is_not_a_buffered_message() {
        let frame = Frame::new(FrameType::Download).with_param(param::FILENAME, "a.txt");
        assert!(Message::from_frame(&frame).is_err());
    }

    #[test]
    fn test_error_code_parse() {
        assert_eq!(ErrorCode::parse("not_registered"), ErrorCode::NotRegistered);
        assert_eq!(
            ErrorCode::parse("something_new"),
            ErrorCode::Other("something_new".to_string())
        );
        assert_eq!(ErrorCode::InvalidFilename.to_string(), "invalid_filename");
    }
}
