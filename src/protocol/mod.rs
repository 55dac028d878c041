//! Protocol module
//!
//! This module defines the chatrelay wire format. Every frame starts with a
//! fixed-size text header followed by exactly `payload_size` payload bytes.
//!
//! # Header Format
//!
//! ```text
//! +---------------------+
//! | type (2)            |  zero-padded decimal frame type code
//! +---------------------+
//! | payload_size (16)   |  zero-padded decimal byte count
//! +---------------------+
//! | key:value<###>...   |  optional params, UTF-8
//! +---------------------+
//! | padding             |  spaces up to HEADER_SIZE
//! +---------------------+
//! | payload (variable)  |  raw UTF-8 text or raw file bytes
//! +---------------------+
//! ```

mod header;
mod messages;

use std::collections::BTreeMap;
use std::fmt;

pub use header::{decode_header, encode_header, Header};
pub use messages::{ErrorCode, Frame, Message};

use crate::error::ProtocolError;

/// Size of every encoded header in bytes
pub const HEADER_SIZE: usize = 1024;

/// Terminator written after each `key:value` param
pub const DELIMITER: &str = "<###>";

/// Width of the frame type field
pub const TYPE_FIELD_WIDTH: usize = 2;

/// Width of the payload size field
pub const SIZE_FIELD_WIDTH: usize = 16;

/// Largest payload size representable in the 16-digit size field
pub const MAX_PAYLOAD_SIZE: u64 = 9_999_999_999_999_999;

/// Longest accepted username, in characters
pub const MAX_USERNAME_LEN: usize = 32;

/// Header params, ordered by key so encoding is deterministic
pub type Params = BTreeMap<String, String>;

/// Well-known header param keys
pub mod param {
    /// Name being registered (USERNAME)
    pub const USERNAME: &str = "username";
    /// Target of a direct message (OUT_MESSAGE)
    pub const RECIPIENT: &str = "recipient";
    /// Originating user of a relayed message (IN_MESSAGE)
    pub const SENDER: &str = "sender";
    /// File being requested or delivered (DOWNLOAD_REQUEST, DOWNLOAD)
    pub const FILENAME: &str = "filename";
    /// Machine-readable error code (ERROR)
    pub const CODE: &str = "code";
}

/// Frame type codes
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Client registers (or retries) a username
    Username = 1,
    /// Client sends a chat message, optionally to one recipient
    OutMessage = 2,
    /// Server relays a chat message from another user
    InMessage = 3,
    /// Server notice, e.g. joins and departures
    Announcement = 4,
    /// Client asks for the shared file listing
    FileListRequest = 5,
    /// Server replies with the shared file listing
    FileList = 6,
    /// Server rejects a username that is already connected
    DuplicateUsername = 7,
    /// Client asks to download a shared file
    DownloadRequest = 8,
    /// Server streams a file; the payload is the file body
    Download = 9,
    /// Server reports a request it could not satisfy
    Error = 10,
}

impl FrameType {
    /// All frame types, in code order
    pub const ALL: [FrameType; 10] = [
        FrameType::Username,
        FrameType::OutMessage,
        FrameType::InMessage,
        FrameType::Announcement,
        FrameType::FileListRequest,
        FrameType::FileList,
        FrameType::DuplicateUsername,
        FrameType::DownloadRequest,
        FrameType::Download,
        FrameType::Error,
    ];

    /// Look up a frame type by its numeric code
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::Username),
            2 => Some(Self::OutMessage),
            3 => Some(Self::InMessage),
            4 => Some(Self::Announcement),
            5 => Some(Self::FileListRequest),
            6 => Some(Self::FileList),
            7 => Some(Self::DuplicateUsername),
            8 => Some(Self::DownloadRequest),
            9 => Some(Self::Download),
            10 => Some(Self::Error),
            _ => None,
        }
    }

    /// Numeric code written to the header
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Protocol name of this frame type
    pub fn name(self) -> &'static str {
        match self {
            Self::Username => "USERNAME",
            Self::OutMessage => "OUT_MESSAGE",
            Self::InMessage => "IN_MESSAGE",
            Self::Announcement => "ANNOUNCEMENT",
            Self::FileListRequest => "FILE_LIST_REQUEST",
            Self::FileList => "FILE_LIST",
            Self::DuplicateUsername => "DUPLICATE_USERNAME",
            Self::DownloadRequest => "DOWNLOAD_REQUEST",
            Self::Download => "DOWNLOAD",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Check that a username can be registered and used in `/msg` commands
///
/// Usernames must be non-empty, at most `MAX_USERNAME_LEN` characters, and
/// free of whitespace, control characters, path separators and the param
/// delimiter. `.` and `..` are refused since clients use the name as a
/// download directory.
pub fn validate_username(username: &str) -> Result<(), ProtocolError> {
    let invalid = |reason: &str| ProtocolError::InvalidParam {
        key: param::USERNAME.to_string(),
        reason: reason.to_string(),
    };

    if username.is_empty() {
        return Err(invalid("username is empty"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(invalid("username is too long"));
    }
    if username
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(invalid("username contains whitespace or control characters"));
    }
    if username.contains(DELIMITER) {
        return Err(invalid("username contains the param delimiter"));
    }
    if username.contains(['/', '\\']) {
        return Err(invalid("username contains a path separator"));
    }
    if username == "." || username == ".." {
        return Err(invalid("username is a relative path"));
    }

    Ok(())
}
