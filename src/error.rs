//! Error types for chatrelay
//!
//! Each failure domain has its own enum; `RelayError` wraps them so library
//! callers can use a single `Result` alias and still match on the domain.

use crate::network::ConnectionId;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for chatrelay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Wire format errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Chunked transfer errors
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Connection and socket errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Registry and delivery errors
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    /// Server-side file store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Client command-line errors
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while encoding or decoding frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A fixed-width numeric field or the param block could not be parsed
    #[error("Malformed header: {reason}")]
    MalformedHeader {
        /// What was wrong with the header
        reason: String,
    },

    /// The type code does not name a known frame type
    #[error("Unknown frame type code: {code}")]
    UnknownFrameType {
        /// The numeric code found in the header
        code: u16,
    },

    /// The encoded params do not fit in the fixed header
    #[error("Header overflow: {required} bytes needed, {available} available")]
    HeaderOverflow {
        /// Bytes the encoded header would need
        required: usize,
        /// Fixed header size
        available: usize,
    },

    /// A param key or value cannot be represented on the wire
    #[error("Invalid header param {key:?}: {reason}")]
    InvalidParam {
        /// The offending key
        key: String,
        /// Why it was rejected
        reason: String,
    },

    /// A required param was absent from a received frame
    #[error("Missing header param: {key}")]
    MissingParam {
        /// The missing key
        key: String,
    },

    /// The payload announced by a header exceeds the configured limit
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        /// Announced payload size
        size: u64,
        /// Largest payload buffered in memory
        max: u64,
    },

    /// A text payload was not valid UTF-8
    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors produced by the chunked transfer helpers
#[derive(Error, Debug)]
pub enum TransferError {
    /// The stream closed before the expected number of bytes arrived
    #[error("Short read: expected {expected} bytes, received {received}")]
    ShortRead {
        /// Bytes the caller asked for
        expected: u64,
        /// Bytes that actually arrived
        received: u64,
        /// The bytes collected before the stream closed
        partial: Vec<u8>,
    },

    /// Underlying read or write failure
    #[error("Transfer I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Network-level errors
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Could not bind, accept, or connect
    #[error("Connection to {address} failed: {reason}")]
    ConnectionFailed {
        /// Address involved
        address: String,
        /// Failure description
        reason: String,
    },

    /// The connection's writer has shut down
    #[error("Connection to {peer} is closed")]
    ConnectionClosed {
        /// Remote peer address
        peer: String,
    },

    /// The peer is not draining its outbound queue
    #[error("Outbound queue for {peer} is full")]
    SendQueueFull {
        /// Remote peer address
        peer: String,
    },

    /// Socket I/O failure
    #[error("Socket I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Registry and delivery errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// The username already belongs to a live connection
    #[error("Username already taken: {username}")]
    DuplicateUsername {
        /// The contested username
        username: String,
    },

    /// Unicast target is not registered
    #[error("Recipient not found: {username}")]
    RecipientNotFound {
        /// The missing recipient
        username: String,
    },

    /// The recipient exists but the frame could not be queued
    #[error("Delivery to {username} ({connection}) failed: {reason}")]
    DeliveryFailed {
        /// Intended recipient
        username: String,
        /// The connection that refused the frame
        connection: ConnectionId,
        /// Failure description
        reason: String,
    },
}

/// File store errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Requested file does not exist in the shared directory
    #[error("File not found: {name}")]
    FileNotFound {
        /// Requested name
        name: String,
    },

    /// The name is empty, hidden-relative, or tries to escape the directory
    #[error("Invalid filename: {name:?}")]
    InvalidFilename {
        /// Rejected name
        name: String,
    },

    /// File system failure
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A field holds an unusable value
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// A config file could not be read or parsed
    #[error("Failed to load config from {path}: {reason}")]
    Load {
        /// Config file path
        path: PathBuf,
        /// Failure description
        reason: String,
    },
}

/// Client command-line parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// A known command was given the wrong arguments
    #[error("Usage: {usage}")]
    Usage {
        /// Correct usage string
        usage: &'static str,
    },

    /// A `/command` that the client does not understand
    #[error("Unknown command: {name}")]
    UnknownCommand {
        /// The command word, including the slash
        name: String,
    },

    /// `/msg` addressed to the sending user
    #[error("Select someone other than yourself to directly message")]
    SelfMessage,

    /// Blank input line
    #[error("Nothing to send")]
    Empty,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RelayError>;
