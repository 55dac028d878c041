//! Configuration types for the chat server and client
//!
//! `ServerConfig` can be loaded from a JSON file; any field left out takes
//! its default. Both configs are validated before use.

use crate::error::ConfigError;
use crate::network::{DEFAULT_CHUNK_SIZE, DEFAULT_QUEUE_CAPACITY, MAX_BUFFERED_PAYLOAD};
use crate::protocol::validate_username;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default server port
pub const DEFAULT_PORT: u16 = 5050;

/// Default directory holding files offered for download
pub const DEFAULT_FILES_DIR: &str = "download";

/// Largest accepted transfer chunk size (16 MB)
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    ///
    /// Port 0 picks a random free port.
    pub listen_addr: SocketAddr,

    /// Directory whose regular files are offered for download
    pub files_dir: PathBuf,

    /// Chunk size for payload reads and file streaming
    pub chunk_size: usize,

    /// Largest non-DOWNLOAD payload accepted from a client
    pub max_payload_size: u64,

    /// Outbound queue depth per connection
    pub outbound_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            files_dir: PathBuf::from(DEFAULT_FILES_DIR),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_payload_size: MAX_BUFFERED_PAYLOAD,
            outbound_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Load a config from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let load_error = |reason: String| ConfigError::Load {
            path: path.to_path_buf(),
            reason,
        };

        let text = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| load_error(e.to_string()))
    }

    /// Set the listen address
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Set the shared files directory
    pub fn with_files_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.files_dir = dir.into();
        self
    }

    /// Set the transfer chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the outbound queue depth
    pub fn with_outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity;
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// - `chunk_size` must be between 1 byte and `MAX_CHUNK_SIZE`
    /// - `max_payload_size` and `outbound_queue_capacity` must be non-zero
    /// - `files_dir` must not be empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_chunk_size(self.chunk_size)?;

        if self.max_payload_size == 0 {
            return Err(invalid("max_payload_size", "must be greater than 0"));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(invalid("outbound_queue_capacity", "must be greater than 0"));
        }
        if self.files_dir.as_os_str().is_empty() {
            return Err(invalid("files_dir", "must not be empty"));
        }

        Ok(())
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server address as `host:port`
    pub server_addr: String,

    /// Username to register
    pub username: String,

    /// Downloads are saved under `<download_root>/<username>/`
    pub download_root: PathBuf,

    /// Chunk size for payload reads
    pub chunk_size: usize,

    /// Largest non-DOWNLOAD payload accepted from the server
    pub max_payload_size: u64,
}

impl ClientConfig {
    /// Create a config with default limits
    pub fn new(server_addr: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            username: username.into(),
            download_root: PathBuf::from("."),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_payload_size: MAX_BUFFERED_PAYLOAD,
        }
    }

    /// Set the download root
    pub fn with_download_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.download_root = root.into();
        self
    }

    /// Set the transfer chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Directory downloads for `username` are written to
    pub fn download_dir(&self, username: &str) -> PathBuf {
        self.download_root.join(username)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_addr.trim().is_empty() {
            return Err(invalid("server_addr", "must not be empty"));
        }
        validate_username(&self.username).map_err(|e| invalid("username", &e.to_string()))?;
        validate_chunk_size(self.chunk_size)?;
        if self.max_payload_size == 0 {
            return Err(invalid("max_payload_size", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Parse a human-readable size such as `64KB`, `1.5MB`, `512B` or `4096`
pub fn parse_size(s: &str) -> Result<usize, ConfigError> {
    let s = s.trim().to_uppercase();
    let bad = || invalid("size", &format!("{:?} is not a size; use a form like 64KB or 1MB", s));

    if let Some(num) = s.strip_suffix("MB") {
        let num: f64 = num.trim().parse().map_err(|_| bad())?;
        scaled(num, 1024.0 * 1024.0).ok_or_else(bad)
    } else if let Some(num) = s.strip_suffix("KB") {
        let num: f64 = num.trim().parse().map_err(|_| bad())?;
        scaled(num, 1024.0).ok_or_else(bad)
    } else if let Some(num) = s.strip_suffix('B') {
        num.trim().parse().map_err(|_| bad())
    } else {
        s.parse().map_err(|_| bad())
    }
}

fn scaled(num: f64, unit: f64) -> Option<usize> {
    let bytes = num * unit;
    (bytes.is_finite() && bytes >= 0.0).then_some(bytes as usize)
}

fn validate_chunk_size(chunk_size: usize) -> Result<(), ConfigError> {
    if chunk_size == 0 {
        return Err(invalid("chunk_size", "must be greater than 0"));
    }
    if chunk_size > MAX_CHUNK_SIZE {
        return Err(invalid(
            "chunk_size",
            &format!("must be at most {} bytes", MAX_CHUNK_SIZE),
        ));
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
