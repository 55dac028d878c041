//! # chatrelay
//!
//! A multi-user TCP chat relay. Every frame starts with a fixed 1024-byte
//! header carrying a frame type, a payload size and `key:value` params.
//! The server keeps a username registry, routes broadcast and direct
//! messages, and streams shared files to clients in bounded chunks.
//!
//! ## Quick Start
//!
//! ```no_run
//! use chatrelay::config::ServerConfig;
//! use chatrelay::server::ChatServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = ChatServer::bind(ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod routing;
pub mod server;

// Re-export main types
pub use client::{ClientEvent, ClientSession, Command};
pub use config::{ClientConfig, ServerConfig};
pub use error::{
    CommandError, ConfigError, NetworkError, ProtocolError, RelayError, Result, RoutingError,
    StorageError, TransferError,
};
pub use network::{Connection, FrameReader, Incoming};
pub use protocol::{Frame, FrameType, Header, Message};
pub use routing::{ConnectionRegistry, Router};
pub use server::{ChatServer, ServerState};
