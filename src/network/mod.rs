//! Network module
//!
//! This module moves frames between peers: chunked payload transfer, frame
//! reading, and connection handles with isolated writer tasks.

mod connection;
mod reader;
pub mod transfer;

pub use connection::{Connection, ConnectionId, ConnectionOptions, DEFAULT_QUEUE_CAPACITY};
pub use reader::{FrameReader, Incoming};
pub use transfer::{copy_exact, read_exact, read_stream, ChunkStream, DEFAULT_CHUNK_SIZE};

/// Largest non-DOWNLOAD payload buffered in memory (16 MB)
/// Anything bigger is treated as a protocol violation
pub const MAX_BUFFERED_PAYLOAD: u64 = 16 * 1024 * 1024;
