//! Frame reading over a byte stream

use crate::error::{ProtocolError, RelayError, Result, TransferError};
use crate::network::transfer::{read_exact, read_stream, ChunkStream, DEFAULT_CHUNK_SIZE};
use crate::network::MAX_BUFFERED_PAYLOAD;
use crate::protocol::{decode_header, param, Frame, FrameType, Header, Message, HEADER_SIZE};
use bytes::Bytes;
use tokio::io::AsyncRead;

/// An inbound frame
pub enum Incoming<'a, R: ?Sized> {
    /// A frame whose payload was read into memory
    Message(Message),
    /// A DOWNLOAD frame; `body` yields the file bytes and must be consumed
    /// (or drained) before the next call to [`FrameReader::next`]
    Download {
        /// Name the sender gave the file
        filename: String,
        /// File size in bytes
        size: u64,
        /// Chunked file body
        body: ChunkStream<'a, R>,
    },
}

/// Reads headers and payloads from one side of a connection
pub struct FrameReader<R> {
    inner: R,
    chunk_size: usize,
    max_payload: u64,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap a reader with default limits
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_payload: MAX_BUFFERED_PAYLOAD,
        }
    }

    /// Set the transfer chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the largest payload that will be buffered in memory
    pub fn with_max_payload(mut self, max_payload: u64) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Read the next header
    ///
    /// Returns `Ok(None)` if the peer closed the stream cleanly between
    /// frames.
    pub async fn read_header(&mut self) -> Result<Option<Header>> {
        match read_exact(&mut self.inner, HEADER_SIZE as u64, self.chunk_size).await {
            Ok(bytes) => Ok(Some(decode_header(&bytes)?)),
            Err(TransferError::ShortRead { received: 0, .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the next frame with its payload buffered in memory
    ///
    /// DOWNLOAD frames are accepted too, subject to the payload limit.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(header) = self.read_header().await? else {
            return Ok(None);
        };
        let payload = self.read_payload(header.payload_size).await?;
        Ok(Some(Frame::from_parts(header, payload)?))
    }

    /// Read the next frame
    ///
    /// DOWNLOAD bodies are handed back as a chunk stream; every other payload
    /// is buffered and parsed into a [`Message`].
    pub async fn next(&mut self) -> Result<Option<Incoming<'_, R>>> {
        let Some(header) = self.read_header().await? else {
            return Ok(None);
        };

        if header.frame_type == FrameType::Download {
            let filename = header
                .param(param::FILENAME)
                .ok_or_else(|| ProtocolError::MissingParam {
                    key: param::FILENAME.to_string(),
                })?
                .to_string();
            let size = header.payload_size;
            return Ok(Some(Incoming::Download {
                filename,
                size,
                body: read_stream(&mut self.inner, size, self.chunk_size),
            }));
        }

        let payload = self.read_payload(header.payload_size).await?;
        let frame = Frame::from_parts(header, payload)?;
        Ok(Some(Incoming::Message(Message::from_frame(&frame)?)))
    }

    /// Unwrap the underlying reader
    pub fn into_inner(self) -> R {
        self.inner
    }

    async fn read_payload(&mut self, size: u64) -> Result<Bytes> {
        if size > self.max_payload {
            return Err(RelayError::Protocol(ProtocolError::PayloadTooLarge {
                size,
                max: self.max_payload,
            }));
        }
        let data = read_exact(&mut self.inner, size, self.chunk_size).await?;
        Ok(Bytes::from(data))
    }
}
