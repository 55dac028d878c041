//! Chunked payload transfer
//!
//! Payloads are read in chunks of at most `chunk_size` bytes so a file body
//! of any size can be relayed with bounded memory. [`read_stream`] yields
//! chunks as they arrive, [`read_exact`] collects them, and [`copy_exact`]
//! pipes them into a writer.

use crate::error::TransferError;
use bytes::{Bytes, BytesMut};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default transfer chunk size (64 KB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A finite, non-restartable sequence of payload chunks
///
/// Each call to [`next_chunk`](ChunkStream::next_chunk) performs at most one
/// read on the underlying stream and never allocates more than
/// `chunk_size` bytes.
pub struct ChunkStream<'a, R: ?Sized> {
    reader: &'a mut R,
    expected: u64,
    received: u64,
    chunk_size: usize,
    done: bool,
}

impl<'a, R> ChunkStream<'a, R>
where
    R: AsyncRead + Unpin + ?Sized,
{
    /// Stream `expected` bytes from `reader`
    pub fn new(reader: &'a mut R, expected: u64, chunk_size: usize) -> Self {
        Self {
            reader,
            expected,
            received: 0,
            chunk_size: chunk_size.max(1),
            done: expected == 0,
        }
    }

    /// Total bytes this stream will yield if the peer stays connected
    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// Bytes yielded so far
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Bytes still to come
    pub fn remaining(&self) -> u64 {
        self.expected - self.received
    }

    /// Read the next chunk
    ///
    /// Returns `None` once `expected` bytes have been yielded, or after an
    /// error has been returned. If the stream closes early the final item is
    /// `ShortRead`.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, TransferError>> {
        if self.done {
            return None;
        }

        let want = self.remaining().min(self.chunk_size as u64) as usize;
        let mut buf = BytesMut::zeroed(want);

        loop {
            match self.reader.read(&mut buf[..]).await {
                Ok(0) => {
                    self.done = true;
                    return Some(Err(TransferError::ShortRead {
                        expected: self.expected,
                        received: self.received,
                        partial: Vec::new(),
                    }));
                },
                Ok(n) => {
                    buf.truncate(n);
                    self.received += n as u64;
                    self.done = self.received == self.expected;
                    return Some(Ok(buf.freeze()));
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(TransferError::Io(e)));
                },
            }
        }
    }

    /// Consume and discard the rest of the stream
    ///
    /// Returns the number of bytes discarded.
    pub async fn drain(&mut self) -> Result<u64, TransferError> {
        let mut discarded = 0;
        while let Some(chunk) = self.next_chunk().await {
            discarded += chunk?.len() as u64;
        }
        Ok(discarded)
    }
}

/// Lazily read exactly `n` bytes from `reader` in bounded chunks
pub fn read_stream<R>(reader: &mut R, n: u64, chunk_size: usize) -> ChunkStream<'_, R>
where
    R: AsyncRead + Unpin + ?Sized,
{
    ChunkStream::new(reader, n, chunk_size)
}

/// Read exactly `n` bytes from `reader`, in chunks of at most `chunk_size`
///
/// # Errors
///
/// Returns `ShortRead` carrying the bytes received so far if the stream
/// closes before `n` bytes arrive.
pub async fn read_exact<R>(reader: &mut R, n: u64, chunk_size: usize) -> Result<Vec<u8>, TransferError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut data = Vec::with_capacity(n.min(chunk_size as u64) as usize);
    let mut stream = read_stream(reader, n, chunk_size);

    while let Some(chunk) = stream.next_chunk().await {
        match chunk {
            Ok(chunk) => data.extend_from_slice(&chunk),
            Err(TransferError::ShortRead {
                expected, received, ..
            }) => {
                return Err(TransferError::ShortRead {
                    expected,
                    received,
                    partial: data,
                })
            },
            Err(e) => return Err(e),
        }
    }

    Ok(data)
}

/// Relay exactly `n` bytes from `reader` to `writer` one chunk at a time
///
/// Chunks are written in the order they are read. Returns the number of
/// bytes written, which is always `n` on success.
pub async fn copy_exact<R, W>(
    reader: &mut R,
    writer: &mut W,
    n: u64,
    chunk_size: usize,
) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut stream = read_stream(reader, n, chunk_size);
    let mut written = 0;

    while let Some(chunk) = stream.next_chunk().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    Ok(written)
}
