//! Async message reader over any `AsyncRead`.
//!
//! Yields one framed payload at a time, reading more bytes only when the
//! buffer holds no complete message. Pulling messages one by one lets the
//! session switch framing right after the hello without misreading bytes
//! that follow it.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::frame_buffer::MessageBuffer;
use super::wire_format::{FramingMode, DEFAULT_MAX_CHUNK_SIZE};
use crate::error::{FramingError, Result};

/// Default read buffer size (64 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Reads framed messages from a byte stream.
pub struct MessageReader<R> {
    reader: R,
    buffer: MessageBuffer,
    read_buf: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    /// Create a reader starting in end-of-message framing.
    pub fn new(reader: R) -> Self {
        Self::with_limits(reader, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_READ_BUFFER_SIZE)
    }

    /// Create a reader with a chunk size limit and read buffer size.
    pub fn with_limits(reader: R, max_chunk_size: u32, read_buffer_size: usize) -> Self {
        Self {
            reader,
            buffer: MessageBuffer::with_max_chunk_size(FramingMode::EndOfMessage, max_chunk_size),
            read_buf: vec![0u8; read_buffer_size.max(1)],
            eof: false,
        }
    }

    /// Read the next message payload.
    ///
    /// Returns `Ok(None)` once the stream is closed. Bytes of an incomplete
    /// message at close are discarded.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from the stream and framing errors from the
    /// buffer. Framing errors are permanent.
    pub async fn next_message(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(message) = self.buffer.next_message()? {
                return Ok(Some(message));
            }
            if self.eof {
                return Ok(None);
            }

            let n = self.reader.read(&mut self.read_buf).await?;
            if n == 0 {
                self.eof = true;
                if !self.buffer.is_empty() {
                    tracing::debug!(
                        "Stream closed with {} bytes of incomplete message",
                        self.buffer.len()
                    );
                }
                continue;
            }
            self.buffer.extend(&self.read_buf[..n]);
        }
    }

    /// Switch framing for all following messages.
    pub fn set_mode(&mut self, mode: FramingMode) -> std::result::Result<(), FramingError> {
        self.buffer.set_mode(mode)
    }

    /// Current framing mode.
    pub fn mode(&self) -> FramingMode {
        self.buffer.mode()
    }
}
