//! Message buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management.
//! Implements a state machine for handling fragmented input:
//! - `EndOfMessage`: scanning for `]]>]]>`, resuming where the last scan
//!   stopped so a marker split across reads is still found
//! - `ChunkHeader`: waiting for `\n#<len>\n` or `\n##\n`
//! - `ChunkData`: header parsed, need N more chunk bytes
//!
//! Any framing violation poisons the buffer: every later call returns the
//! same [`FramingError`].
//!
//! # Example
//!
//! ```
//! use netconf_engine::protocol::{FramingMode, MessageBuffer};
//!
//! let mut buffer = MessageBuffer::new(FramingMode::Chunked);
//!
//! assert!(buffer.push(b"\n#5\nhel").unwrap().is_empty());
//! let messages = buffer.push(b"lo\n##\n").unwrap();
//! assert_eq!(&messages[0][..], b"hello");
//! ```

use bytes::{Bytes, BytesMut};

use super::wire_format::{
    FramingMode, DEFAULT_MAX_CHUNK_SIZE, EOM_MARKER, MAX_CHUNK_SIZE_DIGITS,
};
use crate::error::{FramingError, FramingErrorKind};

/// State machine for message extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// End-of-message framing; marker search resumes at `scan_from`.
    EndOfMessage { scan_from: usize },
    /// Chunked framing, expecting a chunk header or end-of-chunks.
    ChunkHeader,
    /// Chunked framing, `remaining` bytes of the current chunk still due.
    ChunkData { remaining: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete messages.
pub struct MessageBuffer {
    /// Bytes received but not yet consumed.
    buffer: BytesMut,
    /// Chunk data collected for the message being assembled.
    message: BytesMut,
    /// Chunks collected for the message being assembled.
    chunks: usize,
    /// Current parsing state.
    state: State,
    /// Absolute stream offset of `buffer[0]`.
    offset: u64,
    /// Maximum allowed chunk size.
    max_chunk_size: u32,
    /// First framing error seen, returned on every later call.
    failed: Option<FramingError>,
}

impl MessageBuffer {
    /// Create a new buffer with the default chunk size limit (16 MiB).
    pub fn new(mode: FramingMode) -> Self {
        Self::with_max_chunk_size(mode, DEFAULT_MAX_CHUNK_SIZE)
    }

    /// Create a new buffer with a custom chunk size limit.
    pub fn with_max_chunk_size(mode: FramingMode, max_chunk_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            message: BytesMut::new(),
            chunks: 0,
            state: Self::initial_state(mode),
            offset: 0,
            max_chunk_size,
            failed: None,
        }
    }

    fn initial_state(mode: FramingMode) -> State {
        match mode {
            FramingMode::EndOfMessage => State::EndOfMessage { scan_from: 0 },
            FramingMode::Chunked => State::ChunkHeader,
        }
    }

    /// Current framing mode.
    pub fn mode(&self) -> FramingMode {
        match self.state {
            State::EndOfMessage { .. } => FramingMode::EndOfMessage,
            State::ChunkHeader | State::ChunkData { .. } => FramingMode::Chunked,
        }
    }

    /// Switch framing mode between messages.
    ///
    /// Bytes already buffered after the last extracted message are parsed
    /// in the new mode. Only `EndOfMessage -> Chunked` is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`FramingErrorKind::ModeDowngrade`] when leaving chunked mode.
    pub fn set_mode(&mut self, mode: FramingMode) -> Result<(), FramingError> {
        match (self.mode(), mode) {
            (FramingMode::EndOfMessage, FramingMode::Chunked) => {
                self.state = State::ChunkHeader;
                Ok(())
            }
            (FramingMode::Chunked, FramingMode::EndOfMessage) => {
                Err(FramingError::new(self.offset, FramingErrorKind::ModeDowngrade))
            }
            _ => Ok(()),
        }
    }

    /// Push data into the buffer and extract all complete messages.
    ///
    /// Partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns the first framing violation found in the stream.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>, FramingError> {
        self.extend(data);

        let mut messages = Vec::new();
        while let Some(message) = self.next_message()? {
            messages.push(message);
        }
        Ok(messages)
    }

    /// Append data to the buffer without extracting messages.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract a single message from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(payload))` if a complete message was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a framing violation
    pub fn next_message(&mut self) -> Result<Option<Bytes>, FramingError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        let result = self.try_extract_one();
        if let Err(err) = &result {
            self.failed = Some(err.clone());
        }
        result
    }

    fn try_extract_one(&mut self) -> Result<Option<Bytes>, FramingError> {
        loop {
            match self.state {
                State::EndOfMessage { scan_from } => {
                    return Ok(self.extract_end_of_message(scan_from));
                }

                State::ChunkHeader => {
                    if !self.parse_chunk_header()? {
                        return Ok(None);
                    }
                    if matches!(self.state, State::ChunkHeader) {
                        // End-of-chunks consumed: message complete.
                        self.chunks = 0;
                        return Ok(Some(self.message.split().freeze()));
                    }
                }

                State::ChunkData { remaining } => {
                    if self.buffer.is_empty() {
                        return Ok(None);
                    }
                    let take = remaining.min(self.buffer.len());
                    let data = self.buffer.split_to(take);
                    self.message.extend_from_slice(&data);
                    self.offset += take as u64;

                    let remaining = remaining - take;
                    if remaining == 0 {
                        self.chunks += 1;
                        self.state = State::ChunkHeader;
                    } else {
                        self.state = State::ChunkData { remaining };
                    }
                }
            }
        }
    }

    fn extract_end_of_message(&mut self, scan_from: usize) -> Option<Bytes> {
        let found = self.buffer[scan_from..]
            .windows(EOM_MARKER.len())
            .position(|window| window == EOM_MARKER);

        match found {
            Some(pos) => {
                let end = scan_from + pos;
                let payload = self.buffer.split_to(end).freeze();
                let _ = self.buffer.split_to(EOM_MARKER.len());
                self.offset += (end + EOM_MARKER.len()) as u64;
                self.state = State::EndOfMessage { scan_from: 0 };
                Some(payload)
            }
            None => {
                // Keep the tail that could be the start of a split marker.
                let scan_from = self.buffer.len().saturating_sub(EOM_MARKER.len() - 1);
                self.state = State::EndOfMessage { scan_from };
                None
            }
        }
    }

    /// Parse a chunk header or end-of-chunks marker.
    ///
    /// Returns `Ok(false)` if more bytes are needed. On `Ok(true)` the state
    /// is `ChunkData` after a chunk header, or still `ChunkHeader` after the
    /// end-of-chunks marker.
    fn parse_chunk_header(&mut self) -> Result<bool, FramingError> {
        let buf = &self.buffer;
        let at = |idx: usize| self.offset + idx as u64;

        if buf.is_empty() {
            return Ok(false);
        }
        if buf[0] != b'\n' {
            return Err(FramingError::new(at(0), FramingErrorKind::MalformedChunkHeader));
        }
        if buf.len() < 2 {
            return Ok(false);
        }
        if buf[1] != b'#' {
            return Err(FramingError::new(at(1), FramingErrorKind::MalformedChunkHeader));
        }
        if buf.len() < 3 {
            return Ok(false);
        }

        if buf[2] == b'#' {
            if buf.len() < 4 {
                return Ok(false);
            }
            if buf[3] != b'\n' {
                return Err(FramingError::new(at(3), FramingErrorKind::MalformedEndOfChunks));
            }
            if self.chunks == 0 {
                return Err(FramingError::new(at(0), FramingErrorKind::EmptyMessage));
            }
            let _ = self.buffer.split_to(4);
            self.offset += 4;
            return Ok(true);
        }

        // Digits run from index 2 up to the terminating newline.
        let digits = &buf[2..];
        let newline = digits.iter().position(|b| *b == b'\n');
        let field = &digits[..newline.unwrap_or(digits.len())];

        if let Some(idx) = field.iter().position(|b| !b.is_ascii_digit()) {
            return Err(FramingError::new(at(2 + idx), FramingErrorKind::InvalidChunkSize));
        }
        if field.len() > MAX_CHUNK_SIZE_DIGITS {
            return Err(FramingError::new(
                at(2 + MAX_CHUNK_SIZE_DIGITS),
                FramingErrorKind::InvalidChunkSize,
            ));
        }
        let Some(newline) = newline else {
            return Ok(false);
        };
        if field.is_empty() {
            return Err(FramingError::new(at(2), FramingErrorKind::InvalidChunkSize));
        }
        if field[0] == b'0' {
            let kind = if field.len() == 1 {
                FramingErrorKind::ZeroChunk
            } else {
                FramingErrorKind::InvalidChunkSize
            };
            return Err(FramingError::new(at(2), kind));
        }

        let size = field
            .iter()
            .fold(0u64, |acc, d| acc * 10 + u64::from(d - b'0'));
        if size > u64::from(self.max_chunk_size) {
            return Err(FramingError::new(
                at(2),
                FramingErrorKind::OversizedChunk {
                    size,
                    max: self.max_chunk_size,
                },
            ));
        }

        let header_len = 2 + newline + 1;
        let _ = self.buffer.split_to(header_len);
        self.offset += header_len as u64;
        self.state = State::ChunkData {
            remaining: size as usize,
        };
        Ok(true)
    }

    /// Get the number of buffered, unconsumed bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Absolute stream offset of the next unconsumed byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::EndOfMessage { .. } => "EndOfMessage",
            State::ChunkHeader => "ChunkHeader",
            State::ChunkData { .. } => "ChunkData",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_message;

    fn chunked(payload: &[u8]) -> Vec<u8> {
        encode_message(payload, FramingMode::Chunked, 4).unwrap().to_vec()
    }

    #[test]
    fn test_single_eom_message() {
        let mut buffer = MessageBuffer::new(FramingMode::EndOfMessage);
        let messages = buffer.push(b"<hello/>]]>]]>").unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(&messages[0][..], b"<hello/>");
        assert!(buffer.is_empty());
        assert_eq!(buffer.offset(), 14);
    }

    #[test]
    fn test_eom_marker_split_across_reads() {
        let mut buffer = MessageBuffer::new(FramingMode::EndOfMessage);

        assert!(buffer.push(b"<a/>]]>").unwrap().is_empty());
        assert!(buffer.push(b"]]").unwrap().is_empty());
        let messages = buffer.push(b">").unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(&messages[0][..], b"<a/>");
    }

    #[test]
    fn test_multiple_eom_messages_in_one_push() {
        let mut buffer = MessageBuffer::new(FramingMode::EndOfMessage);
        let messages = buffer.push(b"<a/>]]>]]><b/>]]>]]><c").unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(&messages[1][..], b"<b/>");
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_chunked_multiple_chunks() {
        let mut buffer = MessageBuffer::new(FramingMode::Chunked);
        let messages = buffer.push(b"\n#4\n<rpc\n#17\n message-id=\"1\"/>\n##\n").unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(&messages[0][..], b"<rpc message-id=\"1\"/>");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_chunked_byte_at_a_time() {
        let mut buffer = MessageBuffer::new(FramingMode::Chunked);
        let bytes = chunked(b"<notification/>");

        let mut all = Vec::new();
        for byte in &bytes {
            all.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all.len(), 1);
        assert_eq!(&all[0][..], b"<notification/>");
    }

    #[test]
    fn test_chunk_data_state_between_reads() {
        let mut buffer = MessageBuffer::new(FramingMode::Chunked);
        assert!(buffer.push(b"\n#10\nabc").unwrap().is_empty());
        assert_eq!(buffer.state_name(), "ChunkData");

        assert!(buffer.push(b"defghij").unwrap().is_empty());
        assert_eq!(buffer.state_name(), "ChunkHeader");

        let messages = buffer.push(b"\n##\n").unwrap();
        assert_eq!(&messages[0][..], b"abcdefghij");
    }

    #[test]
    fn test_zero_chunk_rejected() {
        let mut buffer = MessageBuffer::new(FramingMode::Chunked);
        let err = buffer.push(b"\n#0\n").unwrap_err();
        assert_eq!(err.kind, FramingErrorKind::ZeroChunk);
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn test_oversized_chunk_rejected() {
        let mut buffer = MessageBuffer::with_max_chunk_size(FramingMode::Chunked, 100);
        let err = buffer.push(b"\n#101\n").unwrap_err();
        assert_eq!(
            err.kind,
            FramingErrorKind::OversizedChunk { size: 101, max: 100 }
        );
    }

    #[test]
    fn test_too_many_digits_rejected_before_newline() {
        let mut buffer = MessageBuffer::new(FramingMode::Chunked);
        let err = buffer.push(b"\n#12345678901").unwrap_err();
        assert_eq!(err.kind, FramingErrorKind::InvalidChunkSize);
    }

    #[test]
    fn test_malformed_header_offset_after_message() {
        let mut buffer = MessageBuffer::new(FramingMode::Chunked);
        let mut bytes = chunked(b"ok");
        let first_len = bytes.len() as u64;
        bytes.extend_from_slice(b"\nX");

        let err = buffer.push(&bytes).unwrap_err();
        assert_eq!(err.kind, FramingErrorKind::MalformedChunkHeader);
        assert_eq!(err.offset, first_len + 1);
    }

    #[test]
    fn test_leading_zero_and_letters_rejected() {
        let mut buffer = MessageBuffer::new(FramingMode::Chunked);
        assert_eq!(
            buffer.push(b"\n#05\n").unwrap_err().kind,
            FramingErrorKind::InvalidChunkSize
        );

        let mut buffer = MessageBuffer::new(FramingMode::Chunked);
        assert_eq!(
            buffer.push(b"\n#1a\n").unwrap_err().kind,
            FramingErrorKind::InvalidChunkSize
        );
    }

    #[test]
    fn test_end_of_chunks_without_chunks_rejected() {
        let mut buffer = MessageBuffer::new(FramingMode::Chunked);
        let err = buffer.push(b"\n##\n").unwrap_err();
        assert_eq!(err.kind, FramingErrorKind::EmptyMessage);
    }

    #[test]
    fn test_error_poisons_buffer() {
        let mut buffer = MessageBuffer::new(FramingMode::Chunked);
        let first = buffer.push(b"garbage").unwrap_err();
        let second = buffer.push(&chunked(b"valid")).unwrap_err();
        assert_eq!(first, second);
    }

    #[test]
    fn test_switch_to_chunked_keeps_buffered_bytes() {
        let mut buffer = MessageBuffer::new(FramingMode::EndOfMessage);
        let mut bytes = b"<hello/>]]>]]>".to_vec();
        bytes.extend(chunked(b"<rpc/>"));

        buffer.extend(&bytes);
        let hello = buffer.next_message().unwrap().unwrap();
        assert_eq!(&hello[..], b"<hello/>");
        assert!(buffer.next_message().unwrap().is_none());

        buffer.set_mode(FramingMode::Chunked).unwrap();
        let rpc = buffer.next_message().unwrap().unwrap();
        assert_eq!(&rpc[..], b"<rpc/>");
    }

    #[test]
    fn test_downgrade_rejected() {
        let mut buffer = MessageBuffer::new(FramingMode::Chunked);
        let err = buffer.set_mode(FramingMode::EndOfMessage).unwrap_err();
        assert_eq!(err.kind, FramingErrorKind::ModeDowngrade);
        assert_eq!(buffer.mode(), FramingMode::Chunked);
    }
}
