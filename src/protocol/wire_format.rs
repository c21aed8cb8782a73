//! Wire format: framing modes, literal tokens and message encoding.
//!
//! End-of-message framing (base:1.0):
//! ```text
//! <payload>]]>]]>
//! ```
//!
//! Chunked framing (base:1.1, RFC 6242 §4.2):
//! ```text
//! \n#<chunk-size>\n<chunk-size bytes> ... \n##\n
//! ```
//!
//! Chunk sizes are decimal, 1 to 4294967295, without leading zeros.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FramingError, FramingErrorKind};

/// End-of-message marker for base:1.0 framing.
pub const EOM_MARKER: &[u8] = b"]]>]]>";

/// End-of-chunks marker for chunked framing.
pub const END_OF_CHUNKS: &[u8] = b"\n##\n";

/// Largest chunk size allowed by RFC 6242.
pub const ABSOLUTE_MAX_CHUNK_SIZE: u32 = u32::MAX;

/// Default inbound chunk size limit (16 MiB).
pub const DEFAULT_MAX_CHUNK_SIZE: u32 = 16 * 1024 * 1024;

/// Default size of outbound chunks (8 KiB).
pub const DEFAULT_OUTBOUND_CHUNK_SIZE: usize = 8 * 1024;

/// Maximum number of digits in a chunk size field.
pub const MAX_CHUNK_SIZE_DIGITS: usize = 10;

/// Message framing mode.
///
/// A session starts in `EndOfMessage` and may switch to `Chunked` once,
/// after the hello exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramingMode {
    /// `]]>]]>` terminated messages.
    #[default]
    EndOfMessage,
    /// RFC 6242 chunked framing.
    Chunked,
}

/// Frame a payload for the wire.
///
/// In chunked mode the payload is split into chunks of at most
/// `chunk_size` bytes.
///
/// # Errors
///
/// Returns [`FramingErrorKind::EmptyPayload`] for an empty payload in
/// chunked mode (a chunked message needs at least one chunk).
///
/// # Example
///
/// ```
/// use netconf_engine::protocol::{encode_message, FramingMode};
///
/// let framed = encode_message(b"hello", FramingMode::Chunked, 4096).unwrap();
/// assert_eq!(&framed[..], b"\n#5\nhello\n##\n");
///
/// let framed = encode_message(b"hello", FramingMode::EndOfMessage, 4096).unwrap();
/// assert_eq!(&framed[..], b"hello]]>]]>");
/// ```
pub fn encode_message(
    payload: &[u8],
    mode: FramingMode,
    chunk_size: usize,
) -> Result<Bytes, FramingError> {
    match mode {
        FramingMode::EndOfMessage => {
            let mut buf = BytesMut::with_capacity(payload.len() + EOM_MARKER.len());
            buf.put_slice(payload);
            buf.put_slice(EOM_MARKER);
            Ok(buf.freeze())
        }
        FramingMode::Chunked => {
            if payload.is_empty() {
                return Err(FramingError::new(0, FramingErrorKind::EmptyPayload));
            }
            let chunk_size = chunk_size.clamp(1, ABSOLUTE_MAX_CHUNK_SIZE as usize);
            let chunks = payload.len().div_ceil(chunk_size);
            let mut buf = BytesMut::with_capacity(
                payload.len() + chunks * (MAX_CHUNK_SIZE_DIGITS + 3) + END_OF_CHUNKS.len(),
            );
            for chunk in payload.chunks(chunk_size) {
                encode_chunk_header(chunk.len(), &mut buf);
                buf.put_slice(chunk);
            }
            buf.put_slice(END_OF_CHUNKS);
            Ok(buf.freeze())
        }
    }
}

/// Write a `\n#<len>\n` chunk header.
fn encode_chunk_header(len: usize, buf: &mut BytesMut) {
    buf.put_slice(b"\n#");
    buf.put_slice(len.to_string().as_bytes());
    buf.put_u8(b'\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunked_hello() {
        let framed = encode_message(b"hello", FramingMode::Chunked, 4096).unwrap();
        assert_eq!(&framed[..], b"\n#5\nhello\n##\n");
    }

    #[test]
    fn test_chunked_splits_large_payload() {
        let framed = encode_message(b"abcdefgh", FramingMode::Chunked, 3).unwrap();
        assert_eq!(&framed[..], b"\n#3\nabc\n#3\ndef\n#2\ngh\n##\n");
    }

    #[test]
    fn test_end_of_message() {
        let framed = encode_message(b"<hello/>", FramingMode::EndOfMessage, 0).unwrap();
        assert_eq!(&framed[..], b"<hello/>]]>]]>");
    }

    #[test]
    fn test_chunked_empty_payload_rejected() {
        let err = encode_message(b"", FramingMode::Chunked, 10).unwrap_err();
        assert_eq!(err.kind, FramingErrorKind::EmptyPayload);
    }

    #[test]
    fn test_zero_chunk_size_is_clamped() {
        let framed = encode_message(b"ab", FramingMode::Chunked, 0).unwrap();
        assert_eq!(&framed[..], b"\n#1\na\n#1\nb\n##\n");
    }

    #[test]
    fn test_default_mode() {
        assert_eq!(FramingMode::default(), FramingMode::EndOfMessage);
    }
}
