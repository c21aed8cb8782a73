//! Protocol module - message framing and message envelopes.
//!
//! This module implements the byte-level framing of RFC 6242:
//! - End-of-message framing (`]]>]]>` marker), used for the hello exchange
//!   and for base:1.0 sessions
//! - Chunked framing (`\n#<len>\n...\n##\n`), used once base:1.1 is
//!   negotiated
//! - A message buffer accumulating partial reads for either mode
//! - An async reader yielding one message payload at a time
//! - Envelope helpers for `rpc`, `rpc-reply`, `hello` and `notification`

mod frame_buffer;
mod message;
mod reader;
mod wire_format;

pub use frame_buffer::MessageBuffer;
pub use message::{
    classify, message_id, wrap_rpc, MessageKind, BASE_NAMESPACE, EXI_NAMESPACE,
    NOTIFICATION_NAMESPACE,
};
pub use reader::{MessageReader, DEFAULT_READ_BUFFER_SIZE};
pub use wire_format::{
    encode_message, FramingMode, ABSOLUTE_MAX_CHUNK_SIZE, DEFAULT_MAX_CHUNK_SIZE,
    DEFAULT_OUTBOUND_CHUNK_SIZE, END_OF_CHUNKS, EOM_MARKER, MAX_CHUNK_SIZE_DIGITS,
};
