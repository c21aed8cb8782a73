//! Error types for netconf-engine.
//!
//! Errors fall in two groups:
//! - **Fatal** to the session: [`FramingError`], [`NegotiationError`] and
//!   reply correlation mismatches. They fail every pending request and end
//!   the session.
//! - **Local**: payload parse errors, [`TreeError`] and [`FilterError`]. They
//!   are reported to the immediate caller only.

use thiserror::Error;

/// Main error type for all engine operations.
#[derive(Debug, Error)]
pub enum NetconfError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed framing on the byte stream.
    #[error(transparent)]
    Framing(#[from] FramingError),

    /// Payload could not be parsed into a node tree.
    #[error("Payload parse error: {0}")]
    Parse(String),

    /// Node tree construction error.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// Hello exchange failed.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// Reply message-id does not match the request awaiting a reply.
    #[error("Reply message-id {received:?} does not match in-flight request {expected:?}")]
    Correlation {
        /// Message-id of the in-flight request.
        expected: String,
        /// Message-id carried by the reply, if any.
        received: Option<String>,
    },

    /// Subtree filter could not be evaluated.
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// The session ended before the operation completed.
    #[error("Session terminated: {0}")]
    SessionTerminated(TerminationCause),

    /// The request was cancelled before it reached the wire.
    #[error("Request cancelled before transmission")]
    Cancelled,

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Backpressure timeout - write queue full.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// Write queue full on a non-waiting send.
    #[error("Write queue full")]
    QueueFull,

    /// Protocol violation not covered by a more specific kind.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl NetconfError {
    /// Returns `true` if this error must tear the session down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NetconfError::Io(_)
                | NetconfError::Framing(_)
                | NetconfError::Negotiation(_)
                | NetconfError::Correlation { .. }
                | NetconfError::ConnectionClosed
        )
    }
}

/// Result type alias using NetconfError.
pub type Result<T> = std::result::Result<T, NetconfError>;

/// Framing violation at a given absolute stream offset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Framing error at byte {offset}: {kind}")]
pub struct FramingError {
    /// Offset of the offending byte from the start of the stream.
    pub offset: u64,
    /// What went wrong.
    pub kind: FramingErrorKind,
}

impl FramingError {
    pub(crate) fn new(offset: u64, kind: FramingErrorKind) -> Self {
        Self { offset, kind }
    }
}

/// Kinds of framing violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingErrorKind {
    /// Chunk header did not start with `\n#`.
    #[error("malformed chunk header")]
    MalformedChunkHeader,
    /// Chunk size field is not a valid decimal number.
    #[error("invalid chunk size")]
    InvalidChunkSize,
    /// Chunk size of zero.
    #[error("zero-length chunk")]
    ZeroChunk,
    /// Chunk size above the configured maximum.
    #[error("chunk size {size} exceeds maximum {max}")]
    OversizedChunk {
        /// Declared chunk size.
        size: u64,
        /// Configured limit.
        max: u32,
    },
    /// End-of-chunks marker with no preceding chunk.
    #[error("chunked message without chunks")]
    EmptyMessage,
    /// End-of-chunks marker not followed by a newline.
    #[error("malformed end-of-chunks marker")]
    MalformedEndOfChunks,
    /// Attempt to leave chunked framing once it was selected.
    #[error("framing cannot be downgraded after switching to chunked")]
    ModeDowngrade,
    /// Attempt to encode an empty payload in chunked framing.
    #[error("cannot frame an empty payload")]
    EmptyPayload,
}

/// Node tree construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// A node was given both a text value and child nodes.
    #[error("node {0} has both text and children")]
    MixedContent(String),
    /// The same attribute name appears twice on one node.
    #[error("duplicate attribute {attribute} on node {node}")]
    DuplicateAttribute {
        /// Node local name.
        node: String,
        /// Attribute local name.
        attribute: String,
    },
}

/// Hello exchange failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// The peer message is not a hello.
    #[error("malformed hello: {0}")]
    MalformedHello(String),
    /// The peer offered no capabilities.
    #[error("hello carries no capabilities")]
    NoCapabilities,
    /// Neither base:1.0 nor base:1.1 is shared by both sides.
    #[error("no common base capability")]
    MissingBaseCapability,
    /// Capability intersection is empty.
    #[error("no common capabilities")]
    EmptyIntersection,
    /// Server hello did not carry a valid session id.
    #[error("missing or invalid session-id in server hello")]
    MissingSessionId,
    /// Client hello carried a session id.
    #[error("unexpected session-id in client hello")]
    UnexpectedSessionId,
    /// No session id could be allocated.
    #[error("session id space exhausted")]
    SessionIdsExhausted,
    /// Operation not valid in the current negotiator state.
    #[error("invalid negotiator state: {0}")]
    InvalidState(&'static str),
    /// The transport closed before the peer hello arrived.
    #[error("connection closed during hello exchange")]
    ConnectionClosed,
}

/// Subtree filter evaluation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// A filter node name is not a well-formed qualified name.
    #[error("ill-formed qualified name {0:?}")]
    IllFormedName(String),
    /// The filter root carries a text value.
    #[error("filter root {0} must not carry text")]
    TextOnFilterRoot(String),
}

/// Why a session ended. Cloned into every failed pending request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TerminationCause {
    /// The peer closed the transport.
    #[error("connection closed by peer")]
    PeerClosed,
    /// The local side closed the session.
    #[error("session closed locally")]
    LocalClose,
    /// Framing violation on the inbound stream.
    #[error("framing error: {0}")]
    Framing(String),
    /// Reply did not match the in-flight request.
    #[error("correlation error: {0}")]
    Correlation(String),
    /// Transport I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<&NetconfError> for TerminationCause {
    fn from(err: &NetconfError) -> Self {
        match err {
            NetconfError::Framing(e) => TerminationCause::Framing(e.to_string()),
            NetconfError::Correlation { .. } => TerminationCause::Correlation(err.to_string()),
            NetconfError::SessionTerminated(cause) => cause.clone(),
            NetconfError::ConnectionClosed => TerminationCause::PeerClosed,
            other => TerminationCause::Io(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let framing = NetconfError::from(FramingError::new(3, FramingErrorKind::ZeroChunk));
        assert!(framing.is_fatal());
        assert!(NetconfError::from(NegotiationError::NoCapabilities).is_fatal());
        assert!(NetconfError::Correlation {
            expected: "1".into(),
            received: None
        }
        .is_fatal());

        assert!(!NetconfError::from(FilterError::IllFormedName(String::new())).is_fatal());
        assert!(!NetconfError::Parse("bad".into()).is_fatal());
        assert!(!NetconfError::Cancelled.is_fatal());
    }

    #[test]
    fn test_framing_error_carries_offset() {
        let err = FramingError::new(
            42,
            FramingErrorKind::OversizedChunk { size: 10, max: 5 },
        );
        let msg = err.to_string();
        assert!(msg.contains("42"));
        assert!(msg.contains("exceeds maximum 5"));
    }

    #[test]
    fn test_termination_cause_from_error() {
        let err = NetconfError::from(FramingError::new(0, FramingErrorKind::ZeroChunk));
        assert!(matches!(
            TerminationCause::from(&err),
            TerminationCause::Framing(_)
        ));
        assert_eq!(
            TerminationCause::from(&NetconfError::ConnectionClosed),
            TerminationCause::PeerClosed
        );
    }
}
