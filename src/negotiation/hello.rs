//! `<hello>` message builder and parser.
//!
//! ```text
//! <hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
//!   <capabilities>
//!     <capability>urn:ietf:params:netconf:base:1.1</capability>
//!   </capabilities>
//!   <session-id>4</session-id>          (server to client only)
//! </hello>
//! ```

use super::capability::{Capability, CapabilitySet};
use crate::error::{NegotiationError, TreeError};
use crate::protocol::{classify, MessageKind, BASE_NAMESPACE};
use crate::tree::Node;

/// Parsed content of a peer hello.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMessage {
    /// Capabilities offered by the peer.
    pub capabilities: CapabilitySet,
    /// Session id, present only in server hellos.
    pub session_id: Option<u32>,
}

/// Build a hello message.
pub fn build_hello(
    capabilities: &CapabilitySet,
    session_id: Option<u32>,
) -> Result<Node, TreeError> {
    let caps = Node::builder_ns(BASE_NAMESPACE, "capabilities")
        .children(
            capabilities
                .iter()
                .map(|c| Node::leaf_ns(BASE_NAMESPACE, "capability", c.uri())),
        )
        .build()?;

    let mut hello = Node::builder_ns(BASE_NAMESPACE, "hello").child(caps);
    if let Some(id) = session_id {
        hello = hello.child(Node::leaf_ns(BASE_NAMESPACE, "session-id", id.to_string()));
    }
    hello.build()
}

/// Parse and validate a peer hello.
///
/// # Errors
///
/// - [`NegotiationError::MalformedHello`] if the root is not a hello, the
///   capabilities element is missing, or the session id is not a positive
///   integer.
/// - [`NegotiationError::NoCapabilities`] if no capability is offered.
pub fn parse_hello(hello: &Node) -> Result<HelloMessage, NegotiationError> {
    if classify(hello) != MessageKind::Hello {
        return Err(NegotiationError::MalformedHello(format!(
            "expected <hello>, got <{}>",
            hello.local_name()
        )));
    }

    let caps_node = hello.child("capabilities").ok_or_else(|| {
        NegotiationError::MalformedHello("missing <capabilities> element".to_string())
    })?;

    let capabilities: CapabilitySet = caps_node
        .children_named("capability")
        .filter_map(Node::text)
        .map(|uri| Capability::new(uri.trim()))
        .filter(|c| !c.uri().is_empty())
        .collect();
    if capabilities.is_empty() {
        return Err(NegotiationError::NoCapabilities);
    }

    let session_id = match hello.child("session-id") {
        None => None,
        Some(node) => {
            let id = node
                .text()
                .and_then(|t| t.trim().parse::<u32>().ok())
                .filter(|id| *id > 0)
                .ok_or(NegotiationError::MissingSessionId)?;
            Some(id)
        }
    };

    Ok(HelloMessage {
        capabilities,
        session_id,
    })
}
