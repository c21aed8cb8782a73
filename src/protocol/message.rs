//! Message envelopes: classification and `rpc` wrapping.

use crate::error::TreeError;
use crate::tree::Node;

/// NETCONF base namespace.
pub const BASE_NAMESPACE: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// RFC 5277 notification namespace.
pub const NOTIFICATION_NAMESPACE: &str = "urn:ietf:params:xml:ns:netconf:notification:1.0";

/// EXI capability namespace.
pub const EXI_NAMESPACE: &str = "urn:ietf:params:xml:ns:netconf:exi:1.0";

/// Top-level message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `<hello>`
    Hello,
    /// `<rpc>` request.
    Rpc,
    /// `<rpc-reply>` to a request.
    RpcReply,
    /// `<notification>` (RFC 5277).
    Notification,
    /// Anything else.
    Other,
}

/// Classify a decoded message by its root element.
///
/// The root must be in its expected namespace, or carry none.
pub fn classify(message: &Node) -> MessageKind {
    let ns = message.namespace();
    let in_ns = |expected: &str| ns.is_empty() || ns == expected;

    match message.local_name() {
        "hello" if in_ns(BASE_NAMESPACE) => MessageKind::Hello,
        "rpc" if in_ns(BASE_NAMESPACE) => MessageKind::Rpc,
        "rpc-reply" if in_ns(BASE_NAMESPACE) => MessageKind::RpcReply,
        "notification" if in_ns(NOTIFICATION_NAMESPACE) => MessageKind::Notification,
        _ => MessageKind::Other,
    }
}

/// The `message-id` attribute of an `rpc` or `rpc-reply`.
pub fn message_id(message: &Node) -> Option<&str> {
    message.attribute("message-id")
}

/// Wrap an operation into `<rpc message-id="...">`.
pub fn wrap_rpc(message_id: &str, operation: Node) -> Result<Node, TreeError> {
    Node::builder_ns(BASE_NAMESPACE, "rpc")
        .attribute("message-id", message_id)
        .child(operation)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let reply = Node::empty_ns(BASE_NAMESPACE, "rpc-reply");
        assert_eq!(classify(&reply), MessageKind::RpcReply);

        let notification = Node::empty_ns(NOTIFICATION_NAMESPACE, "notification");
        assert_eq!(classify(&notification), MessageKind::Notification);

        let bare = Node::empty_ns("", "hello");
        assert_eq!(classify(&bare), MessageKind::Hello);

        let foreign = Node::empty_ns("urn:other", "rpc-reply");
        assert_eq!(classify(&foreign), MessageKind::Other);
    }

    #[test]
    fn test_wrap_rpc() {
        let rpc = wrap_rpc("7", Node::empty_ns(BASE_NAMESPACE, "get")).unwrap();
        assert_eq!(classify(&rpc), MessageKind::Rpc);
        assert_eq!(message_id(&rpc), Some("7"));
        assert_eq!(rpc.children()[0].local_name(), "get");
    }
}
