//! `<rpc-reply>` parsing.

use std::fmt;

use crate::error::{NetconfError, Result};
use crate::protocol::{classify, message_id, MessageKind, BASE_NAMESPACE};
use crate::tree::Node;

/// Severity of an `<rpc-error>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// `error`
    Error,
    /// `warning`
    Warning,
}

/// One `<rpc-error>` of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    /// `error-type`: transport, rpc, protocol or application.
    pub error_type: String,
    /// `error-tag`, e.g. `lock-denied`.
    pub tag: String,
    /// `error-severity`.
    pub severity: ErrorSeverity,
    /// `error-app-tag`, if present.
    pub app_tag: Option<String>,
    /// `error-path`, if present.
    pub path: Option<String>,
    /// `error-message`, if present.
    pub message: Option<String>,
}

impl ErrorSeverity {
    fn as_str(self) -> &'static str {
        match self {
            ErrorSeverity::Error => "error",
            ErrorSeverity::Warning => "warning",
        }
    }
}

impl RpcError {
    /// An error of severity `error` with no optional fields.
    pub fn new(error_type: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            tag: tag.into(),
            severity: ErrorSeverity::Error,
            app_tag: None,
            path: None,
            message: None,
        }
    }

    /// Set the human-readable message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// The `<rpc-error>` element.
    pub fn to_node(&self) -> Node {
        let leaf = |name: &str, value: &str| Node::leaf_ns(BASE_NAMESPACE, name, value);
        let mut children = vec![
            leaf("error-type", &self.error_type),
            leaf("error-tag", &self.tag),
            leaf("error-severity", self.severity.as_str()),
        ];
        if let Some(app_tag) = &self.app_tag {
            children.push(leaf("error-app-tag", app_tag));
        }
        if let Some(path) = &self.path {
            children.push(leaf("error-path", path));
        }
        if let Some(message) = &self.message {
            children.push(leaf("error-message", message));
        }
        Node::empty_ns(BASE_NAMESPACE, "rpc-error").with_children(children)
    }

    fn from_node(node: &Node) -> Self {
        // Servers commonly pretty-print error content.
        let field = |name: &str| {
            node.child(name)
                .and_then(Node::text)
                .map(|t| t.trim().to_string())
        };
        let severity = match node.child("error-severity").and_then(Node::text).map(str::trim) {
            Some("warning") => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        };
        Self {
            error_type: field("error-type").unwrap_or_default(),
            tag: field("error-tag").unwrap_or_default(),
            severity,
            app_tag: field("error-app-tag"),
            path: field("error-path"),
            message: field("error-message"),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error {}", self.error_type, self.tag)?;
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

/// A parsed `<rpc-reply>`.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcReply {
    node: Node,
    errors: Vec<RpcError>,
}

impl RpcReply {
    /// Parse a reply message.
    ///
    /// # Errors
    ///
    /// Returns [`NetconfError::Protocol`] if the node is not an
    /// `<rpc-reply>`.
    pub fn from_node(node: Node) -> Result<Self> {
        if classify(&node) != MessageKind::RpcReply {
            return Err(NetconfError::Protocol(format!(
                "expected <rpc-reply>, got <{}>",
                node.local_name()
            )));
        }
        let errors = node
            .children_named("rpc-error")
            .map(RpcError::from_node)
            .collect();
        Ok(Self { node, errors })
    }

    /// The `message-id` attribute.
    pub fn message_id(&self) -> Option<&str> {
        message_id(&self.node)
    }

    /// Check if the reply is `<ok/>`.
    pub fn is_ok(&self) -> bool {
        self.node.child("ok").is_some()
    }

    /// The `<data>` element, if any.
    pub fn data(&self) -> Option<&Node> {
        self.node.child("data")
    }

    /// All `<rpc-error>` entries, warnings included.
    pub fn errors(&self) -> &[RpcError] {
        &self.errors
    }

    /// Check if any `<rpc-error>` has severity `error`.
    pub fn has_errors(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.severity == ErrorSeverity::Error)
    }

    /// The whole reply element.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Consume the reply, returning the reply element.
    pub fn into_node(self) -> Node {
        self.node
    }
}

/// `<rpc-reply>` to `request` carrying `content`, or `<ok/>` when empty.
///
/// All attributes of the request, `message-id` included, are copied.
pub fn build_reply(request: &Node, content: Vec<Node>) -> Node {
    let content = if content.is_empty() {
        vec![Node::empty_ns(BASE_NAMESPACE, "ok")]
    } else {
        content
    };
    Node::empty_ns(BASE_NAMESPACE, "rpc-reply")
        .with_children(content)
        .with_attributes_of(request)
}

/// `<rpc-reply>` to `request` with a `<data>` element holding `data`.
pub fn build_data_reply(request: &Node, data: Vec<Node>) -> Node {
    build_reply(
        request,
        vec![Node::empty_ns(BASE_NAMESPACE, "data").with_children(data)],
    )
}

/// `<rpc-reply>` to `request` listing `errors`.
pub fn build_error_reply(request: &Node, errors: &[RpcError]) -> Node {
    build_reply(request, errors.iter().map(RpcError::to_node).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::XmlCodec;

    #[test]
    fn test_ok_reply() {
        let reply = RpcReply::from_node(
            XmlCodec::from_xml_str(
                r#"<rpc-reply message-id="101" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><ok/></rpc-reply>"#,
            )
            .unwrap(),
        )
        .unwrap();

        assert!(reply.is_ok());
        assert!(!reply.has_errors());
        assert_eq!(reply.message_id(), Some("101"));
        assert!(reply.data().is_none());
    }

    #[test]
    fn test_data_reply() {
        let reply = RpcReply::from_node(
            XmlCodec::from_xml_str(
                r#"<rpc-reply message-id="2" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
                     <data><top xmlns="urn:example"><a>1</a></top></data>
                   </rpc-reply>"#,
            )
            .unwrap(),
        )
        .unwrap();

        let data = reply.data().unwrap();
        assert_eq!(data.children()[0].local_name(), "top");
        assert!(!reply.is_ok());
    }

    #[test]
    fn test_error_reply() {
        let reply = RpcReply::from_node(
            XmlCodec::from_xml_str(
                r#"<rpc-reply message-id="3" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
                     <rpc-error>
                       <error-type>protocol</error-type>
                       <error-tag>lock-denied</error-tag>
                       <error-severity>error</error-severity>
                       <error-message>Lock held by session 4</error-message>
                     </rpc-error>
                     <rpc-error>
                       <error-type>application</error-type>
                       <error-tag>operation-failed</error-tag>
                       <error-severity>warning</error-severity>
                       <error-path>/top/a</error-path>
                     </rpc-error>
                   </rpc-reply>"#,
            )
            .unwrap(),
        )
        .unwrap();

        assert!(reply.has_errors());
        let errors = reply.errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].tag, "lock-denied");
        assert_eq!(errors[0].message.as_deref(), Some("Lock held by session 4"));
        assert_eq!(errors[1].severity, ErrorSeverity::Warning);
        assert_eq!(errors[1].path.as_deref(), Some("/top/a"));
        assert_eq!(errors[0].to_string(), "protocol error lock-denied: Lock held by session 4");
    }

    #[test]
    fn test_built_replies_parse() {
        let request = crate::protocol::wrap_rpc("17", Node::empty_ns(BASE_NAMESPACE, "get")).unwrap();

        let ok = RpcReply::from_node(build_reply(&request, Vec::new())).unwrap();
        assert!(ok.is_ok());
        assert_eq!(ok.message_id(), Some("17"));

        let data = RpcReply::from_node(build_data_reply(&request, vec![Node::leaf("a", "1")])).unwrap();
        assert_eq!(data.data().and_then(|d| d.child("a")).and_then(Node::text), Some("1"));

        let error = RpcError::new("protocol", "in-use").with_message("busy");
        let failed = RpcReply::from_node(build_error_reply(&request, &[error.clone()])).unwrap();
        assert_eq!(failed.errors(), &[error]);
    }

    #[test]
    fn test_not_a_reply() {
        let err = RpcReply::from_node(Node::empty_ns("", "notification")).unwrap_err();
        assert!(matches!(err, NetconfError::Protocol(_)));
    }
}
