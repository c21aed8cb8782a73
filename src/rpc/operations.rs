//! Builders for the base protocol operations.
//!
//! Each function returns the operation element only; the correlator wraps
//! it into `<rpc message-id="...">` on submit.
//!
//! ```
//! use netconf_engine::rpc::operations::{self, Datastore};
//!
//! let op = operations::lock(Datastore::Candidate);
//! assert_eq!(op.local_name(), "lock");
//! assert!(op.child("target").and_then(|t| t.child("candidate")).is_some());
//! ```

use std::fmt;

use crate::protocol::{BASE_NAMESPACE, EXI_NAMESPACE, NOTIFICATION_NAMESPACE};
use crate::tree::Node;

/// Configuration datastores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datastore {
    /// `<running/>`
    Running,
    /// `<candidate/>` (candidate capability)
    Candidate,
    /// `<startup/>` (startup capability)
    Startup,
}

impl Datastore {
    /// Element name of the datastore.
    pub fn as_str(self) -> &'static str {
        match self {
            Datastore::Running => "running",
            Datastore::Candidate => "candidate",
            Datastore::Startup => "startup",
        }
    }
}

impl fmt::Display for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `default-operation` of an `edit-config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DefaultOperation {
    /// Merge the configuration (protocol default).
    #[default]
    Merge,
    /// Replace the target configuration.
    Replace,
    /// Only apply explicit operation attributes.
    None,
}

impl DefaultOperation {
    fn as_str(self) -> &'static str {
        match self {
            DefaultOperation::Merge => "merge",
            DefaultOperation::Replace => "replace",
            DefaultOperation::None => "none",
        }
    }
}

/// Source of a `copy-config` or `validate`.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// A datastore.
    Datastore(Datastore),
    /// Inline configuration; the node's children are the config content.
    Config(Node),
}

fn element(local: &str, children: Vec<Node>) -> Node {
    Node::empty_ns(BASE_NAMESPACE, local).with_children(children)
}

fn datastore_ref(wrapper: &str, datastore: Datastore) -> Node {
    element(wrapper, vec![Node::empty_ns(BASE_NAMESPACE, datastore.as_str())])
}

fn source_ref(source: &Source) -> Node {
    match source {
        Source::Datastore(ds) => datastore_ref("source", *ds),
        Source::Config(config) => element(
            "source",
            vec![element("config", config.children().to_vec())],
        ),
    }
}

/// `<filter type="subtree">` in `namespace` with the children of `filter`.
fn subtree_filter(namespace: &str, filter: &Node) -> Node {
    Node::empty_ns(namespace, "filter")
        .with_children(filter.children().to_vec())
        .with_attribute("type", "subtree")
}

/// `<get>` with an optional subtree filter.
///
/// The filter node is an envelope: its children become the filter content.
pub fn get(filter: Option<&Node>) -> Node {
    element("get", filter.map(|f| subtree_filter(BASE_NAMESPACE, f)).into_iter().collect())
}

/// `<get-config>` from `source` with an optional subtree filter.
pub fn get_config(source: Datastore, filter: Option<&Node>) -> Node {
    let mut children = vec![datastore_ref("source", source)];
    children.extend(filter.map(|f| subtree_filter(BASE_NAMESPACE, f)));
    element("get-config", children)
}

/// `<edit-config>` applying the children of `config` to `target`.
pub fn edit_config(target: Datastore, config: &Node, default_operation: DefaultOperation) -> Node {
    let mut children = vec![datastore_ref("target", target)];
    if default_operation != DefaultOperation::Merge {
        children.push(Node::leaf_ns(
            BASE_NAMESPACE,
            "default-operation",
            default_operation.as_str(),
        ));
    }
    children.push(element("config", config.children().to_vec()));
    element("edit-config", children)
}

/// `<copy-config>`
pub fn copy_config(target: Datastore, source: &Source) -> Node {
    element(
        "copy-config",
        vec![datastore_ref("target", target), source_ref(source)],
    )
}

/// `<delete-config>`
pub fn delete_config(target: Datastore) -> Node {
    element("delete-config", vec![datastore_ref("target", target)])
}

/// `<lock>`
pub fn lock(target: Datastore) -> Node {
    element("lock", vec![datastore_ref("target", target)])
}

/// `<unlock>`
pub fn unlock(target: Datastore) -> Node {
    element("unlock", vec![datastore_ref("target", target)])
}

/// `<commit/>`
pub fn commit() -> Node {
    Node::empty_ns(BASE_NAMESPACE, "commit")
}

/// `<discard-changes/>`
pub fn discard_changes() -> Node {
    Node::empty_ns(BASE_NAMESPACE, "discard-changes")
}

/// `<validate>`
pub fn validate(source: &Source) -> Node {
    element("validate", vec![source_ref(source)])
}

/// `<close-session/>`
pub fn close_session() -> Node {
    Node::empty_ns(BASE_NAMESPACE, "close-session")
}

/// `<kill-session>`
pub fn kill_session(session_id: u32) -> Node {
    element(
        "kill-session",
        vec![Node::leaf_ns(BASE_NAMESPACE, "session-id", session_id.to_string())],
    )
}

/// RFC 5277 `<create-subscription>` for `stream` (default `NETCONF`),
/// with an optional subtree filter.
pub fn create_subscription(stream: Option<&str>, filter: Option<&Node>) -> Node {
    let mut children = Vec::new();
    if let Some(stream) = stream {
        children.push(Node::leaf_ns(NOTIFICATION_NAMESPACE, "stream", stream));
    }
    children.extend(filter.map(|f| subtree_filter(NOTIFICATION_NAMESPACE, f)));
    Node::empty_ns(NOTIFICATION_NAMESPACE, "create-subscription").with_children(children)
}

/// `<start-exi>` with byte-aligned alignment.
pub fn start_exi() -> Node {
    Node::empty_ns(EXI_NAMESPACE, "start-exi").with_children(vec![Node::leaf_ns(
        EXI_NAMESPACE,
        "alignment",
        "byte-aligned",
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::XmlCodec;

    #[test]
    fn test_get_with_filter() {
        let filter = Node::builder("filter")
            .child(Node::empty_ns("urn:example", "users"))
            .build()
            .unwrap();
        let op = get(Some(&filter));

        let f = op.child("filter").unwrap();
        assert_eq!(f.attribute("type"), Some("subtree"));
        assert_eq!(f.children()[0].local_name(), "users");
        assert_eq!(f.namespace(), BASE_NAMESPACE);
    }

    #[test]
    fn test_get_without_filter() {
        assert!(get(None).is_leaf());
    }

    #[test]
    fn test_edit_config_xml() {
        let config = Node::builder("config")
            .child(Node::leaf_ns("urn:example", "hostname", "r1"))
            .build()
            .unwrap();
        let op = edit_config(Datastore::Running, &config, DefaultOperation::Replace);

        assert_eq!(
            XmlCodec::to_xml_string(&op),
            concat!(
                r#"<edit-config xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">"#,
                "<target><running/></target>",
                "<default-operation>replace</default-operation>",
                r#"<config><hostname xmlns="urn:example">r1</hostname></config>"#,
                "</edit-config>"
            )
        );
    }

    #[test]
    fn test_copy_config_sources() {
        let op = copy_config(Datastore::Startup, &Source::Datastore(Datastore::Running));
        let source = op.child("source").unwrap();
        assert!(source.child("running").is_some());

        let inline = Node::builder("x")
            .child(Node::leaf("a", "1"))
            .build()
            .unwrap();
        let op = validate(&Source::Config(inline));
        let config = op.child("source").and_then(|s| s.child("config")).unwrap();
        assert_eq!(config.child("a").and_then(Node::text), Some("1"));
    }

    #[test]
    fn test_kill_session() {
        let op = kill_session(42);
        assert_eq!(op.child("session-id").and_then(Node::text), Some("42"));
    }

    #[test]
    fn test_create_subscription() {
        let op = create_subscription(Some("NETCONF"), None);
        assert_eq!(op.namespace(), NOTIFICATION_NAMESPACE);
        assert_eq!(op.child("stream").and_then(Node::text), Some("NETCONF"));
        assert!(create_subscription(None, None).is_leaf());
    }

    #[test]
    fn test_start_exi() {
        let op = start_exi();
        assert_eq!(op.child("alignment").and_then(Node::text), Some("byte-aligned"));
    }
}
