//! Node, qualified names and the node builder.

use std::fmt;

use crate::error::TreeError;

/// Qualified name: namespace URI plus local name.
///
/// An empty namespace is used for synthetic roots and for filter nodes that
/// match a local name in any namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    namespace: String,
    local: String,
}

impl QName {
    /// Create a qualified name.
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    /// Create a name without namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self::new(String::new(), local)
    }

    /// Namespace URI (may be empty).
    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Local name.
    #[inline]
    pub fn local_name(&self) -> &str {
        &self.local
    }

    /// Check if the namespace is empty.
    #[inline]
    pub fn has_namespace(&self) -> bool {
        !self.namespace.is_empty()
    }

    /// Check if this name, used as a pattern, matches `other`.
    ///
    /// An empty namespace on the pattern matches any namespace.
    pub fn matches(&self, other: &QName) -> bool {
        self.local == other.local && (self.namespace.is_empty() || self.namespace == other.namespace)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

/// Content of a node: either a leaf value or a non-empty child list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Leaf with optional scalar text.
    Leaf(Option<String>),
    /// Container with at least one child.
    Container(Vec<Node>),
}

/// Immutable tree node.
#[derive(Debug, Clone, Eq)]
pub struct Node {
    name: QName,
    attributes: Vec<(QName, String)>,
    body: Body,
}

impl Node {
    /// Start building a node without namespace.
    pub fn builder(local: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(QName::local(local))
    }

    /// Start building a node in the given namespace.
    pub fn builder_ns(namespace: impl Into<String>, local: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(QName::new(namespace, local))
    }

    /// Leaf with a text value, no namespace.
    pub fn leaf(local: impl Into<String>, text: impl Into<String>) -> Self {
        Self::leaf_ns(String::new(), local, text)
    }

    /// Leaf with a text value in the given namespace.
    ///
    /// Empty text is stored as no text.
    pub fn leaf_ns(
        namespace: impl Into<String>,
        local: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            name: QName::new(namespace, local),
            attributes: Vec::new(),
            body: Body::Leaf(non_empty(text.into())),
        }
    }

    /// Empty leaf (no text, no children) in the given namespace.
    pub fn empty_ns(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            name: QName::new(namespace, local),
            attributes: Vec::new(),
            body: Body::Leaf(None),
        }
    }

    /// Qualified name.
    #[inline]
    pub fn name(&self) -> &QName {
        &self.name
    }

    /// Local name.
    #[inline]
    pub fn local_name(&self) -> &str {
        self.name.local_name()
    }

    /// Namespace URI.
    #[inline]
    pub fn namespace(&self) -> &str {
        self.name.namespace()
    }

    /// Node body.
    #[inline]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Attributes in insertion order.
    pub fn attributes(&self) -> impl Iterator<Item = (&QName, &str)> {
        self.attributes.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// Check if the node carries attributes.
    #[inline]
    pub fn has_attributes(&self) -> bool {
        !self.attributes.is_empty()
    }

    /// Attribute value by local name, ignoring its namespace.
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.local_name() == local)
            .map(|(_, v)| v.as_str())
    }

    /// Children (empty for leaves).
    pub fn children(&self) -> &[Node] {
        match &self.body {
            Body::Container(children) => children,
            Body::Leaf(_) => &[],
        }
    }

    /// First child with the given local name.
    pub fn child(&self, local: &str) -> Option<&Node> {
        self.children().iter().find(|c| c.local_name() == local)
    }

    /// All children with the given local name.
    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children().iter().filter(move |c| c.local_name() == local)
    }

    /// Text value (only leaves have one).
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            Body::Leaf(text) => text.as_deref(),
            Body::Container(_) => None,
        }
    }

    /// Check if this node has no children.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.body, Body::Leaf(_))
    }

    /// Check if this node has children.
    #[inline]
    pub fn is_container(&self) -> bool {
        matches!(self.body, Body::Container(_))
    }

    /// Copy of this node keeping name and attributes but replacing children.
    ///
    /// An empty child list yields an empty leaf.
    pub(crate) fn with_children(&self, children: Vec<Node>) -> Node {
        let body = if children.is_empty() {
            Body::Leaf(None)
        } else {
            Body::Container(children)
        };
        Node {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            body,
        }
    }

    /// Copy of this node carrying the attributes of `other` instead of its own.
    pub(crate) fn with_attributes_of(mut self, other: &Node) -> Node {
        self.attributes = other.attributes.clone();
        self
    }

    /// Set an unqualified attribute, replacing any previous value.
    pub(crate) fn with_attribute(mut self, local: &str, value: impl Into<String>) -> Node {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|(name, _)| !name.has_namespace() && name.local_name() == local)
        {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((QName::local(local), value)),
        }
        self
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        // Attribute order is irrelevant, names are unique per node.
        self.name == other.name
            && self.body == other.body
            && self.attributes.len() == other.attributes.len()
            && self
                .attributes
                .iter()
                .all(|attr| other.attributes.contains(attr))
    }
}

/// Builder for [`Node`].
///
/// Validates the leaf-xor-container invariant and attribute uniqueness in
/// [`build`](NodeBuilder::build).
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    name: QName,
    attributes: Vec<(QName, String)>,
    children: Vec<Node>,
    text: Option<String>,
}

impl NodeBuilder {
    fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// Set the namespace of the node being built.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.name = QName::new(namespace, self.name.local);
        self
    }

    /// Add an attribute without namespace.
    pub fn attribute(self, local: impl Into<String>, value: impl Into<String>) -> Self {
        self.attribute_ns(String::new(), local, value)
    }

    /// Add a namespaced attribute.
    pub fn attribute_ns(
        mut self,
        namespace: impl Into<String>,
        local: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes
            .push((QName::new(namespace, local), value.into()));
        self
    }

    /// Append a child node.
    pub fn child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Append several child nodes.
    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    /// Set the text value. Empty text leaves the node without text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = non_empty(text.into());
        self
    }

    /// Finish the node.
    ///
    /// # Errors
    ///
    /// - [`TreeError::MixedContent`] if both text and children were given.
    /// - [`TreeError::DuplicateAttribute`] if an attribute name repeats.
    pub fn build(self) -> Result<Node, TreeError> {
        for (i, (name, _)) in self.attributes.iter().enumerate() {
            if self.attributes[..i].iter().any(|(other, _)| other == name) {
                return Err(TreeError::DuplicateAttribute {
                    node: self.name.local_name().to_string(),
                    attribute: name.local_name().to_string(),
                });
            }
        }

        let body = match (self.text, self.children.is_empty()) {
            (Some(_), false) => {
                return Err(TreeError::MixedContent(self.name.to_string()));
            }
            (text, true) => Body::Leaf(text),
            (None, false) => Body::Container(self.children),
        };

        Ok(Node {
            name: self.name,
            attributes: self.attributes,
            body,
        })
    }
}

/// `<x></x>` and `<x/>` are the same element on the wire.
fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
