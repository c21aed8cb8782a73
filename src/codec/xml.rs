//! XML codec using `roxmltree` for parsing.
//!
//! Encoding writes a default `xmlns` declaration wherever an element's
//! namespace differs from its parent's; namespaced attributes get generated
//! `a0`, `a1`, ... prefixes. Decoding ignores comments, processing
//! instructions and whitespace-only text between elements. Leaf text is
//! kept verbatim. Non-whitespace text next to child elements is rejected.

use bytes::Bytes;

use crate::error::{NetconfError, Result};
use crate::tree::{Body, Node};

/// Namespace bound to the reserved `xml` prefix.
const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// XML codec for node trees.
pub struct XmlCodec;

impl XmlCodec {
    /// Encode a node tree to UTF-8 XML bytes.
    pub fn encode(node: &Node) -> Bytes {
        Bytes::from(Self::to_xml_string(node))
    }

    /// Encode a node tree to an XML string.
    pub fn to_xml_string(node: &Node) -> String {
        let mut out = String::with_capacity(256);
        write_element(&mut out, node, "");
        out
    }

    /// Decode UTF-8 XML bytes into a node tree.
    ///
    /// # Errors
    ///
    /// Returns [`NetconfError::Parse`] for invalid UTF-8, malformed XML or
    /// mixed content.
    pub fn decode(bytes: &[u8]) -> Result<Node> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| NetconfError::Parse(format!("payload is not UTF-8: {}", e)))?;
        Self::from_xml_str(text)
    }

    /// Decode an XML string into a node tree.
    pub fn from_xml_str(text: &str) -> Result<Node> {
        let doc = roxmltree::Document::parse(text)
            .map_err(|e| NetconfError::Parse(e.to_string()))?;
        convert_element(doc.root_element())
    }
}

fn convert_element(element: roxmltree::Node<'_, '_>) -> Result<Node> {
    let tag = element.tag_name();
    let mut builder = Node::builder_ns(tag.namespace().unwrap_or(""), tag.name());

    for attr in element.attributes() {
        builder = builder.attribute_ns(attr.namespace().unwrap_or(""), attr.name(), attr.value());
    }

    let mut text = String::new();
    let mut has_children = false;
    for child in element.children() {
        if child.is_element() {
            builder = builder.child(convert_element(child)?);
            has_children = true;
        } else if child.is_text() {
            text.push_str(child.text().unwrap_or(""));
        }
    }

    if has_children {
        if !text.trim().is_empty() {
            return Err(NetconfError::Parse(format!(
                "element <{}> mixes text and child elements",
                tag.name()
            )));
        }
    } else {
        builder = builder.text(text);
    }

    Ok(builder.build()?)
}

fn write_element(out: &mut String, node: &Node, parent_namespace: &str) {
    out.push('<');
    out.push_str(node.local_name());

    if node.namespace() != parent_namespace {
        out.push_str(" xmlns=\"");
        escape_into(out, node.namespace(), true);
        out.push('"');
    }

    // Prefixes for namespaced attributes, scoped to this element.
    let mut prefixes: Vec<&str> = Vec::new();
    for (name, _) in node.attributes() {
        let ns = name.namespace();
        if !ns.is_empty() && ns != XML_NAMESPACE && !prefixes.contains(&ns) {
            out.push_str(&format!(" xmlns:a{}=\"", prefixes.len()));
            escape_into(out, ns, true);
            out.push('"');
            prefixes.push(ns);
        }
    }

    for (name, value) in node.attributes() {
        out.push(' ');
        let ns = name.namespace();
        if ns == XML_NAMESPACE {
            out.push_str("xml:");
        } else if let Some(idx) = prefixes.iter().position(|p| *p == ns) {
            out.push_str(&format!("a{}:", idx));
        }
        out.push_str(name.local_name());
        out.push_str("=\"");
        escape_into(out, value, true);
        out.push('"');
    }

    match node.body() {
        Body::Leaf(None) => out.push_str("/>"),
        Body::Leaf(Some(text)) => {
            out.push('>');
            escape_into(out, text, false);
            close_tag(out, node);
        }
        Body::Container(children) => {
            out.push('>');
            for child in children {
                write_element(out, child, node.namespace());
            }
            close_tag(out, node);
        }
    }
}

fn close_tag(out: &mut String, node: &Node) {
    out.push_str("</");
    out.push_str(node.local_name());
    out.push('>');
}

fn escape_into(out: &mut String, value: &str, attribute: bool) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\n' if attribute => out.push_str("&#10;"),
            '\t' if attribute => out.push_str("&#9;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
}
