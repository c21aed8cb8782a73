//! Subtree filter evaluation (RFC 6241 §6).
//!
//! Both inputs are envelopes: the children of the filter root are matched
//! against the children of the data root, and the result keeps the data
//! root's name and attributes. This fits `<data>` / `<filter>` pairs as
//! well as a list container filtered by a template of the same shape.
//!
//! Evaluation first computes a [`Pick`] tree of selected data children,
//! indexed by position, and only then copies the selected nodes. The
//! existence check used for notification delivery stops after the first
//! step.

use std::collections::BTreeMap;

use crate::error::FilterError;
use crate::tree::{Node, QName};

/// Structural role of a filter node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterNodeKind<'a> {
    /// No attributes, children or text: selects matching data subtrees.
    Selection,
    /// Leaf with text: matching data leaves must carry exactly this text.
    ContentMatch(&'a str),
    /// Children or key attributes: recurse into matching containers.
    Containment,
}

impl<'a> FilterNodeKind<'a> {
    /// Classify a filter node.
    pub fn of(node: &'a Node) -> Self {
        if let Some(text) = node.text() {
            FilterNodeKind::ContentMatch(text)
        } else if node.is_container() || node.has_attributes() {
            FilterNodeKind::Containment
        } else {
            FilterNodeKind::Selection
        }
    }
}

/// Selected data children, by index.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pick {
    /// The whole subtree.
    All,
    /// Only these children, each with its own selection.
    Some(BTreeMap<usize, Pick>),
}

/// Outcome of matching one filter sibling group.
enum Level {
    /// A content-match constraint failed; the parent is excluded.
    Excluded,
    /// Selection within the parent (possibly empty).
    Picked(Pick),
}

/// Apply a subtree filter to `data`.
///
/// - No filter returns the data unchanged.
/// - A filter root without children selects nothing.
/// - Otherwise returns the data root restricted to the selected content, or
///   `None` if nothing was selected.
///
/// # Errors
///
/// [`FilterError`] if the filter root carries text or a filter node name is
/// ill-formed.
///
/// # Example
///
/// ```
/// use netconf_engine::codec::XmlCodec;
/// use netconf_engine::filter::apply;
///
/// let data = XmlCodec::from_xml_str(
///     "<users><user><name>alice</name><id>1</id></user>\
///      <user><name>bob</name><id>2</id></user></users>",
/// ).unwrap();
/// let filter = XmlCodec::from_xml_str("<users><user><name>bob</name></user></users>").unwrap();
///
/// let result = apply(&data, Some(&filter)).unwrap().unwrap();
/// assert_eq!(
///     XmlCodec::to_xml_string(&result),
///     "<users><user><name>bob</name><id>2</id></user></users>"
/// );
/// ```
pub fn apply(data: &Node, filter: Option<&Node>) -> Result<Option<Node>, FilterError> {
    let Some(filter) = filter else {
        return Ok(Some(data.clone()));
    };
    Ok(evaluate(data, filter)?.map(|pick| materialize(data, &pick)))
}

/// Check whether applying `filter` to `data` would select anything.
///
/// # Errors
///
/// Same as [`apply`].
pub fn matches(data: &Node, filter: &Node) -> Result<bool, FilterError> {
    Ok(evaluate(data, filter)?.is_some())
}

/// Validate a filter without evaluating it.
///
/// # Errors
///
/// Same as [`apply`].
pub fn validate(filter: &Node) -> Result<(), FilterError> {
    if filter.text().is_some_and(|t| !t.trim().is_empty()) {
        return Err(FilterError::TextOnFilterRoot(filter.name().to_string()));
    }
    filter.children().iter().try_for_each(validate_node)
}

fn validate_node(node: &Node) -> Result<(), FilterError> {
    check_name(node.name())?;
    for (name, _) in node.attributes() {
        check_name(name)?;
    }
    node.children().iter().try_for_each(validate_node)
}

fn check_name(name: &QName) -> Result<(), FilterError> {
    let local = name.local_name();
    let ill_formed = local.is_empty()
        || local.contains(':')
        || local.chars().any(char::is_whitespace)
        || name.namespace().chars().any(char::is_whitespace);
    if ill_formed {
        return Err(FilterError::IllFormedName(name.to_string()));
    }
    Ok(())
}

fn evaluate(data: &Node, filter: &Node) -> Result<Option<Pick>, FilterError> {
    validate(filter)?;
    if filter.children().is_empty() {
        return Ok(None);
    }
    Ok(match select_children(data.children(), filter.children()) {
        Level::Picked(pick) if !is_empty(&pick) => Some(pick),
        _ => None,
    })
}

fn is_empty(pick: &Pick) -> bool {
    matches!(pick, Pick::Some(map) if map.is_empty())
}

/// Match one filter sibling group against one data sibling group.
fn select_children(data: &[Node], filter: &[Node]) -> Level {
    let mut picked = BTreeMap::new();
    let mut content_only = true;

    // Content-match siblings form a conjunction.
    for f in filter {
        if let FilterNodeKind::ContentMatch(text) = FilterNodeKind::of(f) {
            let mut matched = false;
            for (i, d) in data.iter().enumerate() {
                if f.name().matches(d.name()) && d.is_leaf() && d.text() == Some(text) {
                    picked.insert(i, Pick::All);
                    matched = true;
                }
            }
            if !matched {
                return Level::Excluded;
            }
        }
    }

    for f in filter {
        match FilterNodeKind::of(f) {
            FilterNodeKind::ContentMatch(_) => {}
            FilterNodeKind::Selection => {
                content_only = false;
                for (i, _) in data.iter().enumerate().filter(|(_, d)| f.name().matches(d.name())) {
                    union(&mut picked, i, Pick::All);
                }
            }
            FilterNodeKind::Containment => {
                content_only = false;
                for (i, d) in data.iter().enumerate().filter(|(_, d)| f.name().matches(d.name())) {
                    if let Some(pick) = match_containment(d, f) {
                        union(&mut picked, i, pick);
                    }
                }
            }
        }
    }

    if content_only {
        Level::Picked(Pick::All)
    } else {
        Level::Picked(Pick::Some(picked))
    }
}

/// Match a containment filter node against a data node of the same name.
fn match_containment(data: &Node, filter: &Node) -> Option<Pick> {
    if !data.is_container() {
        return None;
    }

    let mut keys = Vec::new();
    for (attr, value) in filter.attributes() {
        let namespace = if attr.has_namespace() {
            attr.namespace()
        } else {
            filter.namespace()
        };
        let key = QName::new(namespace, attr.local_name());
        let index = data
            .children()
            .iter()
            .position(|d| key.matches(d.name()) && d.is_leaf() && d.text() == Some(value))?;
        keys.push(index);
    }

    if filter.children().is_empty() {
        return Some(Pick::All);
    }

    match select_children(data.children(), filter.children()) {
        Level::Excluded => None,
        Level::Picked(Pick::All) => Some(Pick::All),
        Level::Picked(Pick::Some(mut map)) => {
            for index in keys {
                map.entry(index).or_insert(Pick::All);
            }
            (!map.is_empty()).then_some(Pick::Some(map))
        }
    }
}

/// Merge `pick` into the selection of child `index`.
fn union(picked: &mut BTreeMap<usize, Pick>, index: usize, pick: Pick) {
    match picked.remove(&index) {
        None => {
            picked.insert(index, pick);
        }
        Some(existing) => {
            picked.insert(index, merge(existing, pick));
        }
    }
}

fn merge(a: Pick, b: Pick) -> Pick {
    match (a, b) {
        (Pick::Some(mut left), Pick::Some(right)) => {
            for (index, pick) in right {
                union(&mut left, index, pick);
            }
            Pick::Some(left)
        }
        _ => Pick::All,
    }
}

fn materialize(data: &Node, pick: &Pick) -> Node {
    match pick {
        Pick::All => data.clone(),
        Pick::Some(map) => data.with_children(
            map.iter()
                .filter_map(|(i, p)| data.children().get(*i).map(|child| materialize(child, p)))
                .collect(),
        ),
    }
}
