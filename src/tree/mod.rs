//! Node tree - the immutable payload model shared by every layer.
//!
//! Both protocol payloads (hello, rpc, rpc-reply, notification) and subtree
//! filters are represented as [`Node`] trees. A node is either a leaf
//! (optional text, no children) or a container (one or more children, no
//! text). Trees are built once through [`NodeBuilder`] and are read-only
//! afterwards; they carry no parent pointers and can be shared freely
//! across tasks.
//!
//! # Example
//!
//! ```
//! use netconf_engine::tree::Node;
//!
//! let user = Node::builder("user")
//!     .child(Node::leaf("name", "bob"))
//!     .child(Node::leaf("id", "2"))
//!     .build()
//!     .unwrap();
//!
//! assert!(user.is_container());
//! assert_eq!(user.child("name").and_then(|n| n.text()), Some("bob"));
//! ```

mod node;

pub use node::{Body, Node, NodeBuilder, QName};
