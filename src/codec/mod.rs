//! Codec module - payload serialization for node trees.
//!
//! Framing (see [`crate::protocol`]) delimits messages on the byte stream;
//! the codec turns one message payload into a [`Node`](crate::tree::Node)
//! tree and back. Payload errors are reported as
//! [`NetconfError::Parse`](crate::NetconfError::Parse) and, unlike framing
//! errors, do not have to end the session.
//!
//! # Example
//!
//! ```
//! use netconf_engine::codec::XmlCodec;
//! use netconf_engine::tree::Node;
//!
//! let node = Node::builder_ns("urn:example", "users")
//!     .child(Node::leaf_ns("urn:example", "user", "alice"))
//!     .build()
//!     .unwrap();
//!
//! let encoded = XmlCodec::encode(&node);
//! let decoded = XmlCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, node);
//! ```

mod xml;

pub use xml::XmlCodec;
