//! # netconf-engine
//!
//! NETCONF protocol engine (RFC 6241 / RFC 6242) over any async byte
//! stream.
//!
//! This crate handles everything between an already-connected transport
//! (SSH channel, TLS stream, TCP socket, in-memory pipe) and the
//! application: the hello exchange, message framing, request/reply
//! correlation and subtree filtering.
//!
//! ## Architecture
//!
//! - **Node tree** ([`tree`]): immutable payload model shared by every layer
//! - **Codec** ([`codec`]): node trees to and from XML
//! - **Framing** ([`protocol`]): end-of-message and chunked framing
//! - **Negotiation** ([`negotiation`]): hello exchange and capabilities
//! - **RPC** ([`rpc`]): FIFO correlation, base operations, reply parsing
//! - **Filtering** ([`filter`]): subtree filters and notification fan-out
//! - **Session** ([`Session`]): read loop and writer task gluing it together
//!
//! ## Example
//!
//! ```no_run
//! use netconf_engine::filter;
//! use netconf_engine::rpc::operations;
//! use netconf_engine::SessionBuilder;
//!
//! # async fn run(stream: tokio::net::TcpStream) -> netconf_engine::Result<()> {
//! let mut session = SessionBuilder::client().establish(stream).await?;
//!
//! let reply = session.rpc(operations::get(None)).await?;
//! if let Some(data) = reply.data() {
//!     let users = netconf_engine::codec::XmlCodec::from_xml_str("<filter><users/></filter>")?;
//!     let selected = filter::apply(data, Some(&users))?;
//!     println!("{:?}", selected);
//! }
//!
//! while let Some(notification) = session.next_message().await {
//!     println!("{}", netconf_engine::codec::XmlCodec::to_xml_string(&notification));
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod filter;
pub mod negotiation;
pub mod protocol;
pub mod rpc;
pub mod tree;

mod session;
mod writer;

pub use config::SessionConfig;
pub use error::{NetconfError, Result, TerminationCause};
pub use session::{Session, SessionBuilder};
pub use tree::{Node, QName};
