//! RPC layer: request correlation, base operations and reply parsing.
//!
//! - [`Correlator`] pairs outbound `<rpc>` requests with `<rpc-reply>`
//!   messages in strict FIFO order
//! - [`operations`] builds the standard base protocol operations
//! - [`RpcReply`] gives typed access to `<ok/>`, `<data>` and
//!   `<rpc-error>` content

mod correlator;
pub mod operations;
mod reply;

pub use correlator::{Correlator, ReplyFuture, ReplyRouting, RequestStatus, Transmit};
pub use operations::{Datastore, DefaultOperation, Source};
pub use reply::{build_data_reply, build_error_reply, build_reply, ErrorSeverity, RpcError, RpcReply};
