//! Negotiation module - hello exchange and session preferences.
//!
//! Every session starts with both peers sending a `<hello>` in
//! end-of-message framing. The [`Negotiator`] state machine validates the
//! peer hello, intersects capability sets and fixes the framing mode for
//! the rest of the session.
//!
//! # Workflow
//!
//! 1. `Negotiator::start` builds the local hello (`Idle -> HelloSent`)
//! 2. The hello is framed with `]]>]]>` and written to the transport
//! 3. `Negotiator::receive_hello` validates the peer hello (`-> Negotiated`)
//! 4. `Negotiator::establish` hands out [`SessionPreferences`]
//!    (`-> Established`)
//!
//! Any failure moves the negotiator to `Failed`; no preferences are
//! exposed in that case.
//!
//! # Example
//!
//! ```
//! use netconf_engine::negotiation::{capabilities, CapabilitySet, Negotiator, Role};
//! use netconf_engine::protocol::FramingMode;
//!
//! let caps = CapabilitySet::from_uris([capabilities::BASE_1_0, capabilities::BASE_1_1]);
//!
//! let mut server = Negotiator::new(Role::Server { session_id: 1 }, caps.clone());
//! let mut client = Negotiator::new(Role::Client, caps);
//!
//! let server_hello = server.start().unwrap();
//! let client_hello = client.start().unwrap();
//!
//! client.receive_hello(&server_hello).unwrap();
//! server.receive_hello(&client_hello).unwrap();
//!
//! let prefs = client.establish().unwrap();
//! assert_eq!(prefs.framing(), FramingMode::Chunked);
//! assert_eq!(prefs.session_id(), 1);
//! ```

mod capability;
mod hello;
mod negotiator;
mod session_id;

pub use capability::{capabilities, Capability, CapabilitySet};
pub use hello::{build_hello, parse_hello, HelloMessage};
pub use negotiator::{NegotiationState, Negotiator, Role, SessionPreferences};
pub use session_id::{SequentialAllocator, SessionIdAllocator, SessionIdLease};
