//! Subtree filtering and filtered notification delivery.
//!
//! The filter engine is synchronous and stateless: [`apply`] computes the
//! filtered copy of a data tree, [`matches`] answers whether a filter would
//! keep anything. [`NotificationPublisher`] uses the latter to decide
//! which subscribers receive a notification.

mod publisher;
mod subtree;

pub use publisher::{NotificationPublisher, Subscription};
pub use subtree::{apply, matches, validate, FilterNodeKind};
