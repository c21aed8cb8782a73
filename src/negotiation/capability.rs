//! Capabilities and capability sets.
//!
//! A capability is an URN, optionally followed by `?key=value&...`
//! parameters. Everything before `?` is the capability's identity; sets
//! and intersections work on identities only.

use std::fmt;

/// Well-known capability URNs.
pub mod capabilities {
    /// NETCONF 1.0 base protocol (end-of-message framing).
    pub const BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";
    /// NETCONF 1.1 base protocol (chunked framing).
    pub const BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";
    /// EXI encoding.
    pub const EXI_1_0: &str = "urn:ietf:params:netconf:capability:exi:1.0";
    /// RFC 5277 notifications.
    pub const NOTIFICATION_1_0: &str = "urn:ietf:params:netconf:capability:notification:1.0";
    /// RFC 5277 interleave.
    pub const INTERLEAVE_1_0: &str = "urn:ietf:params:netconf:capability:interleave:1.0";
    /// Candidate datastore.
    pub const CANDIDATE_1_0: &str = "urn:ietf:params:netconf:capability:candidate:1.0";
    /// Startup datastore.
    pub const STARTUP_1_0: &str = "urn:ietf:params:netconf:capability:startup:1.0";
    /// Writable running datastore.
    pub const WRITABLE_RUNNING_1_0: &str =
        "urn:ietf:params:netconf:capability:writable-running:1.0";
    /// Validate operation.
    pub const VALIDATE_1_1: &str = "urn:ietf:params:netconf:capability:validate:1.1";
    /// Rollback on error.
    pub const ROLLBACK_ON_ERROR_1_0: &str =
        "urn:ietf:params:netconf:capability:rollback-on-error:1.0";
}

/// A single capability URN.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Capability {
    uri: String,
    identity_len: usize,
}

impl Capability {
    /// Parse a capability URN. Surrounding whitespace is removed.
    pub fn new(uri: impl Into<String>) -> Self {
        let uri = uri.into().trim().to_string();
        let identity_len = uri.find('?').unwrap_or(uri.len());
        Self { uri, identity_len }
    }

    /// Full URN including parameters.
    #[inline]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// URN without parameters.
    #[inline]
    pub fn identity(&self) -> &str {
        &self.uri[..self.identity_len]
    }

    /// Query parameters as `(key, value)` pairs.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        let query = self.uri.get(self.identity_len + 1..).unwrap_or("");
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
    }

    /// Value of a query parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

impl From<&str> for Capability {
    fn from(uri: &str) -> Self {
        Capability::new(uri)
    }
}

/// Ordered set of capabilities keyed by identity.
///
/// Inserting a capability whose identity is already present is a no-op, so
/// the first offered variant wins. Equality compares identities only,
/// regardless of order and parameters.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    items: Vec<Capability>,
}

impl CapabilitySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from URN strings.
    pub fn from_uris<I, S>(uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        uris.into_iter().map(Capability::new).collect()
    }

    /// Insert a capability. Returns `false` if its identity was present.
    pub fn insert(&mut self, capability: Capability) -> bool {
        if capability.uri().is_empty() || self.contains(capability.identity()) {
            return false;
        }
        self.items.push(capability);
        true
    }

    /// Check if a capability identity is present.
    ///
    /// Parameters in `identity` are ignored.
    pub fn contains(&self, identity: &str) -> bool {
        self.get(identity).is_some()
    }

    /// Look up a capability by identity.
    pub fn get(&self, identity: &str) -> Option<&Capability> {
        let identity = identity.split('?').next().unwrap_or(identity);
        self.items.iter().find(|c| c.identity() == identity)
    }

    /// Capabilities whose identity is in both sets.
    ///
    /// Parameters are carried from `self`, the offering side.
    pub fn intersect(&self, other: &CapabilitySet) -> CapabilitySet {
        self.items
            .iter()
            .filter(|c| other.contains(c.identity()))
            .cloned()
            .collect()
    }

    /// Number of capabilities.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.items.iter()
    }
}

impl PartialEq for CapabilitySet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.items.iter().all(|c| other.contains(c.identity()))
    }
}

impl Eq for CapabilitySet {}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        let mut set = CapabilitySet::new();
        for capability in iter {
            set.insert(capability);
        }
        set
    }
}

impl<'a> IntoIterator for &'a CapabilitySet {
    type Item = &'a Capability;
    type IntoIter = std::slice::Iter<'a, Capability>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
