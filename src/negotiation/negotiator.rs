//! Hello exchange state machine.

use super::capability::{capabilities, CapabilitySet};
use super::hello::{build_hello, parse_hello};
use crate::error::NegotiationError;
use crate::protocol::FramingMode;
use crate::rpc::operations;
use crate::tree::Node;

/// Which side of the session this negotiator acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client: expects a session id from the server.
    Client,
    /// Server: announces `session_id` in its hello.
    Server {
        /// Id allocated for this session.
        session_id: u32,
    },
}

/// Negotiation states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationState {
    /// Nothing sent yet.
    #[default]
    Idle,
    /// Local hello sent, waiting for the peer hello.
    HelloSent,
    /// Peer hello accepted, preferences computed.
    Negotiated,
    /// Preferences handed to the session.
    Established,
    /// Negotiation failed; the transport must be torn down.
    Failed,
}

/// Outcome of a successful negotiation.
#[derive(Debug, Clone)]
pub struct SessionPreferences {
    local_hello: Node,
    remote_hello: Node,
    remote_capabilities: CapabilitySet,
    capabilities: CapabilitySet,
    framing: FramingMode,
    session_id: u32,
    exi_start: Option<Node>,
}

impl SessionPreferences {
    /// The hello sent by this side.
    pub fn local_hello(&self) -> &Node {
        &self.local_hello
    }

    /// The hello received from the peer.
    pub fn remote_hello(&self) -> &Node {
        &self.remote_hello
    }

    /// Everything the peer offered.
    pub fn remote_capabilities(&self) -> &CapabilitySet {
        &self.remote_capabilities
    }

    /// Capabilities shared by both sides.
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Framing for the rest of the session.
    pub fn framing(&self) -> FramingMode {
        self.framing
    }

    /// Session id (announced by the server).
    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// `start-exi` operation to send before switching payload encoding,
    /// when both `base:1.1` and EXI were negotiated.
    pub fn exi_start(&self) -> Option<&Node> {
        self.exi_start.as_ref()
    }
}

/// Hello exchange state machine for one session.
#[derive(Debug)]
pub struct Negotiator {
    role: Role,
    local: CapabilitySet,
    state: NegotiationState,
    local_hello: Option<Node>,
    preferences: Option<SessionPreferences>,
}

impl Negotiator {
    /// Create a negotiator offering `local` capabilities.
    pub fn new(role: Role, local: CapabilitySet) -> Self {
        Self {
            role,
            local,
            state: NegotiationState::Idle,
            local_hello: None,
            preferences: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Role of this side.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Build the local hello and move to `HelloSent`.
    ///
    /// The caller frames it in end-of-message mode and writes it out.
    ///
    /// # Errors
    ///
    /// Fails if called in any state but `Idle`.
    pub fn start(&mut self) -> Result<Node, NegotiationError> {
        if self.state != NegotiationState::Idle {
            return Err(self.fail(NegotiationError::InvalidState("start requires Idle")));
        }

        let session_id = match self.role {
            Role::Server { session_id } => Some(session_id),
            Role::Client => None,
        };
        let hello = build_hello(&self.local, session_id)
            .map_err(|e| self.fail(NegotiationError::MalformedHello(e.to_string())))?;

        self.local_hello = Some(hello.clone());
        self.state = NegotiationState::HelloSent;
        Ok(hello)
    }

    /// Validate the peer hello and compute the session preferences.
    ///
    /// # Errors
    ///
    /// Any [`NegotiationError`]; the negotiator is then `Failed`.
    pub fn receive_hello(&mut self, hello: &Node) -> Result<&SessionPreferences, NegotiationError> {
        if self.state != NegotiationState::HelloSent {
            return Err(self.fail(NegotiationError::InvalidState(
                "receive_hello requires HelloSent",
            )));
        }

        let preferences = self.negotiate(hello).map_err(|e| self.fail(e))?;
        tracing::debug!(
            session_id = preferences.session_id,
            framing = ?preferences.framing,
            capabilities = preferences.capabilities.len(),
            "Hello exchange complete"
        );

        self.state = NegotiationState::Negotiated;
        Ok(self.preferences.insert(preferences))
    }

    fn negotiate(&self, hello: &Node) -> Result<SessionPreferences, NegotiationError> {
        let remote = parse_hello(hello)?;

        let session_id = match (self.role, remote.session_id) {
            (Role::Client, Some(id)) => id,
            (Role::Client, None) => return Err(NegotiationError::MissingSessionId),
            (Role::Server { .. }, Some(_)) => return Err(NegotiationError::UnexpectedSessionId),
            (Role::Server { session_id }, None) => session_id,
        };

        let negotiated = self.local.intersect(&remote.capabilities);
        if negotiated.is_empty() {
            return Err(NegotiationError::EmptyIntersection);
        }
        if !negotiated.contains(capabilities::BASE_1_0)
            && !negotiated.contains(capabilities::BASE_1_1)
        {
            return Err(NegotiationError::MissingBaseCapability);
        }

        let framing = if negotiated.contains(capabilities::BASE_1_1) {
            FramingMode::Chunked
        } else {
            FramingMode::EndOfMessage
        };

        let exi_start = if framing == FramingMode::Chunked
            && negotiated.contains(capabilities::EXI_1_0)
        {
            Some(operations::start_exi())
        } else {
            None
        };

        let local_hello = self
            .local_hello
            .clone()
            .ok_or(NegotiationError::InvalidState("local hello missing"))?;

        Ok(SessionPreferences {
            local_hello,
            remote_hello: hello.clone(),
            remote_capabilities: remote.capabilities,
            capabilities: negotiated,
            framing,
            session_id,
            exi_start,
        })
    }

    /// Hand the preferences to the session and move to `Established`.
    ///
    /// # Errors
    ///
    /// Fails unless the negotiator is `Negotiated`.
    pub fn establish(&mut self) -> Result<SessionPreferences, NegotiationError> {
        if self.state != NegotiationState::Negotiated {
            return Err(self.fail(NegotiationError::InvalidState(
                "establish requires Negotiated",
            )));
        }
        let preferences = self
            .preferences
            .take()
            .ok_or_else(|| self.fail(NegotiationError::InvalidState("preferences missing")))?;
        self.state = NegotiationState::Established;
        Ok(preferences)
    }

    /// Move to `Failed` from any non-terminal state, dropping partial state.
    pub fn abort(&mut self) {
        if self.state != NegotiationState::Established {
            self.state = NegotiationState::Failed;
            self.preferences = None;
        }
    }

    fn fail(&mut self, err: NegotiationError) -> NegotiationError {
        tracing::warn!("Negotiation failed: {}", err);
        self.abort();
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::capabilities::{BASE_1_0, BASE_1_1, EXI_1_0, STARTUP_1_0};
    use crate::protocol::EXI_NAMESPACE;

    fn pair(
        server_caps: &[&str],
        client_caps: &[&str],
    ) -> (Negotiator, Negotiator, Node, Node) {
        let mut server = Negotiator::new(
            Role::Server { session_id: 7 },
            CapabilitySet::from_uris(server_caps.iter().copied()),
        );
        let mut client = Negotiator::new(
            Role::Client,
            CapabilitySet::from_uris(client_caps.iter().copied()),
        );
        let server_hello = server.start().unwrap();
        let client_hello = client.start().unwrap();
        (server, client, server_hello, client_hello)
    }

    #[test]
    fn test_chunked_when_both_offer_1_1() {
        let (mut server, mut client, sh, ch) = pair(&[BASE_1_0, BASE_1_1], &[BASE_1_0, BASE_1_1]);

        assert_eq!(client.receive_hello(&sh).unwrap().framing(), FramingMode::Chunked);
        assert_eq!(server.receive_hello(&ch).unwrap().framing(), FramingMode::Chunked);

        let prefs = client.establish().unwrap();
        assert_eq!(client.state(), NegotiationState::Established);
        assert_eq!(prefs.session_id(), 7);
        assert!(prefs.exi_start().is_none());
    }

    #[test]
    fn test_end_of_message_when_peer_lacks_1_1() {
        let (_server, mut client, sh, _ch) = pair(&[BASE_1_0], &[BASE_1_0, BASE_1_1]);
        let prefs = client.receive_hello(&sh).unwrap();
        assert_eq!(prefs.framing(), FramingMode::EndOfMessage);
        assert_eq!(prefs.capabilities().len(), 1);
    }

    #[test]
    fn test_missing_base_fails() {
        let (_server, mut client, sh, _ch) = pair(&[STARTUP_1_0], &[BASE_1_0, STARTUP_1_0]);
        assert_eq!(
            client.receive_hello(&sh).unwrap_err(),
            NegotiationError::MissingBaseCapability
        );
        assert_eq!(client.state(), NegotiationState::Failed);
        assert!(client.establish().is_err());
    }

    #[test]
    fn test_empty_intersection_fails() {
        let (_server, mut client, sh, _ch) = pair(&[BASE_1_1], &[BASE_1_0]);
        assert_eq!(
            client.receive_hello(&sh).unwrap_err(),
            NegotiationError::EmptyIntersection
        );
    }

    #[test]
    fn test_client_requires_session_id() {
        let (_s, mut client_a, _sh, ch) = pair(&[BASE_1_0], &[BASE_1_0]);
        // A client hello carries no session id; a client must reject it.
        assert_eq!(
            client_a.receive_hello(&ch).unwrap_err(),
            NegotiationError::MissingSessionId
        );
    }

    #[test]
    fn test_server_rejects_session_id_from_client() {
        let (mut server, _c, sh, _ch) = pair(&[BASE_1_0], &[BASE_1_0]);
        assert_eq!(
            server.receive_hello(&sh).unwrap_err(),
            NegotiationError::UnexpectedSessionId
        );
    }

    #[test]
    fn test_exi_start_message() {
        let (_server, mut client, sh, _ch) = pair(
            &[BASE_1_1, "urn:ietf:params:netconf:capability:exi:1.0?compression=1000"],
            &[BASE_1_1, EXI_1_0],
        );
        let prefs = client.receive_hello(&sh).unwrap();
        let exi = prefs.exi_start().unwrap();
        assert_eq!(exi.local_name(), "start-exi");
        assert_eq!(exi.namespace(), EXI_NAMESPACE);
    }

    #[test]
    fn test_no_exi_start_without_base_1_1() {
        let (_server, mut client, sh, _ch) = pair(&[BASE_1_0, EXI_1_0], &[BASE_1_0, EXI_1_0]);
        let prefs = client.receive_hello(&sh).unwrap();
        assert_eq!(prefs.framing(), FramingMode::EndOfMessage);
        assert!(prefs.capabilities().contains(EXI_1_0));
        assert!(prefs.exi_start().is_none());
    }

    #[test]
    fn test_out_of_order_calls_fail() {
        let mut negotiator = Negotiator::new(Role::Client, CapabilitySet::from_uris([BASE_1_0]));
        let hello = Node::empty_ns("", "hello");
        assert!(matches!(
            negotiator.receive_hello(&hello),
            Err(NegotiationError::InvalidState(_))
        ));
        assert_eq!(negotiator.state(), NegotiationState::Failed);
        assert!(negotiator.start().is_err());
    }
}
