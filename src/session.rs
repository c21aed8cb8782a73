//! Session builder and runtime loop.
//!
//! The [`SessionBuilder`] configures one side of a session. Calling
//! [`establish`](SessionBuilder::establish) on a connected stream:
//! 1. Sends the local hello (end-of-message framing)
//! 2. Reads and validates the peer hello
//! 3. Switches both directions to the negotiated framing
//! 4. Spawns the writer task and the read loop
//!
//! After that, requests go through [`Session::submit`] / [`Session::rpc`]
//! and everything that is not a reply to one of them (notifications,
//! requests from a client when acting as server) comes out of
//! [`Session::next_message`].
//!
//! # Example
//!
//! ```no_run
//! use netconf_engine::rpc::operations::{self, Datastore};
//! use netconf_engine::SessionBuilder;
//!
//! # async fn run(stream: tokio::net::TcpStream) -> netconf_engine::Result<()> {
//! let session = SessionBuilder::client().establish(stream).await?;
//!
//! let reply = session.rpc(operations::get_config(Datastore::Running, None)).await?;
//! if let Some(data) = reply.data() {
//!     println!("{} top-level nodes", data.children().len());
//! }
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::codec::XmlCodec;
use crate::config::SessionConfig;
use crate::error::{NegotiationError, NetconfError, Result, TerminationCause};
use crate::negotiation::{
    capabilities, Capability, CapabilitySet, Negotiator, Role, SessionIdAllocator,
    SessionIdLease, SessionPreferences,
};
use crate::protocol::{encode_message, FramingMode, MessageReader};
use crate::rpc::{operations, Correlator, ReplyFuture, ReplyRouting, RpcReply};
use crate::tree::Node;
use crate::writer::{spawn_writer_task, WriterHandle};

enum Side {
    Client,
    Server(Arc<dyn SessionIdAllocator>),
}

/// Builder for one side of a session.
///
/// Both constructors start with `base:1.0` and `base:1.1`.
pub struct SessionBuilder {
    side: Side,
    capabilities: CapabilitySet,
    config: SessionConfig,
}

impl SessionBuilder {
    fn new(side: Side) -> Self {
        Self {
            side,
            capabilities: CapabilitySet::from_uris([capabilities::BASE_1_0, capabilities::BASE_1_1]),
            config: SessionConfig::default(),
        }
    }

    /// Client side: expects a session id from the server.
    pub fn client() -> Self {
        Self::new(Side::Client)
    }

    /// Server side: allocates the session id from `allocator`.
    pub fn server(allocator: Arc<dyn SessionIdAllocator>) -> Self {
        Self::new(Side::Server(allocator))
    }

    /// Offer an additional capability.
    pub fn capability(mut self, uri: impl Into<String>) -> Self {
        self.capabilities.insert(Capability::new(uri));
        self
    }

    /// Replace the offered capabilities.
    pub fn capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the largest inbound chunk accepted.
    ///
    /// Default: 16 MiB
    pub fn max_chunk_size(mut self, size: u32) -> Self {
        self.config.max_chunk_size = size;
        self
    }

    /// Set the size of outbound chunks.
    ///
    /// Default: 8 KiB
    pub fn outbound_chunk_size(mut self, size: usize) -> Self {
        self.config.outbound_chunk_size = size;
        self
    }

    /// Set the read buffer size.
    ///
    /// Default: 64 KiB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the maximum pending outbound messages for backpressure.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.config.max_pending_frames = limit;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the backpressure timeout.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.backpressure_timeout_ms =
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Run the hello exchange on `stream` and start the session.
    ///
    /// # Errors
    ///
    /// - [`NetconfError::Negotiation`] if the hello exchange fails; the
    ///   stream is shut down and no session is created.
    /// - [`NetconfError::Io`] / [`NetconfError::Framing`] from the
    ///   transport.
    pub async fn establish<S>(self, stream: S) -> Result<Session>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.config.validate()?;

        let lease = match &self.side {
            Side::Server(allocator) => Some(SessionIdLease::acquire(allocator.clone())?),
            Side::Client => None,
        };
        let role = match &lease {
            Some(lease) => Role::Server { session_id: lease.id() },
            None => Role::Client,
        };

        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = MessageReader::with_limits(
            read_half,
            self.config.max_chunk_size,
            self.config.read_buffer_size,
        );
        let mut negotiator = Negotiator::new(role, self.capabilities);

        let preferences =
            match exchange_hellos(&mut negotiator, &mut reader, &mut write_half, &self.config).await {
                Ok(preferences) => preferences,
                Err(e) => {
                    negotiator.abort();
                    tracing::error!("Session establishment failed: {}", e);
                    let _ = write_half.shutdown().await;
                    return Err(e);
                }
            };

        Session::start(preferences, reader, write_half, &self.config, lease)
    }
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = match self.side {
            Side::Client => "client",
            Side::Server(_) => "server",
        };
        f.debug_struct("SessionBuilder")
            .field("side", &side)
            .field("capabilities", &self.capabilities)
            .field("config", &self.config)
            .finish()
    }
}

async fn exchange_hellos<S>(
    negotiator: &mut Negotiator,
    reader: &mut MessageReader<ReadHalf<S>>,
    writer: &mut WriteHalf<S>,
    config: &SessionConfig,
) -> Result<SessionPreferences>
where
    S: AsyncRead + AsyncWrite,
{
    let hello = negotiator.start()?;
    let framed = encode_message(
        &XmlCodec::encode(&hello),
        FramingMode::EndOfMessage,
        config.outbound_chunk_size,
    )?;
    writer.write_all(&framed).await?;
    writer.flush().await?;

    let payload = reader
        .next_message()
        .await?
        .ok_or(NegotiationError::ConnectionClosed)?;
    let peer_hello = XmlCodec::decode(&payload)
        .map_err(|e| NegotiationError::MalformedHello(e.to_string()))?;

    negotiator.receive_hello(&peer_hello)?;
    Ok(negotiator.establish()?)
}

/// An established session.
///
/// Dropping the session stops the read loop and fails pending requests
/// with [`TerminationCause::LocalClose`].
pub struct Session {
    preferences: SessionPreferences,
    is_client: bool,
    correlator: Correlator,
    writer: WriterHandle,
    inbound: mpsc::UnboundedReceiver<Node>,
    shutdown_rx: Option<oneshot::Receiver<TerminationCause>>,
    read_task: JoinHandle<()>,
    writer_task: Option<JoinHandle<Result<()>>>,
    _lease: Option<SessionIdLease>,
}

impl Session {
    /// Create a client builder.
    pub fn client() -> SessionBuilder {
        SessionBuilder::client()
    }

    /// Create a server builder.
    pub fn server(allocator: Arc<dyn SessionIdAllocator>) -> SessionBuilder {
        SessionBuilder::server(allocator)
    }

    fn start<S>(
        preferences: SessionPreferences,
        mut reader: MessageReader<ReadHalf<S>>,
        write_half: WriteHalf<S>,
        config: &SessionConfig,
        lease: Option<SessionIdLease>,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        // Bytes already buffered after the peer hello are read in the new
        // framing from here on.
        reader.set_mode(preferences.framing())?;

        let (writer, writer_io) =
            spawn_writer_task(write_half, preferences.framing(), config.writer_config());
        let correlator = Correlator::new(Arc::new(writer.clone()));

        // The watcher must not hold a writer handle, or the writer task
        // would never see its channel close.
        let (write_failed_tx, write_failed_rx) = oneshot::channel();
        let writer_task = tokio::spawn(async move {
            let result = writer_io
                .await
                .unwrap_or_else(|e| Err(NetconfError::Io(std::io::Error::other(e))));
            if let Err(e) = &result {
                let _ = write_failed_tx.send(TerminationCause::from(e));
            }
            result
        });

        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let loop_correlator = correlator.clone();
        let read_task = tokio::spawn(async move {
            let cause = tokio::select! {
                cause = read_loop(reader, &loop_correlator, inbound_tx) => cause,
                Ok(cause) = write_failed_rx => cause,
            };
            tracing::debug!("Session ended: {}", cause);
            loop_correlator.terminate(cause.clone());
            let _ = shutdown_tx.send(cause);
        });

        tracing::debug!(
            session_id = preferences.session_id(),
            framing = ?preferences.framing(),
            "Session established"
        );

        Ok(Session {
            is_client: lease.is_none(),
            preferences,
            correlator,
            writer,
            inbound,
            shutdown_rx: Some(shutdown_rx),
            read_task,
            writer_task: Some(writer_task),
            _lease: lease,
        })
    }

    /// Negotiated preferences.
    pub fn preferences(&self) -> &SessionPreferences {
        &self.preferences
    }

    /// Session id announced by the server.
    pub fn session_id(&self) -> u32 {
        self.preferences.session_id()
    }

    /// Framing in use.
    pub fn framing(&self) -> FramingMode {
        self.preferences.framing()
    }

    /// Queue an operation; the future resolves with the `<rpc-reply>`.
    ///
    /// Requests are handed to the writer without waiting. If the write queue
    /// is full at that moment the request fails with
    /// [`NetconfError::QueueFull`] and the session stays up.
    pub fn submit(&self, operation: Node) -> ReplyFuture {
        self.correlator.submit(operation)
    }

    /// Submit an operation and parse its reply.
    pub async fn rpc(&self, operation: Node) -> Result<RpcReply> {
        RpcReply::from_node(self.submit(operation).await?)
    }

    /// Next inbound message that is not a reply to a submitted request.
    ///
    /// Returns `None` once the session has ended and all buffered messages
    /// were taken.
    pub async fn next_message(&mut self) -> Option<Node> {
        self.inbound.recv().await
    }

    /// Send a message outside request correlation (replies when acting as
    /// server, notifications).
    pub async fn send(&self, message: &Node) -> Result<()> {
        if let Some(cause) = self.correlator.termination_cause() {
            return Err(NetconfError::SessionTerminated(cause));
        }
        self.writer.send_node(message).await
    }

    /// Requests submitted but not yet answered.
    pub fn pending_requests(&self) -> usize {
        self.correlator.pending()
    }

    /// Check if outbound backpressure is active.
    pub fn is_backpressure_active(&self) -> bool {
        self.writer.is_backpressure_active()
    }

    /// Check if the session has ended.
    pub fn is_terminated(&self) -> bool {
        self.correlator.is_terminated()
    }

    /// Wait until the session ends and return why.
    pub async fn wait_for_shutdown(&mut self) -> TerminationCause {
        if let Some(rx) = self.shutdown_rx.as_mut() {
            if let Ok(cause) = rx.await {
                self.shutdown_rx = None;
                return cause;
            }
            self.shutdown_rx = None;
        }
        self.correlator
            .termination_cause()
            .unwrap_or(TerminationCause::LocalClose)
    }

    /// Close the session.
    ///
    /// A client sends `<close-session>` and waits for its reply first. The
    /// transport is shut down once queued messages are written.
    pub async fn close(mut self) -> Result<()> {
        let mut result = Ok(());
        if self.is_client && !self.is_terminated() {
            result = match self.rpc(operations::close_session()).await {
                Ok(reply) if reply.has_errors() => Err(NetconfError::Protocol(format!(
                    "close-session refused: {}",
                    reply.errors()[0]
                ))),
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            };
        }

        let writer_task = self.writer_task.take();
        drop(self);

        if let Some(task) = writer_task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!("Writer ended with error on close: {}", e),
                Err(e) => tracing::warn!("Writer task failed: {}", e),
            }
        }
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.read_task.abort();
        self.correlator.terminate(TerminationCause::LocalClose);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id())
            .field("framing", &self.framing())
            .field("correlator", &self.correlator)
            .finish()
    }
}

/// Main read loop: reads messages and routes them.
///
/// Returns why the session ended.
async fn read_loop<R>(
    mut reader: MessageReader<R>,
    correlator: &Correlator,
    inbound: mpsc::UnboundedSender<Node>,
) -> TerminationCause
where
    R: AsyncRead + Unpin,
{
    loop {
        let payload = match reader.next_message().await {
            Ok(Some(payload)) => payload,
            Ok(None) => return TerminationCause::PeerClosed,
            Err(e) => {
                tracing::error!("Read loop error: {}", e);
                return TerminationCause::from(&e);
            }
        };

        let message = match XmlCodec::decode(&payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping unparseable message: {}", e);
                continue;
            }
        };

        match correlator.on_reply(message) {
            Ok(ReplyRouting::Delivered) => {}
            Ok(ReplyRouting::Unsolicited(message)) => {
                if inbound.send(message).is_err() {
                    tracing::trace!("Inbound receiver gone, dropping message");
                }
            }
            Err(e) => {
                tracing::error!("Read loop error: {}", e);
                return TerminationCause::from(&e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::SequentialAllocator;
    use crate::protocol::{classify, MessageKind};
    use crate::rpc::build_reply;

    #[test]
    fn test_builder_configuration() {
        let builder = SessionBuilder::client()
            .capability(capabilities::CANDIDATE_1_0)
            .max_chunk_size(4096)
            .outbound_chunk_size(512)
            .max_pending_frames(2048)
            .channel_capacity(512)
            .backpressure_timeout(Duration::from_secs(10));

        assert!(builder.capabilities.contains(capabilities::BASE_1_1));
        assert!(builder.capabilities.contains(capabilities::CANDIDATE_1_0));
        assert_eq!(builder.config.max_chunk_size, 4096);
        assert_eq!(builder.config.outbound_chunk_size, 512);
        assert_eq!(builder.config.max_pending_frames, 2048);
        assert_eq!(builder.config.channel_capacity, 512);
        assert_eq!(builder.config.backpressure_timeout(), Duration::from_secs(10));

        let saturated = SessionBuilder::client().backpressure_timeout(Duration::MAX);
        assert_eq!(saturated.config.backpressure_timeout_ms, u64::MAX);
    }

    #[tokio::test]
    async fn test_client_server_roundtrip() {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let allocator = Arc::new(SequentialAllocator::new());

        let (client, server) = tokio::join!(
            SessionBuilder::client().establish(client_io),
            SessionBuilder::server(allocator.clone()).establish(server_io),
        );
        let client = client.unwrap();
        let mut server = server.unwrap();

        assert_eq!(client.session_id(), 1);
        assert_eq!(server.session_id(), 1);
        assert_eq!(client.framing(), FramingMode::Chunked);

        let pending = client.submit(operations::commit());
        let request = server.next_message().await.unwrap();
        assert_eq!(classify(&request), MessageKind::Rpc);
        server.send(&build_reply(&request, Vec::new())).await.unwrap();

        let reply = RpcReply::from_node(pending.await.unwrap()).unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.message_id(), Some("1"));

        drop(client);
        assert_eq!(server.wait_for_shutdown().await, TerminationCause::PeerClosed);
        drop(server);
        assert_eq!(allocator.in_use(), 0);
    }

    #[tokio::test]
    async fn test_negotiation_failure_closes_stream() {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let allocator = Arc::new(SequentialAllocator::new());

        let (client, server) = tokio::join!(
            SessionBuilder::client()
                .capabilities(CapabilitySet::from_uris([capabilities::BASE_1_1]))
                .establish(client_io),
            SessionBuilder::server(allocator.clone())
                .capabilities(CapabilitySet::from_uris([capabilities::BASE_1_0]))
                .establish(server_io),
        );

        assert!(matches!(
            client.unwrap_err(),
            NetconfError::Negotiation(NegotiationError::EmptyIntersection)
        ));
        assert!(matches!(
            server.unwrap_err(),
            NetconfError::Negotiation(NegotiationError::EmptyIntersection)
        ));
        assert_eq!(allocator.in_use(), 0);
    }
}
