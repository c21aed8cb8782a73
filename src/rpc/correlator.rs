//! FIFO request/reply correlation.
//!
//! Requests are queued in submission order and transmitted one at a time:
//! the next request goes out only after the reply to the previous one
//! arrived. Each request carries a sequential `message-id`; a reply whose
//! id differs from the in-flight request is a protocol violation that ends
//! the session.
//!
//! ```text
//! submit() ─► queue [Queued, Queued, ...] ─► in_flight (Sent) ─► transmit
//!                                                 ▲
//! on_reply(rpc-reply) ───── message-id match ─────┘ ─► oneshot ─► ReplyFuture
//! ```
//!
//! A queued request can be cancelled, either explicitly or by dropping its
//! [`ReplyFuture`]; it is then skipped and never reaches the wire. Once a
//! request is sent it can no longer be cancelled.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{NetconfError, Result, TerminationCause};
use crate::protocol::{classify, message_id, wrap_rpc, MessageKind};
use crate::tree::Node;
use crate::writer::WriterHandle;

const QUEUED: u8 = 0;
const SENT: u8 = 1;
const CANCELLED: u8 = 2;

/// Lifecycle of a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Waiting in the queue; may still be cancelled.
    Queued,
    /// Handed to the transport.
    Sent,
    /// Cancelled before transmission.
    Cancelled,
}

impl RequestStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            QUEUED => RequestStatus::Queued,
            SENT => RequestStatus::Sent,
            _ => RequestStatus::Cancelled,
        }
    }
}

/// Outbound side of the correlator.
///
/// Called with the correlator lock held, so implementations must not
/// block.
pub trait Transmit: Send + Sync {
    /// Queue a complete `<rpc>` for the wire.
    fn transmit(&self, rpc: &Node) -> Result<()>;
}

/// Never waits: a full write queue fails the request with
/// [`NetconfError::QueueFull`].
impl Transmit for WriterHandle {
    fn transmit(&self, rpc: &Node) -> Result<()> {
        self.try_send_node(rpc)
    }
}

/// Where an inbound message went.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyRouting {
    /// The reply completed the in-flight request.
    Delivered,
    /// Not a reply to an in-flight request; hand it to the application.
    Unsolicited(Node),
}

struct PendingRequest {
    message_id: String,
    rpc: Node,
    status: Arc<AtomicU8>,
    reply_tx: oneshot::Sender<Result<Node>>,
}

struct InFlight {
    message_id: String,
    reply_tx: oneshot::Sender<Result<Node>>,
}

#[derive(Default)]
struct State {
    queue: VecDeque<PendingRequest>,
    in_flight: Option<InFlight>,
    terminated: Option<TerminationCause>,
    next_message_id: u64,
}

/// Pairs outbound requests with inbound replies.
///
/// Cheaply cloneable; clones share the same queue.
#[derive(Clone)]
pub struct Correlator {
    state: Arc<Mutex<State>>,
    transmit: Arc<dyn Transmit>,
}

impl Correlator {
    /// Create a correlator sending requests through `transmit`.
    pub fn new(transmit: Arc<dyn Transmit>) -> Self {
        let state = State {
            next_message_id: 1,
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            transmit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an operation, wrapped into `<rpc message-id="N">`.
    ///
    /// The returned future resolves with the matching `<rpc-reply>`, or with
    /// [`NetconfError::SessionTerminated`] if the session ends first.
    /// Submitting on a terminated session resolves immediately.
    pub fn submit(&self, operation: Node) -> ReplyFuture {
        let mut state = self.lock();
        let (reply_tx, reply_rx) = oneshot::channel();
        let status = Arc::new(AtomicU8::new(QUEUED));

        let message_id = state.next_message_id.to_string();
        state.next_message_id += 1;

        let future = ReplyFuture {
            message_id: message_id.clone(),
            status: status.clone(),
            rx: reply_rx,
        };

        if let Some(cause) = &state.terminated {
            status.store(SENT, Ordering::Release);
            let _ = reply_tx.send(Err(NetconfError::SessionTerminated(cause.clone())));
            return future;
        }

        match wrap_rpc(&message_id, operation) {
            Ok(rpc) => {
                state.queue.push_back(PendingRequest {
                    message_id,
                    rpc,
                    status,
                    reply_tx,
                });
                self.pump(&mut state);
            }
            Err(e) => {
                status.store(SENT, Ordering::Release);
                let _ = reply_tx.send(Err(e.into()));
            }
        }
        future
    }

    /// Transmit the next live request if nothing is in flight.
    fn pump(&self, state: &mut State) {
        while state.in_flight.is_none() && state.terminated.is_none() {
            let Some(request) = state.queue.pop_front() else {
                return;
            };

            if request
                .status
                .compare_exchange(QUEUED, SENT, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                tracing::trace!("Skipping cancelled request {}", request.message_id);
                continue;
            }

            match self.transmit.transmit(&request.rpc) {
                Ok(()) => {
                    tracing::trace!("Request {} sent", request.message_id);
                    state.in_flight = Some(InFlight {
                        message_id: request.message_id,
                        reply_tx: request.reply_tx,
                    });
                }
                Err(e) if e.is_fatal() => {
                    let cause = TerminationCause::from(&e);
                    let _ = request.reply_tx.send(Err(e));
                    Self::fail_all(state, cause);
                }
                Err(e) => {
                    tracing::warn!("Request {} not sent: {}", request.message_id, e);
                    let _ = request.reply_tx.send(Err(e));
                }
            }
        }
    }

    /// Route an inbound message.
    ///
    /// An `<rpc-reply>` matching the in-flight request completes it and
    /// releases the next queued request. Other messages, and replies while
    /// nothing is in flight, come back as [`ReplyRouting::Unsolicited`].
    ///
    /// # Errors
    ///
    /// Returns [`NetconfError::Correlation`] if the reply's message-id does
    /// not match the in-flight request. The session is then terminated and
    /// every pending request fails.
    pub fn on_reply(&self, message: Node) -> Result<ReplyRouting> {
        if classify(&message) != MessageKind::RpcReply {
            return Ok(ReplyRouting::Unsolicited(message));
        }

        let mut state = self.lock();
        let Some(in_flight) = state.in_flight.take() else {
            tracing::debug!(
                "Reply {:?} with no request in flight",
                message_id(&message)
            );
            return Ok(ReplyRouting::Unsolicited(message));
        };

        let received = message_id(&message);
        if received != Some(in_flight.message_id.as_str()) {
            let err = NetconfError::Correlation {
                expected: in_flight.message_id,
                received: received.map(str::to_string),
            };
            let cause = TerminationCause::from(&err);
            let _ = in_flight
                .reply_tx
                .send(Err(NetconfError::SessionTerminated(cause.clone())));
            Self::fail_all(&mut state, cause);
            return Err(err);
        }

        if in_flight.reply_tx.send(Ok(message)).is_err() {
            tracing::debug!("Reply {} dropped, caller went away", in_flight.message_id);
        }
        self.pump(&mut state);
        Ok(ReplyRouting::Delivered)
    }

    /// Fail every outstanding request with `cause` and refuse new ones.
    ///
    /// Only the first cause is kept.
    pub fn terminate(&self, cause: TerminationCause) {
        let mut state = self.lock();
        if state.terminated.is_none() {
            Self::fail_all(&mut state, cause);
        }
    }

    fn fail_all(state: &mut State, cause: TerminationCause) {
        let in_flight = state.in_flight.take();
        let failed = state.queue.len() + usize::from(in_flight.is_some());
        if failed > 0 {
            tracing::warn!("Failing {} pending requests: {}", failed, cause);
        } else {
            tracing::debug!("Correlator terminated: {}", cause);
        }

        if let Some(request) = in_flight {
            let _ = request
                .reply_tx
                .send(Err(NetconfError::SessionTerminated(cause.clone())));
        }
        for request in state.queue.drain(..) {
            let _ = request
                .reply_tx
                .send(Err(NetconfError::SessionTerminated(cause.clone())));
        }
        state.terminated = Some(cause);
    }

    /// Requests not yet answered, excluding cancelled ones.
    pub fn pending(&self) -> usize {
        let state = self.lock();
        let queued = state
            .queue
            .iter()
            .filter(|r| r.status.load(Ordering::Acquire) == QUEUED)
            .count();
        queued + usize::from(state.in_flight.is_some())
    }

    /// Message-id of the request awaiting its reply.
    pub fn in_flight(&self) -> Option<String> {
        self.lock().in_flight.as_ref().map(|r| r.message_id.clone())
    }

    /// Why the correlator was terminated, if it was.
    pub fn termination_cause(&self) -> Option<TerminationCause> {
        self.lock().terminated.clone()
    }

    /// Check if the correlator was terminated.
    pub fn is_terminated(&self) -> bool {
        self.lock().terminated.is_some()
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Correlator")
            .field("queued", &state.queue.len())
            .field(
                "in_flight",
                &state.in_flight.as_ref().map(|r| r.message_id.as_str()),
            )
            .field("terminated", &state.terminated)
            .finish()
    }
}

/// Resolves with the reply to one submitted request.
///
/// Dropping the future while the request is still queued cancels it.
#[derive(Debug)]
#[must_use = "dropping a ReplyFuture cancels the request if it is still queued"]
pub struct ReplyFuture {
    message_id: String,
    status: Arc<AtomicU8>,
    rx: oneshot::Receiver<Result<Node>>,
}

impl ReplyFuture {
    /// Message-id assigned to the request.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Current status of the request.
    pub fn status(&self) -> RequestStatus {
        RequestStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Cancel the request if it has not been sent.
    ///
    /// Returns `false` if it was already sent (or cancelled).
    pub fn cancel(&self) -> bool {
        self.status
            .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Future for ReplyFuture {
    type Output = Result<Node>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.status.load(Ordering::Acquire) == CANCELLED {
            return Poll::Ready(Err(NetconfError::Cancelled));
        }

        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(NetconfError::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ReplyFuture {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::BASE_NAMESPACE;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<Node>>,
        fail_with: Mutex<Option<fn() -> NetconfError>>,
    }

    impl Recorder {
        fn sent_ids(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|n| message_id(n).map(str::to_string))
                .collect()
        }
    }

    impl Transmit for Recorder {
        fn transmit(&self, rpc: &Node) -> Result<()> {
            if let Some(make_err) = *self.fail_with.lock().unwrap() {
                return Err(make_err());
            }
            self.sent.lock().unwrap().push(rpc.clone());
            Ok(())
        }
    }

    fn setup() -> (Correlator, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (Correlator::new(recorder.clone()), recorder)
    }

    fn reply(id: &str) -> Node {
        Node::builder_ns(BASE_NAMESPACE, "rpc-reply")
            .attribute("message-id", id)
            .child(Node::empty_ns(BASE_NAMESPACE, "ok"))
            .build()
            .unwrap()
    }

    fn op(name: &str) -> Node {
        Node::empty_ns(BASE_NAMESPACE, name)
    }

    #[tokio::test]
    async fn test_fifo_one_in_flight() {
        let (correlator, recorder) = setup();

        let first = correlator.submit(op("get"));
        let second = correlator.submit(op("commit"));
        assert_eq!(recorder.sent_ids(), vec!["1"]);
        assert_eq!(first.status(), RequestStatus::Sent);
        assert_eq!(second.status(), RequestStatus::Queued);
        assert_eq!(correlator.pending(), 2);

        assert_eq!(correlator.on_reply(reply("1")).unwrap(), ReplyRouting::Delivered);
        assert_eq!(recorder.sent_ids(), vec!["1", "2"]);

        let r1 = first.await.unwrap();
        assert_eq!(message_id(&r1), Some("1"));

        correlator.on_reply(reply("2")).unwrap();
        assert_eq!(message_id(&second.await.unwrap()), Some("2"));
        assert_eq!(correlator.pending(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_request_never_sent() {
        let (correlator, recorder) = setup();

        let first = correlator.submit(op("get"));
        let second = correlator.submit(op("lock"));
        let third = correlator.submit(op("unlock"));

        assert!(second.cancel());
        assert!(!first.cancel());
        assert!(matches!(second.await, Err(NetconfError::Cancelled)));

        correlator.on_reply(reply("1")).unwrap();
        assert_eq!(recorder.sent_ids(), vec!["1", "3"]);
        assert!(first.await.is_ok());

        correlator.on_reply(reply("3")).unwrap();
        assert!(third.await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_future_cancels() {
        let (correlator, recorder) = setup();

        let first = correlator.submit(op("get"));
        drop(correlator.submit(op("lock")));
        let third = correlator.submit(op("unlock"));
        assert_eq!(correlator.pending(), 2);

        correlator.on_reply(reply("1")).unwrap();
        assert_eq!(recorder.sent_ids(), vec!["1", "3"]);
        drop(first);
        drop(third);
    }

    #[tokio::test]
    async fn test_mismatch_is_fatal() {
        let (correlator, _recorder) = setup();

        let first = correlator.submit(op("get"));
        let second = correlator.submit(op("commit"));

        let err = correlator.on_reply(reply("9")).unwrap_err();
        assert!(matches!(
            err,
            NetconfError::Correlation { ref expected, ref received }
                if expected == "1" && received.as_deref() == Some("9")
        ));
        assert!(err.is_fatal());
        assert!(correlator.is_terminated());

        for future in [first, second] {
            assert!(matches!(
                future.await,
                Err(NetconfError::SessionTerminated(TerminationCause::Correlation(_)))
            ));
        }

        let late = correlator.submit(op("get"));
        assert!(matches!(late.await, Err(NetconfError::SessionTerminated(_))));
    }

    #[tokio::test]
    async fn test_unsolicited_routing() {
        let (correlator, _recorder) = setup();

        let notification = Node::empty_ns("urn:ietf:params:xml:ns:netconf:notification:1.0", "notification");
        assert_eq!(
            correlator.on_reply(notification.clone()).unwrap(),
            ReplyRouting::Unsolicited(notification)
        );

        let stray = reply("5");
        assert_eq!(
            correlator.on_reply(stray.clone()).unwrap(),
            ReplyRouting::Unsolicited(stray)
        );
        assert!(!correlator.is_terminated());
    }

    #[tokio::test]
    async fn test_terminate_fails_pending() {
        let (correlator, _recorder) = setup();
        let first = correlator.submit(op("get"));
        let second = correlator.submit(op("get"));

        correlator.terminate(TerminationCause::PeerClosed);
        correlator.terminate(TerminationCause::LocalClose);
        assert_eq!(correlator.termination_cause(), Some(TerminationCause::PeerClosed));

        for future in [first, second] {
            assert!(matches!(
                future.await,
                Err(NetconfError::SessionTerminated(TerminationCause::PeerClosed))
            ));
        }
    }

    #[tokio::test]
    async fn test_backpressure_fails_only_request() {
        let (correlator, recorder) = setup();
        *recorder.fail_with.lock().unwrap() = Some(|| NetconfError::QueueFull);

        let first = correlator.submit(op("get"));
        assert!(matches!(first.await, Err(NetconfError::QueueFull)));
        assert!(!correlator.is_terminated());

        *recorder.fail_with.lock().unwrap() = None;
        let second = correlator.submit(op("get"));
        assert_eq!(second.message_id(), "2");
        assert_eq!(recorder.sent_ids(), vec!["2"]);
    }

    #[tokio::test]
    async fn test_closed_transport_terminates() {
        let (correlator, recorder) = setup();
        *recorder.fail_with.lock().unwrap() = Some(|| NetconfError::ConnectionClosed);

        let first = correlator.submit(op("get"));
        assert!(matches!(first.await, Err(NetconfError::ConnectionClosed)));
        assert_eq!(correlator.termination_cause(), Some(TerminationCause::PeerClosed));
    }
}
