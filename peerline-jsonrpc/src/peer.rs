//! The [`Peer`] is the stateful heart of the crate: it turns a stream of inbound JSON values into
//! handler invocations and completed calls, and produces the stream of outbound JSON values that
//! answer them.
//!
//! A peer knows nothing about how messages travel.  Inbound messages are pushed in with
//! [`Peer::receive`], and everything the peer wants to send comes out of the [`Outbound`] stream
//! returned alongside it.  [`crate::Connection`] wires both ends to a [`crate::Transport`], but
//! nothing requires using it.
//!
//! Every peer is both a client and a server.  It can call methods on the remote peer with
//! [`Peer::start_call`] and friends, while at the same time answering calls from the remote peer
//! with whatever [`RequestHandler`] it was built with.
//!
//! All calls that are still waiting for a response are tracked in a single map keyed by request
//! id.  Each entry leaves that map exactly once, by whichever of these happens first: the
//! response (or error) arrives, its timeout fires, its handle is dropped, or the peer is closed.
//! Whatever comes second finds nothing in the map and does nothing.
use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{FutureExt, Stream};
use pin_project::{pin_project, pinned_drop};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{Instrument, instrument};

use crate::codec::{self, Inbound};
use crate::config::{CallOptions, PeerConfig};
use crate::dispatcher::Dispatcher;
use crate::event::{self, EventSink, PeerEvent};
use crate::handler::{HandlerError, HandlerResult, NotificationHandler, RequestHandler};
use crate::id_gen::{BoxedIdGenerator, CounterIdGenerator};
use crate::types::{self, ErrorCode, ErrorDetails, Id, Message, Params};
use crate::{JsonRpcError, Result};

/// Message sent to the remote peer in place of the details of an internal handler error
const INTERNAL_ERROR_MESSAGE: &str = "Internal error";

/// Builds a [`Peer`], optionally with handlers for calls and notifications from the remote peer.
///
/// A peer built without a request handler answers every call with "method not found".  One built
/// without a notification handler ignores all notifications.
pub struct PeerBuilder {
    pub(crate) config: PeerConfig,
    request_handler: Option<Arc<dyn RequestHandler>>,
    notification_handler: Option<Arc<dyn NotificationHandler>>,
    id_generator: BoxedIdGenerator,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl Default for PeerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerBuilder {
    pub fn new() -> Self {
        Self {
            config: PeerConfig::default(),
            request_handler: None,
            notification_handler: None,
            id_generator: Box::new(CounterIdGenerator::new()),
            event_sink: None,
        }
    }

    pub fn with_config(mut self, config: PeerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_request_handler(mut self, handler: impl RequestHandler) -> Self {
        self.request_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_notification_handler(mut self, handler: impl NotificationHandler) -> Self {
        self.notification_handler = Some(Arc::new(handler));
        self
    }

    /// Use `dispatcher` to handle both method calls and notifications.
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        let dispatcher = Arc::new(dispatcher);
        self.request_handler = Some(dispatcher.clone());
        self.notification_handler = Some(dispatcher);
        self
    }

    /// Replace the default [`CounterIdGenerator`] with some other source of request ids.
    pub fn with_id_generator(mut self, ids: impl Iterator<Item = Id> + Send + 'static) -> Self {
        self.id_generator = Box::new(ids);
        self
    }

    pub fn with_event_sink(mut self, sink: impl EventSink) -> Self {
        self.event_sink = Some(Arc::new(sink));
        self
    }

    /// Create the peer, and the stream of messages it produces for the remote peer.
    pub fn build(self) -> (Peer, Outbound) {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = Peer {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    outbound: Some(tx),
                    pending: HashMap::new(),
                    expired: ExpiredIds::new(self.config.max_expired_call_ids),
                    id_generator: self.id_generator,
                    next_call_seq: 0,
                }),
                config: self.config,
                request_handler: self.request_handler,
                notification_handler: self.notification_handler,
                event_sink: self.event_sink,
            }),
        };

        (peer, Outbound { receiver: rx })
    }
}

/// One end of a JSON-RPC conversation.
///
/// Cheap to clone; all clones operate on the same state.  Most operations are synchronous, but
/// anything that spawns work (handling inbound calls, arming call timeouts) must happen within a
/// Tokio runtime.
#[derive(Clone)]
pub struct Peer {
    inner: Arc<Inner>,
}

struct Inner {
    config: PeerConfig,
    request_handler: Option<Arc<dyn RequestHandler>>,
    notification_handler: Option<Arc<dyn NotificationHandler>>,
    event_sink: Option<Arc<dyn EventSink>>,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // None of the critical sections can leave the state inconsistent if they panic
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct State {
    /// `None` once the peer is closed
    outbound: Option<mpsc::UnboundedSender<JsonValue>>,

    /// Calls that have been sent, keyed by the request id that was passed to the remote peer.
    pending: HashMap<Id, PendingCall>,

    /// Calls that timed out or were abandoned, so that a late response can be ignored quietly
    expired: ExpiredIds,

    id_generator: BoxedIdGenerator,

    /// Distinguishes calls that reuse a request id, so a stale timer or handle can't complete
    /// the wrong call
    next_call_seq: u64,
}

struct PendingCall {
    method: String,
    seq: u64,
    sender: oneshot::Sender<Result<JsonValue>>,
    timer: Option<AbortHandle>,
}

impl PendingCall {
    /// Complete the caller's handle with `result`.  No-op if the handle was dropped already.
    fn complete(self, id: &Id, result: Result<JsonValue>) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        if self.sender.send(result).is_err() {
            tracing::trace!(request_id = %id, method = %self.method, "Caller is no longer waiting for the result");
        }
    }
}

/// Bounded memory of request ids whose calls ended without a response.
struct ExpiredIds {
    capacity: usize,
    order: VecDeque<Id>,
    ids: HashSet<Id>,
}

impl ExpiredIds {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    fn insert(&mut self, id: Id) {
        if self.capacity == 0 || !self.ids.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    /// Forget `id`, returning whether it was remembered.
    fn take(&mut self, id: &Id) -> bool {
        if self.ids.remove(id) {
            self.order.retain(|expired| expired != id);
            true
        } else {
            false
        }
    }

    fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }
}

impl Peer {
    /// Start a call to `method` on the remote peer.
    ///
    /// Fails immediately if the peer is closed, if `params` is neither an array nor an object, or
    /// if the id generator fails to produce a usable id.  A closed peer reports
    /// [`JsonRpcError::StreamClosed`] whatever the params.  Otherwise the request is queued for
    /// sending and the returned handle completes once the call does.
    ///
    /// # Panics
    ///
    /// When the call has a timeout (from `options` or [`PeerConfig::default_call_timeout`]), its
    /// timer is spawned on the Tokio runtime, so this must be called from within one.
    #[instrument(skip_all, fields(method))]
    pub fn start_call(
        &self,
        method: &str,
        params: impl Into<Option<JsonValue>>,
        options: CallOptions,
    ) -> Result<RawRequestHandle> {
        let params = params.into();
        let timeout = options.timeout.or(self.inner.config.default_call_timeout);
        let (sender, receiver) = oneshot::channel();

        let mut state = self.inner.lock();
        let Some(outbound) = state.outbound.clone().filter(|outbound| !outbound.is_closed()) else {
            drop(state);
            tracing::debug!("Peer is closed; rejecting call");
            self.close();
            return Err(JsonRpcError::StreamClosed);
        };
        let params = Params::from_optional(params)?;

        let Some(id) = state.id_generator.next() else {
            tracing::error!("Id generator is exhausted; cannot issue any more calls");
            return Err(JsonRpcError::IdGeneratorExhausted);
        };
        if state.pending.contains_key(&id) {
            tracing::error!(request_id = %id, "Id generator produced an id that is already in use");
            return Err(JsonRpcError::DuplicateRequestId { id });
        }

        let request = Message::Request(types::Request::new(id.clone(), method, params)).to_value()?;

        let seq = state.next_call_seq;
        state.next_call_seq += 1;
        let timer = timeout.map(|timeout| arm_timeout(Arc::downgrade(&self.inner), id.clone(), seq, timeout));
        state.pending.insert(
            id.clone(),
            PendingCall {
                method: method.to_string(),
                seq,
                sender,
                timer,
            },
        );
        let sent = outbound.send(request).is_ok();
        drop(state);

        if !sent {
            tracing::debug!(request_id = %id, "Outbound stream was dropped; closing peer");
            self.close();
            return Err(JsonRpcError::StreamClosed);
        }

        tracing::trace!(request_id = %id, ?timeout, "Sent method call");
        Ok(RawRequestHandle {
            receiver,
            request_id: id,
            method: method.to_string(),
            seq,
            peer: Arc::downgrade(&self.inner),
        })
    }

    /// Start a call to `method` with serializable params, whose result deserializes to `Resp`.
    ///
    /// # Panics
    ///
    /// Under the same conditions as [`Self::start_call`].
    pub fn start_call_with_params<Req, Resp>(
        &self,
        method: &str,
        params: Req,
        options: CallOptions,
    ) -> Result<RequestHandle<Resp>>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let params = serialize_params(params)?;
        Ok(RequestHandle {
            raw_handle: self.start_call(method, params, options)?,
            _type: PhantomData,
        })
    }

    /// Call a method without any parameters, awaiting a response.
    pub async fn call<Resp>(&self, method: &str) -> Result<Resp>
    where
        Resp: DeserializeOwned,
    {
        self.call_with_options(method, (), CallOptions::default()).await
    }

    /// Call a method with parameters, awaiting a response.
    pub async fn call_with_params<Req, Resp>(&self, method: &str, params: Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        self.call_with_options(method, params, CallOptions::default()).await
    }

    /// Call a method with parameters and per-call options, awaiting a response.
    pub async fn call_with_options<Req, Resp>(&self, method: &str, params: Req, options: CallOptions) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        self.start_call_with_params(method, params, options)?.await
    }

    /// Call a method with raw JSON params, awaiting the raw JSON result.
    ///
    /// In most cases callers should prefer [`Self::call`] or [`Self::call_with_params`]
    pub async fn call_raw(&self, method: &str, params: impl Into<Option<JsonValue>>) -> Result<JsonValue> {
        self.start_call(method, params, CallOptions::default())?.await
    }

    /// Send a notification to the remote peer.
    ///
    /// Only fails if `params` is neither an array nor an object.  Once the peer is closed this
    /// quietly does nothing.
    #[instrument(skip_all, fields(method))]
    pub fn notify(&self, method: &str, params: impl Into<Option<JsonValue>>) -> Result<()> {
        let params = Params::from_optional(params.into())?;
        self.send_value(types::build_notification(method, params));
        Ok(())
    }

    /// Send a notification with serializable params to the remote peer.
    pub fn notify_with_params<Req: Serialize>(&self, method: &str, params: Req) -> Result<()> {
        let params = serialize_params(params)?;
        self.notify(method, params)
    }

    /// Send an error message to the remote peer.
    ///
    /// Fails if the id or code in `error` are invalid.  Once the peer is closed this quietly does
    /// nothing.
    pub fn push_error(&self, error: types::ErrorSpec) -> Result<()> {
        let error = types::error_response_from_spec(error)?;
        self.send_message(Message::Error(error));
        Ok(())
    }

    /// Process one message from the remote peer.
    ///
    /// Never fails.  Anything wrong with the message is answered on the outbound stream and
    /// raised as a [`PeerEvent`].  Method calls and notifications are handed off to their
    /// handlers in a background task, so their responses may be sent in any order.
    ///
    /// Once the peer is closed, inbound messages are ignored.
    ///
    /// # Panics
    ///
    /// Handlers run on spawned Tokio tasks, so this must be called from within a Tokio runtime.
    pub fn receive(&self, inbound: impl Into<Inbound>) {
        if self.is_closed() {
            tracing::trace!("Peer is closed; ignoring inbound message");
            return;
        }

        let value = match inbound.into() {
            Inbound::Value(value) => value,
            Inbound::DecodeFault(reason) => {
                // The reason is for local eyes only; it says more about our decoder than the message
                tracing::debug!(%reason, "Inbound message could not be decoded");
                let details = ErrorDetails::parse_error(ErrorCode::ParseError.message(), None);
                self.reject_inbound(details);
                return;
            }
        };

        let message = match Message::parse(&value) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "Inbound value is not a valid JSON-RPC message");
                let details = ErrorDetails::invalid_request(ErrorCode::InvalidRequest.message(), value);
                self.reject_inbound(details);
                return;
            }
        };

        tracing::trace!(message = %message.describe(), "Received message");
        match message {
            Message::Request(request) => self.handle_request(request),
            Message::Notification(notification) => self.handle_notification(notification),
            Message::Response(response) => self.complete_call(response.id, Ok(response.result)),
            Message::Error(types::ErrorResponse { id: Some(id), error, .. }) => self.complete_call(id, Err(error)),
            Message::Error(types::ErrorResponse { id: None, error, .. }) => {
                self.emit(PeerEvent::Diagnostic(JsonRpcError::UnattributedError { error }));
            }
        }
    }

    /// Decode and process one message from the remote peer in text form.
    ///
    /// # Panics
    ///
    /// Outside a Tokio runtime, like [`Self::receive`].
    pub fn receive_text(&self, text: &str) {
        self.receive(codec::decode(text))
    }

    /// Close the peer, rejecting every call still waiting for a response.
    ///
    /// This is how the peer learns that the conversation is over; call it when the transport
    /// reaches end of stream.  The [`Outbound`] stream ends once it has yielded whatever was queued
    /// before the peer closed.  Closing an already closed peer does nothing.
    pub fn close(&self) {
        let pending = {
            let mut state = self.inner.lock();
            if state.outbound.take().is_none() {
                return;
            }
            state.expired.clear();
            std::mem::take(&mut state.pending)
        };

        tracing::debug!(pending_calls = pending.len(), "Peer closed; rejecting outstanding calls");
        for (id, call) in pending {
            call.complete(&id, Err(JsonRpcError::StreamClosed));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().outbound.is_none()
    }

    /// Number of outbound calls still waiting for a response
    pub fn pending_calls(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn config(&self) -> &PeerConfig {
        &self.inner.config
    }

    /// A reference to this peer that doesn't keep it alive.
    ///
    /// Handlers that need to call back into the peer they're attached to should hold one of
    /// these, since holding the peer itself would keep it alive forever.
    pub fn downgrade(&self) -> WeakPeer {
        WeakPeer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn handle_request(&self, request: types::Request) {
        let types::Request { id, method, params, .. } = request;

        let Some(handler) = self.inner.request_handler.clone() else {
            tracing::debug!(request_id = %id, %method, "No request handler; method not found");
            let details = ErrorDetails::method_not_found(ErrorCode::MethodNotFound.message(), None);
            self.send_message(Message::Error(types::ErrorResponse::new(id, details)));
            return;
        };

        let span = tracing::debug_span!("handle_request", request_id = %id, %method);
        let peer = self.clone();
        tokio::spawn(
            async move {
                let result = AssertUnwindSafe(handler.handle_request(&method, params))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(HandlerError::Internal(panic_error(panic))));
                peer.respond(id, method, result);
            }
            .instrument(span),
        );
    }

    fn handle_notification(&self, notification: types::Notification) {
        let types::Notification { method, params, .. } = notification;

        let Some(handler) = self.inner.notification_handler.clone() else {
            tracing::trace!(%method, "No notification handler; ignoring notification");
            return;
        };

        let span = tracing::debug_span!("handle_notification", %method);
        tokio::spawn(
            async move {
                if let Err(panic) = AssertUnwindSafe(handler.handle_notification(&method, params))
                    .catch_unwind()
                    .await
                {
                    tracing::debug!(error = ?panic_error(panic), "Notification handler panicked");
                }
            }
            .instrument(span),
        );
    }

    /// Send the outcome of a request handler back to the remote peer.
    fn respond(&self, id: Id, method: String, result: HandlerResult) {
        let message = match result {
            Ok(result) => Message::Response(types::Response::new(id, result)),
            Err(HandlerError::Rpc(details)) => {
                tracing::debug!(request_id = %id, code = details.code.code(), "Request handler returned an error");
                Message::Error(types::ErrorResponse::new(id, details))
            }
            Err(HandlerError::Internal(source)) => {
                let details = ErrorDetails::internal_error(INTERNAL_ERROR_MESSAGE, None);
                self.emit(PeerEvent::Diagnostic(JsonRpcError::HandlerFailed { method, source }));
                Message::Error(types::ErrorResponse::new(id, details))
            }
        };

        self.send_message(message);
    }

    /// Complete the pending call with id `id`, if there is one
    fn complete_call(&self, id: Id, outcome: Result<JsonValue, ErrorDetails>) {
        let found = {
            let mut state = self.inner.lock();
            match state.pending.remove(&id) {
                Some(call) => Ok(call),
                None => Err(state.expired.take(&id)),
            }
        };

        match found {
            Ok(call) => {
                let result = outcome.map_err(|error| JsonRpcError::MethodError {
                    method: call.method.clone(),
                    error,
                });
                call.complete(&id, result);
            }
            Err(true) => {
                tracing::trace!(request_id = %id, "Dropping late response to a call that already ended");
            }
            Err(false) => {
                self.emit(PeerEvent::Diagnostic(JsonRpcError::UnexpectedResponse { id }));
            }
        }
    }

    /// The timeout for the call `seq` with id `id` fired
    fn expire_call(&self, id: Id, seq: u64) {
        let call = {
            let mut state = self.inner.lock();
            if !state.pending.get(&id).is_some_and(|call| call.seq == seq) {
                return;
            }
            state.expired.insert(id.clone());
            state.pending.remove(&id)
        };

        if let Some(mut call) = call {
            tracing::debug!(request_id = %id, method = %call.method, "Call timed out");
            // This is the timer task, so there's nothing to abort
            call.timer = None;
            let error = JsonRpcError::Timeout {
                method: call.method.clone(),
                id: id.clone(),
            };
            call.complete(&id, Err(error));
        }
    }

    /// The handle for call `seq` with id `id` was dropped before the call completed
    fn abandon_call(&self, id: &Id, seq: u64) {
        let mut state = self.inner.lock();
        if !state.pending.get(id).is_some_and(|call| call.seq == seq) {
            return;
        }
        if let Some(call) = state.pending.remove(id) {
            if let Some(timer) = call.timer {
                timer.abort();
            }
            tracing::trace!(request_id = %id, method = %call.method, "Call abandoned by caller");
            state.expired.insert(id.clone());
        }
    }

    /// Answer an invalid inbound message with an error, and raise it as a protocol fault.
    fn reject_inbound(&self, details: ErrorDetails) {
        self.send_message(Message::Error(types::ErrorResponse::new(None, details.clone())));
        self.emit(PeerEvent::ProtocolFault(details));
    }

    fn send_message(&self, message: Message) {
        match message.to_value() {
            Ok(value) => self.send_value(value),
            Err(e) => {
                tracing::error!(error = %e, message = %message.describe(), "Failed to serialize outbound message");
            }
        }
    }

    fn send_value(&self, value: JsonValue) {
        let receiver_dropped = {
            let state = self.inner.lock();
            match &state.outbound {
                Some(outbound) => outbound.send(value).is_err(),
                None => {
                    tracing::trace!("Peer is closed; dropping outbound message");
                    false
                }
            }
        };

        if receiver_dropped {
            tracing::debug!("Outbound stream was dropped; closing peer");
            self.close();
        }
    }

    fn emit(&self, event: PeerEvent) {
        event::emit(self.inner.event_sink.as_ref(), event);
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("Peer")
            .field("closed", &state.outbound.is_none())
            .field("pending_calls", &state.pending.len())
            .finish()
    }
}

/// Non-owning reference to a [`Peer`], obtained from [`Peer::downgrade`].
#[derive(Clone, Default)]
pub struct WeakPeer {
    inner: Weak<Inner>,
}

impl WeakPeer {
    /// The peer, unless it has been dropped already.
    pub fn upgrade(&self) -> Option<Peer> {
        self.inner.upgrade().map(|inner| Peer { inner })
    }
}

impl fmt::Debug for WeakPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakPeer").finish_non_exhaustive()
    }
}

fn arm_timeout(peer: Weak<Inner>, id: Id, seq: u64, timeout: Duration) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if let Some(inner) = peer.upgrade() {
            Peer { inner }.expire_call(id, seq);
        }
    })
    .abort_handle()
}

fn serialize_params<Req: Serialize>(params: Req) -> Result<JsonValue> {
    serde_json::to_value(params).map_err(|e| JsonRpcError::SerRequest {
        source: e,
        type_name: std::any::type_name::<Req>(),
    })
}

fn panic_error(panic: Box<dyn Any + Send>) -> anyhow::Error {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    anyhow::anyhow!("Handler panicked: {message}")
}

/// Stream of JSON values the [`Peer`] wants sent to the remote peer, in the order it produced
/// them.
///
/// Ends once the peer is closed and everything queued before that has been yielded.  Dropping
/// this closes the peer as soon as it next tries to send something.
pub struct Outbound {
    receiver: mpsc::UnboundedReceiver<JsonValue>,
}

impl Outbound {
    /// The next message to send, or `None` once the peer is closed and drained.
    pub async fn next_message(&mut self) -> Option<JsonValue> {
        self.receiver.recv().await
    }

    /// The next message to send if one is already queued.
    pub fn try_next_message(&mut self) -> Option<JsonValue> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for Outbound {
    type Item = JsonValue;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Handle to an outbound method call whose result is arbitrary JSON.
///
/// Obtained from [`Peer::start_call`].  Awaiting it yields the result once the call completes.
/// Dropping it abandons the call; if a response arrives later it is quietly discarded.
#[pin_project(PinnedDrop)]
pub struct RawRequestHandle {
    #[pin]
    receiver: oneshot::Receiver<Result<JsonValue>>,
    request_id: Id,
    method: String,
    seq: u64,
    peer: Weak<Inner>,
}

impl RawRequestHandle {
    /// The request id assigned to this call.
    pub fn request_id(&self) -> &Id {
        &self.request_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

impl Future for RawRequestHandle {
    type Output = Result<JsonValue>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match futures::ready!(this.receiver.poll(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(_) => {
                // The peer itself is gone, taking the pending call with it
                tracing::debug!(request_id = %this.request_id, "Peer dropped while call was pending");
                Poll::Ready(Err(JsonRpcError::StreamClosed))
            }
        }
    }
}

#[pinned_drop]
impl PinnedDrop for RawRequestHandle {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        if let Some(inner) = this.peer.upgrade() {
            Peer { inner }.abandon_call(this.request_id, *this.seq);
        }
    }
}

impl fmt::Debug for RawRequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRequestHandle")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .finish()
    }
}

/// Handle to an outbound method call whose result is expected to deserialize into `T`.
///
/// Obtained from [`Peer::start_call_with_params`].  Behaves exactly like [`RawRequestHandle`],
/// except that the result is deserialized, failing with [`JsonRpcError::DeserResponse`] if it
/// doesn't fit.
#[pin_project]
pub struct RequestHandle<T> {
    #[pin]
    raw_handle: RawRequestHandle,

    _type: PhantomData<fn() -> T>,
}

impl<T> RequestHandle<T> {
    /// The request id assigned to this call.
    pub fn request_id(&self) -> &Id {
        self.raw_handle.request_id()
    }

    pub fn method(&self) -> &str {
        self.raw_handle.method()
    }
}

impl<T> Future for RequestHandle<T>
where
    T: DeserializeOwned,
{
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let response = futures::ready!(this.raw_handle.poll(cx))?;
        Poll::Ready(
            serde_json::from_value(response.clone()).map_err(|e| JsonRpcError::DeserResponse {
                source: e,
                type_name: std::any::type_name::<T>(),
                response,
            }),
        )
    }
}

impl<T> fmt::Debug for RequestHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("request_id", self.request_id())
            .field("method", &self.method())
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}
