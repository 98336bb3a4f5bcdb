//! The communication interface.
//!
//! A [`CommunicationInterface`] owns a [`Channel`] and a clock, and implements the
//! message exchange on top of them:
//!
//! - a registry of prototypes, keyed by handle, used to decode incoming frames,
//! - callbacks, keyed by prototype handle and message type, invoked in registration
//!   order for every matching message (incoming, or outgoing requests, see below),
//! - a shared sequence counter,
//! - a table of requests awaiting acknowledgment, retransmitted by [`tick`] until a
//!   response with the same sequence number arrives, or retries run out.
//!
//! The interface is single-threaded and poll-driven: nothing happens between calls to
//! [`listen`] and [`tick`].
//!
//! [`tick`]: CommunicationInterface::tick
//! [`listen`]: CommunicationInterface::listen

mod context;
mod pending;

pub use context::Context;

use std::{collections::VecDeque, sync::Arc};

use context::Outgoing;
use pending::{Expiry, PendingAcks};
use rdscom_proto::{Message, MessageType, Prototype, RESERVED_HANDLE, SequenceCounter};
use rdscom_utils::TimeSource;
use rustc_hash::FxBuildHasher;

use crate::{Channel, InterfaceError, InterfaceOptions, UsageError};

/// Error type callbacks may return.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Return type of callbacks.
pub type CallbackResult = Result<(), CallbackError>;

/// A message callback.
pub type Callback = Box<dyn FnMut(&Message, &mut Context<'_>) -> CallbackResult>;

/// Invoked once, with the original request, when a request exhausts its retries.
pub type FailureCallback = Box<dyn FnOnce(&Message)>;

/// Hash map storing registered prototypes, keyed by handle.
pub(crate) type PrototypeMap = rustc_hash::FxHashMap<u8, Arc<Prototype>>;

/// Hash map storing callbacks, keyed by prototype handle.
type CallbackMap = rustc_hash::FxHashMap<u8, Vec<Callback>>;

/// Sends, receives and dispatches messages over a [`Channel`].
///
/// See the [module level documentation](self) for an overview.
pub struct CommunicationInterface<C, T> {
    channel: C,
    clock: T,
    options: InterfaceOptions,
    prototypes: PrototypeMap,
    /// One table per message type, indexed by [`MessageType::index`].
    callbacks: [CallbackMap; MessageType::ALL.len()],
    pending: PendingAcks,
    sequence: SequenceCounter,
    /// Messages queued by callbacks.
    outbox: VecDeque<Outgoing>,
    last_received_ms: u64,
}

impl<C: Channel, T: TimeSource> CommunicationInterface<C, T> {
    /// Creates an interface with no registered prototypes or callbacks.
    pub fn new(channel: C, clock: T, options: InterfaceOptions) -> Self {
        let last_received_ms = clock.now_ms();

        Self {
            channel,
            clock,
            options,
            prototypes: PrototypeMap::with_hasher(FxBuildHasher),
            callbacks: core::array::from_fn(|_| CallbackMap::with_hasher(FxBuildHasher)),
            pending: PendingAcks::new(),
            sequence: SequenceCounter::default(),
            outbox: VecDeque::new(),
            last_received_ms,
        }
    }

    /// Creates an interface using the default [`InterfaceOptions`].
    #[inline]
    pub fn with_default_options(channel: C, clock: T) -> Self {
        Self::new(channel, clock, InterfaceOptions::default())
    }

    /// Registers `prototype` under its identifier, replacing any prototype previously
    /// registered under the same handle.
    ///
    /// Fails, leaving the registry unchanged, if the prototype uses the reserved
    /// identifier.
    pub fn add_prototype(
        &mut self,
        prototype: impl Into<Arc<Prototype>>,
    ) -> Result<&mut Self, UsageError> {
        let prototype = prototype.into();
        let handle = prototype.identifier();

        if handle == RESERVED_HANDLE {
            log::error!("refusing to register a prototype with reserved handle {handle}");
            return Err(UsageError::ReservedPrototype(handle));
        }

        if self.prototypes.insert(handle, prototype).is_some() {
            log::debug!("replaced prototype {handle}");
        } else {
            log::debug!("registered prototype {handle}");
        }

        Ok(self)
    }

    /// Returns the prototype registered under `handle`.
    #[inline(always)]
    pub fn prototype(&self, handle: u8) -> Option<&Arc<Prototype>> {
        self.prototypes.get(&handle)
    }

    /// Appends `callback` to those invoked for messages of type `message_type` using the
    /// prototype `handle`.
    ///
    /// The prototype doesn't need to be registered yet.
    pub fn add_callback(
        &mut self,
        handle: u8,
        message_type: MessageType,
        callback: impl FnMut(&Message, &mut Context<'_>) -> CallbackResult + 'static,
    ) -> &mut Self {
        self.callbacks[message_type.index()]
            .entry(handle)
            .or_default()
            .push(Box::new(callback));

        self
    }

    /// Returns the next sequence number, and advances the counter.
    #[inline(always)]
    pub fn next_sequence_number(&mut self) -> u16 {
        self.sequence.next()
    }

    /// Builds a zero-filled message for the prototype registered under `handle`,
    /// with a fresh sequence number.
    pub fn new_message(
        &mut self,
        message_type: MessageType,
        handle: u8,
    ) -> Result<Message, UsageError> {
        let prototype = self
            .prototype(handle)
            .cloned()
            .ok_or(UsageError::UnknownPrototype(handle))?;

        let seq = self.next_sequence_number();

        Message::from_prototype(message_type, prototype, seq)
            .map_err(|_| UsageError::ReservedPrototype(handle))
    }

    /// Sends `message`.
    ///
    /// If `ack_required` is set and `message` is a request, it is retransmitted by
    /// [`tick`](Self::tick) until acknowledged. The first time a given sequence number
    /// is registered this way, the request callbacks for its prototype are invoked with
    /// the outgoing message.
    ///
    /// Requesting acknowledgment of a response is an error, reported after the
    /// response is sent.
    pub fn send_message(
        &mut self,
        message: Message,
        ack_required: bool,
    ) -> Result<(), InterfaceError> {
        self.send_and_flush(Outgoing {
            message,
            ack_required,
            on_failure: None,
        })
    }

    /// Sends `message`, requiring acknowledgment. `on_failure` is invoked once, with
    /// `message`, if it is never acknowledged.
    pub fn send_message_with_failure(
        &mut self,
        message: Message,
        on_failure: impl FnOnce(&Message) + 'static,
    ) -> Result<(), InterfaceError> {
        self.send_and_flush(Outgoing {
            message,
            ack_required: true,
            on_failure: Some(Box::new(on_failure)),
        })
    }

    /// Receives at most one datagram from the channel and dispatches it.
    ///
    /// Datagrams naming an unknown prototype, or that fail to decode, are logged and
    /// dropped. A response whose sequence number matches a pending request acknowledges
    /// it. Then, callbacks registered for the message's prototype and type are invoked in
    /// order. If one fails, the rest are skipped and the error is returned.
    ///
    /// Messages queued by callbacks are sent before returning, even if a callback failed.
    pub fn listen(&mut self) -> Result<(), InterfaceError> {
        let bytes = self.channel.receive()?;

        if bytes.is_empty() {
            return Ok(());
        }

        let dispatched = self.on_datagram(&bytes);
        let flushed = self.flush_outbox();

        dispatched.and(flushed)
    }

    /// Listens, then retransmits every pending request whose retry timeout elapsed.
    ///
    /// A request that was already retried `max_retries` times is dropped instead, and its
    /// failure callback, if any, is invoked.
    ///
    /// Retries are handled even if `listen` fails, so a broken receive path doesn't keep
    /// requests pending forever. Channel errors during retransmission don't interrupt the
    /// others. The first error encountered, `listen`'s included, is returned.
    pub fn tick(&mut self) -> Result<(), InterfaceError> {
        let listened = self.listen();

        if let Err(e) = &listened {
            log::error!("listen failed during tick: {e}");
        }

        let retried = self.retry_expired();

        listened.and(retried)
    }

    /// Milliseconds elapsed since a message was last received, or since this interface
    /// was created if none was.
    #[inline]
    pub fn time_since_last_received(&self) -> u64 {
        self.clock.now_ms().saturating_sub(self.last_received_ms)
    }

    /// Number of requests awaiting acknowledgment.
    #[inline(always)]
    pub fn pending_acks(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if the request with sequence number `seq` awaits acknowledgment.
    #[inline(always)]
    pub fn is_pending(&self, seq: u16) -> bool {
        self.pending.contains(seq)
    }

    /// Number of times the pending request `seq` was sent again.
    #[inline(always)]
    pub fn retries(&self, seq: u16) -> Option<u8> {
        self.pending.get(seq).map(|s| s.retries)
    }

    #[inline(always)]
    pub const fn options(&self) -> &InterfaceOptions {
        &self.options
    }

    #[inline(always)]
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    #[inline(always)]
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    #[inline(always)]
    pub const fn clock(&self) -> &T {
        &self.clock
    }

    fn retry_expired(&mut self) -> Result<(), InterfaceError> {
        let now = self.clock.now_ms();
        let InterfaceOptions {
            max_retries,
            retry_timeout_ms,
        } = self.options;

        let mut result = Ok(());
        let mut exhausted = Vec::new();

        for seq in self.pending.take_expired(now) {
            match self.pending.expire(seq, now, retry_timeout_ms, max_retries) {
                Some(Expiry::Retry {
                    bytes,
                    waited_ms,
                    attempt,
                }) => {
                    log::debug!(
                        "retrying request {seq} after {waited_ms} ms ({attempt}/{max_retries})"
                    );

                    if let Err(e) = self.channel.send(&bytes) {
                        log::error!("failed to resend request {seq}: {e}");
                        if result.is_ok() {
                            result = Err(e.into());
                        }
                    }
                }
                Some(Expiry::Exhausted) => exhausted.push(seq),
                None => {}
            }
        }

        for seq in exhausted {
            let Some(sent) = self.pending.acknowledge(seq) else {
                continue;
            };

            log::warn!(
                "request {seq} unacknowledged after {} retries, giving up",
                sent.retries
            );

            if let Some(on_failure) = sent.on_failure {
                on_failure(&sent.message);
            }
        }

        result
    }

    fn send_and_flush(&mut self, outgoing: Outgoing) -> Result<(), InterfaceError> {
        let sent = self.send_one(outgoing);
        let flushed = self.flush_outbox();

        sent.and(flushed)
    }

    fn flush_outbox(&mut self) -> Result<(), InterfaceError> {
        let mut result = Ok(());

        while let Some(outgoing) = self.outbox.pop_front() {
            let r = self.send_one(outgoing);
            if result.is_ok() {
                result = r;
            }
        }

        result
    }

    fn send_one(&mut self, outgoing: Outgoing) -> Result<(), InterfaceError> {
        let Outgoing {
            message,
            ack_required,
            on_failure,
        } = outgoing;

        let seq = message.sequence_number();

        self.channel.send(&message.serialize())?;

        log::trace!(
            "sent {} {seq} (prototype {})",
            message.message_type(),
            message.prototype_handle(),
        );

        if !ack_required {
            return Ok(());
        }

        match message.message_type() {
            MessageType::Request => {
                let now = self.clock.now_ms();

                // the pending table owns the message, keep a copy for callbacks
                let first = self.pending.insert(
                    message.clone(),
                    now,
                    self.options.retry_timeout_ms,
                    on_failure,
                );

                if first {
                    self.run_callbacks(&message, now)?;
                }

                Ok(())
            }
            MessageType::Response => {
                log::warn!("acknowledgment requested for response {seq}, ignoring");
                Err(UsageError::AckOnResponse(seq).into())
            }
            MessageType::Error => {
                log::warn!("acknowledgment requested for error message {seq}, ignoring");
                Ok(())
            }
        }
    }

    fn on_datagram(&mut self, bytes: &[u8]) -> Result<(), InterfaceError> {
        let handle = Message::peek_prototype_handle(bytes);

        let Some(prototype) = self.prototypes.get(&handle) else {
            log::warn!(
                "dropping {} byte datagram, no prototype registered with handle {handle}",
                bytes.len()
            );
            return Ok(());
        };

        let message = match Message::deserialize(Arc::clone(prototype), bytes) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("dropping malformed datagram for prototype {handle}: {e}");
                return Ok(());
            }
        };

        let now = self.clock.now_ms();
        self.last_received_ms = now;

        let seq = message.sequence_number();

        log::trace!(
            "received {} {seq} (prototype {handle})",
            message.message_type()
        );

        if message.message_type() == MessageType::Response
            && self.pending.acknowledge(seq).is_some()
        {
            log::debug!("request {seq} acknowledged");
        }

        self.run_callbacks(&message, now)
    }

    fn run_callbacks(&mut self, message: &Message, now_ms: u64) -> Result<(), InterfaceError> {
        let Self {
            prototypes,
            callbacks,
            sequence,
            outbox,
            ..
        } = self;

        let Some(callbacks) =
            callbacks[message.message_type().index()].get_mut(&message.prototype_handle())
        else {
            return Ok(());
        };

        let mut cx = Context {
            prototypes,
            sequence,
            outbox,
            now_ms,
        };

        for callback in callbacks {
            callback(message, &mut cx).map_err(|e| {
                log::error!(
                    "{} callback for prototype {} failed: {e}",
                    message.message_type(),
                    message.prototype_handle()
                );
                InterfaceError::Callback(e)
            })?;
        }

        Ok(())
    }
}
