use std::{collections::VecDeque, sync::Arc};

use rdscom_proto::{Message, MessageType, Prototype, SequenceCounter};

use super::{FailureCallback, PrototypeMap};
use crate::UsageError;

/// A message queued by a callback, sent once dispatch is over.
pub(crate) struct Outgoing {
    pub(crate) message: Message,
    pub(crate) ack_required: bool,
    pub(crate) on_failure: Option<FailureCallback>,
}

/// What a callback can do with the interface that invoked it.
///
/// Callbacks run while the interface is busy dispatching, so they can't borrow it.
/// Instead, they get this handle: it can look up registered prototypes, allocate
/// sequence numbers, and queue messages. Queued messages are sent, in order, right
/// after the current dispatch round, exactly as if passed to
/// [`send_message`](super::CommunicationInterface::send_message).
pub struct Context<'a> {
    pub(crate) prototypes: &'a PrototypeMap,
    pub(crate) sequence: &'a mut SequenceCounter,
    pub(crate) outbox: &'a mut VecDeque<Outgoing>,
    pub(crate) now_ms: u64,
}

impl Context<'_> {
    /// Returns the prototype registered under `handle`.
    #[inline(always)]
    pub fn prototype(&self, handle: u8) -> Option<&Arc<Prototype>> {
        self.prototypes.get(&handle)
    }

    /// Allocates a fresh sequence number, shared with the interface.
    #[inline(always)]
    pub fn next_sequence_number(&mut self) -> u16 {
        self.sequence.next()
    }

    /// The time at which this dispatch round started, in milliseconds.
    #[inline(always)]
    pub const fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Builds a zero-filled message for the prototype registered under `handle`.
    ///
    /// A fresh sequence number is allocated, except for responses, which should be built
    /// with [`Message::response_to`] instead.
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

    /// Builds a zero-filled response to `request`, using the request's prototype.
    #[inline]
    pub fn response_to(&self, request: &Message) -> Result<Message, UsageError> {
        self.response_to_prototype(request, request.prototype_handle())
    }

    /// Builds a zero-filled response to `request`, using the prototype registered under
    /// `handle`.
    pub fn response_to_prototype(
        &self,
        request: &Message,
        handle: u8,
    ) -> Result<Message, UsageError> {
        let prototype = self
            .prototype(handle)
            .cloned()
            .ok_or(UsageError::UnknownPrototype(handle))?;

        Message::response_to_prototype(request, prototype)
            .map_err(|_| UsageError::ReservedPrototype(handle))
    }

    /// Queues `message` to be sent after dispatch.
    #[inline]
    pub fn send(&mut self, message: Message, ack_required: bool) {
        self.outbox.push_back(Outgoing {
            message,
            ack_required,
            on_failure: None,
        });
    }

    /// Queues `message` to be sent after dispatch, as a request requiring acknowledgment.
    ///
    /// `on_failure` runs once if every retry goes unacknowledged.
    #[inline]
    pub fn send_with_failure(
        &mut self,
        message: Message,
        on_failure: impl FnOnce(&Message) + 'static,
    ) {
        self.outbox.push_back(Outgoing {
            message,
            ack_required: true,
            on_failure: Some(Box::new(on_failure)),
        });
    }

    /// Number of messages queued so far.
    #[inline(always)]
    pub fn queued(&self) -> usize {
        self.outbox.len()
    }
}
