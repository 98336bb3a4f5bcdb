use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    sync::Arc,
};

use rdscom_network::{
    Channel, CommunicationInterface, InterfaceError, InterfaceOptions, UsageError,
    channel::{MemoryChannel, linked_pair},
};
use rdscom_proto::{FieldType, FieldValue, Message, MessageType, Prototype, TypedBuffer};
use rdscom_utils::{ManualClock, TimeSource};

const CAR: u8 = 1;
const PERSON: u8 = 0;

fn car() -> Arc<Prototype> {
    Arc::new(
        Prototype::new(CAR)
            .with_field("make", FieldType::Byte)
            .with_field("model", FieldType::Byte)
            .with_field("year", FieldType::U16),
    )
}

fn person() -> Arc<Prototype> {
    Arc::new(
        Prototype::new(PERSON)
            .with_field("id", FieldType::I8)
            .with_field("age", FieldType::U8),
    )
}

type TestInterface = CommunicationInterface<MemoryChannel, ManualClock>;

fn interface(options: InterfaceOptions) -> (TestInterface, ManualClock) {
    let clock = ManualClock::new();
    let mut iface = CommunicationInterface::new(MemoryChannel::new(), clock.clone(), options);
    iface.add_prototype(car()).unwrap().add_prototype(person()).unwrap();
    (iface, clock)
}

fn counter() -> (Rc<Cell<u32>>, impl FnOnce(&Message) + 'static) {
    let count = Rc::new(Cell::new(0));
    let c = Rc::clone(&count);
    (count, move |_: &Message| c.set(c.get() + 1))
}

#[test]
fn listen_without_data_does_nothing() {
    let (mut iface, _) = interface(InterfaceOptions::default());
    iface.listen().unwrap();
    iface.tick().unwrap();
    assert!(iface.channel().sent().is_empty());
}

#[test]
fn reserved_prototype_is_rejected() {
    let (mut iface, _) = interface(InterfaceOptions::default());

    let err = iface.add_prototype(Prototype::new(80)).err();
    assert_eq!(err, Some(UsageError::ReservedPrototype(80)));
    assert!(iface.prototype(80).is_none());
    assert!(iface.prototype(CAR).is_some());
}

#[test]
fn re_registering_replaces_prototype() {
    let (mut iface, _) = interface(InterfaceOptions::default());

    iface
        .add_prototype(Prototype::new(CAR).with_field("speed", FieldType::F32))
        .unwrap();

    let proto = iface.prototype(CAR).unwrap();
    assert_eq!(proto.field_names().collect::<Vec<_>>(), ["speed"]);
}

#[test]
fn acknowledged_request_is_never_retried() {
    let (mut iface, clock) = interface(InterfaceOptions::new(3, 100));
    let (failures, on_failure) = counter();

    let mut request = iface.new_message(MessageType::Request, CAR).unwrap();
    request.set_field("year", 2020u16).unwrap();
    let seq = request.sequence_number();

    iface
        .send_message_with_failure(request.clone(), on_failure)
        .unwrap();
    assert_eq!(iface.channel_mut().take_sent().len(), 1);
    assert!(iface.is_pending(seq));

    let response = Message::response_to(&request, TypedBuffer::new(car()).unwrap());
    iface.channel_mut().push_inbound(response.serialize());

    clock.advance(50);
    iface.tick().unwrap();
    assert_eq!(iface.pending_acks(), 0);

    for _ in 0..5 {
        clock.advance(1000);
        iface.tick().unwrap();
    }

    assert!(iface.channel().sent().is_empty());
    assert_eq!(failures.get(), 0);
}

#[test]
fn retries_exhaust_then_fail_once() {
    let (mut iface, clock) = interface(InterfaceOptions::new(3, 100));
    let (failures, on_failure) = counter();

    let request = iface.new_message(MessageType::Request, CAR).unwrap();
    let seq = request.sequence_number();
    let frame = request.serialize();

    iface.send_message_with_failure(request, on_failure).unwrap();
    assert_eq!(iface.channel_mut().take_sent(), [frame.clone()]);

    // not strictly past the timeout yet
    clock.advance(100);
    iface.tick().unwrap();
    assert!(iface.channel().sent().is_empty());

    for attempt in 1..=3 {
        clock.advance(1);
        iface.tick().unwrap();
        assert_eq!(iface.channel_mut().take_sent(), [frame.clone()]);
        assert_eq!(iface.retries(seq), Some(attempt));
        assert_eq!(failures.get(), 0);
        clock.advance(100);
    }

    clock.advance(1);
    iface.tick().unwrap();
    assert!(iface.channel().sent().is_empty());
    assert_eq!(failures.get(), 1);
    assert!(!iface.is_pending(seq));

    clock.advance(1000);
    iface.tick().unwrap();
    assert_eq!(failures.get(), 1);
}

#[test]
fn failure_callback_receives_original_request() {
    let (mut iface, clock) = interface(InterfaceOptions::new(0, 10));

    let mut request = iface.new_message(MessageType::Request, PERSON).unwrap();
    request.set_field("age", 42u8).unwrap();

    let failed = Rc::new(RefCell::new(None));
    let f = Rc::clone(&failed);

    iface
        .send_message_with_failure(request.clone(), move |m| *f.borrow_mut() = Some(m.clone()))
        .unwrap();

    clock.advance(11);
    iface.tick().unwrap();

    assert_eq!(failed.borrow().as_ref(), Some(&request));
    // max_retries = 0 means the request is sent exactly once
    assert_eq!(iface.channel().sent().len(), 1);
}

#[test]
fn request_callbacks_run_on_first_ack_registration_only() {
    let (mut iface, _) = interface(InterfaceOptions::default());
    let (calls, _) = counter();

    let c = Rc::clone(&calls);
    iface.add_callback(CAR, MessageType::Request, move |_, _| {
        c.set(c.get() + 1);
        Ok(())
    });

    let request = iface.new_message(MessageType::Request, CAR).unwrap();

    iface.send_message(request.clone(), true).unwrap();
    assert_eq!(calls.get(), 1);

    iface.send_message(request, true).unwrap();
    assert_eq!(calls.get(), 1);

    let unacked = iface.new_message(MessageType::Request, CAR).unwrap();
    iface.send_message(unacked, false).unwrap();
    assert_eq!(calls.get(), 1);

    assert_eq!(iface.channel().sent().len(), 3);
    assert_eq!(iface.pending_acks(), 1);
}

#[test]
fn ack_on_response_is_a_usage_error() {
    let (mut iface, _) = interface(InterfaceOptions::default());

    let request = iface.new_message(MessageType::Request, CAR).unwrap();
    let response = Message::response_to(&request, TypedBuffer::new(car()).unwrap());

    let err = iface.send_message(response, true).unwrap_err();
    assert_eq!(
        err.as_usage(),
        Some(UsageError::AckOnResponse(request.sequence_number()))
    );

    // still sent, never tracked
    assert_eq!(iface.channel().sent().len(), 1);
    assert_eq!(iface.pending_acks(), 0);
}

#[test]
fn callbacks_run_in_registration_order() {
    let (mut iface, _) = interface(InterfaceOptions::default());
    let order = Rc::new(RefCell::new(Vec::new()));

    for i in 0..3 {
        let o = Rc::clone(&order);
        iface.add_callback(PERSON, MessageType::Error, move |m, _| {
            o.borrow_mut().push((i, m.get::<u8>("age")?));
            Ok(())
        });
    }

    let mut msg = Message::from_prototype(MessageType::Error, person(), 7).unwrap();
    msg.set_field("age", 30u8).unwrap();
    iface.channel_mut().push_inbound(msg.serialize());

    iface.listen().unwrap();
    assert_eq!(*order.borrow(), [(0, 30), (1, 30), (2, 30)]);
}

#[test]
fn callbacks_are_keyed_by_type_and_handle() {
    let (mut iface, _) = interface(InterfaceOptions::default());
    let (calls, _) = counter();

    let c = Rc::clone(&calls);
    iface.add_callback(CAR, MessageType::Response, move |_, _| {
        c.set(c.get() + 1);
        Ok(())
    });

    let request = Message::from_prototype(MessageType::Request, car(), 1).unwrap();
    let other = Message::response_to(&request, TypedBuffer::new(person()).unwrap());

    iface.channel_mut().push_inbound(request.serialize());
    iface.channel_mut().push_inbound(other.serialize());
    iface.listen().unwrap();
    iface.listen().unwrap();
    assert_eq!(calls.get(), 0);

    let response = Message::response_to(&request, TypedBuffer::new(car()).unwrap());
    iface.channel_mut().push_inbound(response.serialize());
    iface.listen().unwrap();
    assert_eq!(calls.get(), 1);
}

#[test]
fn unknown_and_malformed_datagrams_are_dropped() {
    let (mut iface, clock) = interface(InterfaceOptions::default());
    let (calls, _) = counter();

    let c = Rc::clone(&calls);
    iface.add_callback(CAR, MessageType::Request, move |_, _| {
        c.set(c.get() + 1);
        Ok(())
    });

    let unknown = Prototype::new(9).with_field("x", FieldType::U32);
    let unknown = Message::from_prototype(MessageType::Request, unknown, 0).unwrap();

    let mut truncated = Message::from_prototype(MessageType::Request, car(), 0)
        .unwrap()
        .serialize();
    truncated.remove(8);

    let mut bad_end = Message::from_prototype(MessageType::Request, car(), 0)
        .unwrap()
        .serialize();
    *bad_end.last_mut().unwrap() = b'X';

    clock.advance(500);

    for datagram in [unknown.serialize(), truncated, bad_end, b"RD".to_vec()] {
        iface.channel_mut().push_inbound(datagram);
        iface.listen().unwrap();
    }

    assert_eq!(calls.get(), 0);
    assert_eq!(iface.time_since_last_received(), 500);
}

#[test]
fn last_received_tracks_valid_messages() {
    let (mut iface, clock) = interface(InterfaceOptions::default());

    clock.advance(250);
    assert_eq!(iface.time_since_last_received(), 250);

    let msg = Message::from_prototype(MessageType::Request, car(), 3).unwrap();
    iface.channel_mut().push_inbound(msg.serialize());
    iface.listen().unwrap();
    assert_eq!(iface.time_since_last_received(), 0);

    clock.advance(40);
    assert_eq!(iface.time_since_last_received(), 40);
}

#[test]
fn callback_errors_propagate_and_skip_the_rest() {
    let (mut iface, _) = interface(InterfaceOptions::default());
    let (later_calls, _) = counter();

    iface.add_callback(CAR, MessageType::Response, |_, _| Err("boom".into()));

    let c = Rc::clone(&later_calls);
    iface.add_callback(CAR, MessageType::Response, move |_, _| {
        c.set(c.get() + 1);
        Ok(())
    });

    let request = iface.new_message(MessageType::Request, CAR).unwrap();
    iface.send_message(request.clone(), true).unwrap();

    let response = Message::response_to(&request, TypedBuffer::new(car()).unwrap());
    iface.channel_mut().push_inbound(response.serialize());

    let err = iface.tick().unwrap_err();
    assert!(matches!(err, InterfaceError::Callback(ref e) if e.to_string() == "boom"));
    assert_eq!(later_calls.get(), 0);

    // the acknowledgment happened before the callbacks ran
    assert_eq!(iface.pending_acks(), 0);

    // the interface keeps working afterwards
    iface.tick().unwrap();
}

#[test]
fn closures_can_be_time_sources() {
    let now = Rc::new(Cell::new(0u64));
    let n = Rc::clone(&now);

    let mut iface = CommunicationInterface::new(
        MemoryChannel::new(),
        move || n.get(),
        InterfaceOptions::new(1, 10),
    );
    iface.add_prototype(car()).unwrap();

    let request = iface.new_message(MessageType::Request, CAR).unwrap();
    iface.send_message(request, true).unwrap();

    now.set(11);
    iface.tick().unwrap();
    assert_eq!(iface.channel().sent().len(), 2);
}

#[test]
fn new_message_needs_a_registered_prototype() {
    let (mut iface, _) = interface(InterfaceOptions::default());

    assert_eq!(
        iface.new_message(MessageType::Request, 42).unwrap_err(),
        UsageError::UnknownPrototype(42)
    );

    let a = iface.new_message(MessageType::Request, CAR).unwrap();
    let b = iface.new_message(MessageType::Request, CAR).unwrap();
    assert_eq!(b.sequence_number(), a.sequence_number().wrapping_add(1));
}

#[test]
fn callbacks_queue_replies_through_the_context() {
    let (mut iface, _) = interface(InterfaceOptions::default());

    iface.add_callback(CAR, MessageType::Request, |request, cx| {
        assert_eq!(cx.queued(), 0);

        let mut echo = cx.response_to(request)?;
        echo.set_field("year", request.get::<u16>("year")? + 1)?;
        cx.send(echo, false);

        let follow_up = cx.new_message(MessageType::Request, PERSON)?;
        cx.send(follow_up, true);

        assert_eq!(cx.queued(), 2);
        Ok(())
    });

    let mut request = Message::from_prototype(MessageType::Request, car(), 500).unwrap();
    request.set_field("year", 1999u16).unwrap();
    iface.channel_mut().push_inbound(request.serialize());

    iface.listen().unwrap();

    let sent = iface.channel_mut().take_sent();
    assert_eq!(sent.len(), 2);

    let echo = Message::deserialize(car(), &sent[0]).unwrap();
    assert_eq!(echo.message_type(), MessageType::Response);
    assert_eq!(echo.sequence_number(), 500);
    assert_eq!(echo.get::<u16>("year").unwrap(), 2000);

    let follow_up = Message::deserialize(person(), &sent[1]).unwrap();
    assert!(iface.is_pending(follow_up.sequence_number()));
    assert_eq!(iface.pending_acks(), 1);
}

#[test]
fn peers_exchange_request_and_response() {
    let (a_chan, b_chan) = linked_pair(256);
    let clock = ManualClock::new();
    let options = InterfaceOptions::new(3, 100);

    let mut a = CommunicationInterface::new(a_chan, clock.clone(), options);
    let mut b = CommunicationInterface::new(b_chan, clock.clone(), options);

    for iface in [&mut a, &mut b] {
        iface.add_prototype(car()).unwrap().add_prototype(person()).unwrap();
    }

    // b answers every car request with a person response, carrying the car's year
    b.add_callback(CAR, MessageType::Request, |request, cx| {
        let year: u16 = request.get("year")?;

        let mut response = cx.response_to_prototype(request, PERSON)?;
        response.set_field("age", (2024 - year) as u8)?;
        response.set_field("id", -1i8)?;

        cx.send(response, false);
        Ok(())
    });

    let received = Rc::new(RefCell::new(Vec::new()));
    let r = Rc::clone(&received);
    a.add_callback(PERSON, MessageType::Response, move |m, _| {
        r.borrow_mut()
            .push((m.sequence_number(), m.get_field("age")?, m.get_field("id")?));
        Ok(())
    });

    let mut request = a.new_message(MessageType::Request, CAR).unwrap();
    request.set_field("make", FieldValue::Byte(1)).unwrap();
    request.set_field("year", 2020u16).unwrap();
    let seq = request.sequence_number();

    a.send_message(request, true).unwrap();
    assert!(a.is_pending(seq));

    clock.advance(10);
    b.tick().unwrap();
    a.tick().unwrap();

    assert_eq!(
        *received.borrow(),
        [(seq, FieldValue::U8(4), FieldValue::I8(-1))]
    );
    assert_eq!(a.pending_acks(), 0);
}

/// Records sent frames, and fails on demand.
#[derive(Default)]
struct FaultyChannel {
    sent: Vec<Vec<u8>>,
    broken_receive: bool,
    /// Frames `send` refuses to write.
    rejected: Vec<Vec<u8>>,
}

impl Channel for FaultyChannel {
    fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        if self.rejected.iter().any(|r| r == bytes) {
            return Err(std::io::ErrorKind::BrokenPipe.into());
        }
        self.sent.push(bytes.to_vec());
        Ok(())
    }

    fn receive(&mut self) -> std::io::Result<Vec<u8>> {
        if self.broken_receive {
            return Err(std::io::ErrorKind::ConnectionReset.into());
        }
        Ok(Vec::new())
    }
}

fn faulty_interface(
    options: InterfaceOptions,
) -> (CommunicationInterface<FaultyChannel, ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    let mut iface =
        CommunicationInterface::new(FaultyChannel::default(), clock.clone(), options);
    iface.add_prototype(car()).unwrap().add_prototype(person()).unwrap();
    (iface, clock)
}

#[test]
fn retries_proceed_while_receive_fails() {
    let (mut iface, clock) = faulty_interface(InterfaceOptions::new(1, 10));
    let (failures, on_failure) = counter();

    let request = iface.new_message(MessageType::Request, CAR).unwrap();
    let seq = request.sequence_number();
    iface.send_message_with_failure(request, on_failure).unwrap();

    iface.channel_mut().broken_receive = true;

    for _ in 0..10 {
        clock.advance(100);
        let err = iface.tick().unwrap_err();
        assert!(
            matches!(err, InterfaceError::Io(ref e) if e.kind() == std::io::ErrorKind::ConnectionReset)
        );
    }

    // sent once, retried once, then given up on
    assert_eq!(iface.channel().sent.len(), 2);
    assert_eq!(failures.get(), 1);
    assert!(!iface.is_pending(seq));
}

#[test]
fn retries_proceed_after_callback_error() {
    let (mut iface, clock) = interface(InterfaceOptions::new(3, 100));

    iface.add_callback(PERSON, MessageType::Error, |_, _| Err("rejected".into()));

    let request = iface.new_message(MessageType::Request, CAR).unwrap();
    let seq = request.sequence_number();
    iface.send_message(request, true).unwrap();
    iface.channel_mut().take_sent();

    let error = Message::from_prototype(MessageType::Error, person(), 9).unwrap();
    iface.channel_mut().push_inbound(error.serialize());

    clock.advance(101);
    assert!(matches!(iface.tick(), Err(InterfaceError::Callback(_))));
    assert_eq!(iface.retries(seq), Some(1));
    assert_eq!(iface.channel().sent().len(), 1);
}

#[test]
fn ack_on_error_message_is_ignored() {
    let (mut iface, _) = interface(InterfaceOptions::default());

    let message = iface.new_message(MessageType::Error, PERSON).unwrap();
    iface.send_message(message, true).unwrap();

    assert_eq!(iface.channel().sent().len(), 1);
    assert_eq!(iface.pending_acks(), 0);
}

#[test]
fn unrelated_response_leaves_request_pending() {
    let clock = ManualClock::starting_at(10_000);
    let mut iface =
        CommunicationInterface::with_default_options(MemoryChannel::new(), clock.clone());
    iface.add_prototype(car()).unwrap();

    assert_eq!(iface.options(), &InterfaceOptions::default());
    assert_eq!(iface.clock().now_ms(), 10_000);

    let request = iface.new_message(MessageType::Request, CAR).unwrap();
    let seq = request.sequence_number();
    iface.send_message(request, true).unwrap();

    let other =
        Message::from_prototype(MessageType::Request, car(), seq.wrapping_add(100)).unwrap();
    let response = Message::response_to(&other, TypedBuffer::new(car()).unwrap());
    iface.channel_mut().push_inbound(response.serialize());
    assert_eq!(iface.channel().inbound_len(), 1);

    iface.tick().unwrap();
    assert_eq!(iface.channel().inbound_len(), 0);
    assert!(iface.is_pending(seq));
    assert_eq!(iface.time_since_last_received(), 0);

    clock.advance(InterfaceOptions::DEFAULT_RETRY_TIMEOUT_MS + 1);
    iface.tick().unwrap();

    assert_eq!(iface.retries(seq), Some(1));
    assert_eq!(iface.channel().sent().len(), 2);
}

#[test]
fn failed_resend_does_not_stop_the_others() {
    let (mut iface, clock) = faulty_interface(InterfaceOptions::new(3, 100));

    let first = iface.new_message(MessageType::Request, CAR).unwrap();
    let second = iface.new_message(MessageType::Request, PERSON).unwrap();
    let (first_seq, second_seq) = (first.sequence_number(), second.sequence_number());
    let (first_frame, second_frame) = (first.serialize(), second.serialize());

    iface.send_message(first, true).unwrap();
    iface.send_message(second, true).unwrap();

    iface.channel_mut().sent.clear();
    iface.channel_mut().rejected.push(first_frame);

    clock.advance(101);
    let err = iface.tick().unwrap_err();
    assert!(
        matches!(err, InterfaceError::Io(ref e) if e.kind() == std::io::ErrorKind::BrokenPipe)
    );

    assert_eq!(iface.channel().sent, [second_frame]);
    assert_eq!(iface.retries(first_seq), Some(1));
    assert_eq!(iface.retries(second_seq), Some(1));
}
