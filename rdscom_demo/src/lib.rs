//! A request/response exchange between two `rdscom` peers.
//!
//! The client asks about a car, the server answers with a person, and every answer
//! triggers a new question. Both ends are ordinary [`CommunicationInterface`]s; only the
//! callbacks registered on each side differ.

use std::{cell::Cell, rc::Rc, sync::Arc};

pub use rdscom_network as network;
pub use rdscom_utils as utils;

use network::{
    Channel, CommunicationInterface, InterfaceError, InterfaceOptions, UsageError,
    rdscom_proto::{FieldType, Message, MessageType, Prototype},
};
use utils::TimeSource;

pub mod client;
pub mod server;

/// Handle of the person prototype.
pub const PERSON: u8 = 0;
/// Handle of the car prototype.
pub const CAR: u8 = 1;

/// `person { id: i8, age: u8 }`
pub fn person_prototype() -> Arc<Prototype> {
    Arc::new(
        Prototype::new(PERSON)
            .with_field("id", FieldType::I8)
            .with_field("age", FieldType::U8),
    )
}

/// `car { make: byte, model: byte, year: u16 }`
pub fn car_prototype() -> Arc<Prototype> {
    Arc::new(
        Prototype::new(CAR)
            .with_field("make", FieldType::Byte)
            .with_field("model", FieldType::Byte)
            .with_field("year", FieldType::U16),
    )
}

/// Creates an interface knowing both prototypes, with no callbacks.
pub fn interface<C: Channel, T: TimeSource>(
    channel: C,
    clock: T,
    options: InterfaceOptions,
) -> Result<CommunicationInterface<C, T>, UsageError> {
    let mut iface = CommunicationInterface::new(channel, clock, options);

    iface
        .add_prototype(person_prototype())?
        .add_prototype(car_prototype())?;

    Ok(iface)
}

/// Number of answers a client has received so far.
#[derive(Debug, Clone, Default)]
pub struct Exchanges(Rc<Cell<u32>>);

impl Exchanges {
    #[inline(always)]
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    #[inline(always)]
    fn bump(&self) {
        self.0.set(self.0.get().wrapping_add(1));
    }
}

/// Fills in the car every request asks about.
fn fill_car(message: &mut Message) -> Result<(), network::rdscom_proto::FieldError> {
    message.set_field("make", network::rdscom_proto::FieldValue::Byte(1))?;
    message.set_field("model", network::rdscom_proto::FieldValue::Byte(2))?;
    message.set_field("year", 2020u16)?;
    Ok(())
}

/// Ticks both ends once, client first.
pub fn tick_both<C1: Channel, T1: TimeSource, C2: Channel, T2: TimeSource>(
    client: &mut CommunicationInterface<C1, T1>,
    server: &mut CommunicationInterface<C2, T2>,
) -> Result<(), InterfaceError> {
    client.tick()?;
    server.tick()
}
