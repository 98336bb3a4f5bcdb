//! Runtime side of the `rdscom` protocol.
//!
//! [`rdscom_proto`] defines what a message looks like. This crate moves messages between
//! peers: it owns a byte transport, keeps track of the prototypes both sides agreed on,
//! dispatches incoming messages to user callbacks, and retransmits requests until they
//! are acknowledged or run out of retries.
//!
//! ## Scope
//!
//! - A minimal transport abstraction ([`Channel`]) with in-memory and stream-backed
//!   implementations.
//! - The [`CommunicationInterface`], a single-threaded, poll-driven state machine. Nothing
//!   happens unless [`listen`](CommunicationInterface::listen) or
//!   [`tick`](CommunicationInterface::tick) is called.
//! - Configuration ([`InterfaceOptions`]) and error types.
//!
//! Time is read through [`TimeSource`](rdscom_utils::TimeSource), so retries can be
//! driven deterministically in tests.

pub mod channel;
pub mod error;
pub mod interface;
pub mod options;

pub use rdscom_proto;
pub use rdscom_utils;

pub use channel::Channel;
pub use error::{InterfaceError, UsageError};
pub use interface::{
    Callback, CallbackError, CallbackResult, CommunicationInterface, Context, FailureCallback,
};
pub use options::InterfaceOptions;

/// Returns `true` if the given I/O error kind represents a timeout condition.
///
/// This treats both `WouldBlock` and `TimedOut` as timeout-equivalent, which
/// is useful when working with non-blocking transports.
#[inline(always)]
pub(crate) fn io_err_is_timeout(e: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind::*;
    [WouldBlock, TimedOut].contains(&e)
}
