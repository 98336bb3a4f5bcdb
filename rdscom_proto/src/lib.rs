#![cfg_attr(not(test), no_std)]
//! A small, self-describing message format for constrained links.
//!
//! This crate defines everything about `rdscom` messages that doesn't involve moving
//! bytes around: payload schemas, typed access to payload fields, and message framing.
//! It performs no I/O.
//!
//! ## Prototypes
//!
//! A [`Prototype`] describes the layout of a payload: an ordered list of named fields,
//! each with a fixed-width [`FieldType`]. Fields are packed back to back, in insertion
//! order, so the size of a payload is known from its prototype alone.
//!
//! Every prototype carries a one-byte identifier, its _handle_, which messages use to
//! name the layout of their payload. The identifier [`RESERVED_HANDLE`] is reserved to
//! mark invalid prototypes, and can't be used to build buffers or messages.
//!
//! Prototypes can describe themselves, see [`Prototype::serialize_format`], so that
//! peers can exchange schemas over the same link as the data.
//!
//! ## Typed buffers
//!
//! A [`TypedBuffer`] is a payload: raw bytes tied to a prototype. Fields are read and
//! written by name, as [`FieldValue`]s, a closed set of variants matching the field
//! types. All multi-byte values are big-endian.
//!
//! ## Messages
//!
//! A [`Message`] pairs a [`MessageHeader`] (message type, prototype handle, sequence
//! number) with its payload. See the [`message`] module for the wire layout.
//!
//! Message types are [`Request`](MessageType::Request),
//! [`Response`](MessageType::Response) and [`Error`](MessageType::Error). A response
//! carries the sequence number of the request it answers, which lets the sender match
//! the two up.
//!
//! The types in this crate implement `serde`'s `Serialize` and `Deserialize` traits
//! where it makes sense, for users to conveniently plug into other `serde` backends.

extern crate alloc;

pub mod buffer;
pub mod error;
pub mod field;
pub mod message;
pub mod prototype;

pub use buffer::TypedBuffer;
pub use error::{
    BufferError, EncodeError, FieldError, FormatError, ParseError, UnknownMessageType,
    ValueTypeError,
};
pub use field::{Field, FieldType, FieldValue};
pub use message::{Message, MessageHeader, MessageType, SequenceCounter};
pub use prototype::{Prototype, RESERVED_HANDLE};
