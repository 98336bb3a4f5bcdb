//! Errors produced while describing, packing and framing messages.

use alloc::string::String;
use thiserror::Error;

use crate::field::FieldType;

/// Error returned when decoding a prototype's self-description.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum ParseError {
    #[error("serialized prototype too short: {0} bytes")]
    TooShort(usize),
    #[error("field {index}: name of {declared} bytes runs past the end of the buffer")]
    NameOverrun { index: usize, declared: usize },
    #[error("field {index}: missing type code")]
    MissingTypeCode { index: usize },
    #[error("field {index}: unknown type code {code}")]
    UnknownFieldType { index: usize, code: u8 },
    #[error("field {index}: name is not valid UTF-8")]
    InvalidName { index: usize },
}

/// Error returned when a prototype can't be expressed in its self-description format.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum EncodeError {
    #[error("field name `{0}` is longer than 255 bytes")]
    NameTooLong(String),
    #[error("prototype has {0} fields, at most 255 can be described")]
    TooManyFields(usize),
}

/// Error returned when building a typed buffer.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum BufferError {
    #[error("prototype uses the reserved identifier {0}")]
    InvalidPrototype(u8),
    #[error("data size mismatch, expected: {expected}, got: {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Error returned when reading or writing a single field.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum FieldError {
    #[error("field not found: {0}")]
    NotFound(String),
    #[error("field `{0}` has no type")]
    Untyped(String),
    #[error("field `{name}` is {expected:?}, got a {found:?} value")]
    TypeMismatch {
        name: String,
        expected: FieldType,
        found: FieldType,
    },
    #[error("value out of range for field `{name}` ({ty:?})")]
    OutOfRange { name: String, ty: FieldType },
    #[error("field `{name}` is {ty:?}, it can't be read as the requested type")]
    WrongPrimitive { name: String, ty: FieldType },
    #[error("field `{0}` doesn't fit in the buffer")]
    Truncated(String),
}

/// Error returned when extracting a primitive from a [`FieldValue`](crate::FieldValue)
/// of another type.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
#[error("unexpected {found:?} value")]
pub struct ValueTypeError {
    pub found: FieldType,
}

/// Error returned when parsing an unknown [`MessageType`](crate::MessageType) name.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
#[error("expected one of `Request`, `Response` or `Error`")]
pub struct UnknownMessageType;

/// Error returned when decoding a framed message.
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum FormatError {
    #[error("prototype uses the reserved identifier")]
    InvalidPrototype,
    #[error("message too short: {0} bytes")]
    TooShort(usize),
    #[error("invalid preamble")]
    BadPreamble,
    #[error("invalid end marker")]
    BadEndMarker,
    #[error("message size mismatch, expected: {expected}, got: {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("header names prototype {found}, decoding with prototype {expected}")]
    HandleMismatch { expected: u8, found: u8 },
}
