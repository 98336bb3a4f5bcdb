//! Message framing.
//!
//! Wire layout, all header integers big-endian:
//!
//! ```text
//! ┌──────────────┬─────────────────────────────────────────┬───────────┬────────────────┐
//! │ PREAMBLE (3) │ type (1) │ handle (1) │ sequence number (2) │ payload   │ END_MARKER (3) │
//! └──────────────┴─────────────────────────────────────────┴───────────┴────────────────┘
//! ```
//!
//! The payload length isn't transmitted: it is the size of the prototype named by the
//! header's handle, so a frame's total length is fully determined by its prototype.

use alloc::{sync::Arc, vec::Vec};
use core::{fmt, str};
use serde::{Deserialize, Serialize};

use crate::{
    buffer::TypedBuffer,
    error::{BufferError, FieldError, FormatError, UnknownMessageType},
    field::FieldValue,
    prototype::{Prototype, RESERVED_HANDLE},
};

/// Fixed bytes every frame starts with.
pub const PREAMBLE: [u8; 3] = *b"RDS";
/// Fixed bytes every frame ends with.
pub const END_MARKER: [u8; 3] = *b"END";
/// Size of the encoded [`MessageHeader`].
pub const HEADER_SIZE: usize = 4;
/// Number of bytes a frame adds around its payload.
pub const FRAME_OVERHEAD: usize = PREAMBLE.len() + HEADER_SIZE + END_MARKER.len();

/// Returns the total length of a frame whose payload is described by `prototype`.
#[inline(always)]
pub const fn frame_len(prototype: &Prototype) -> usize {
    FRAME_OVERHEAD + prototype.size()
}

/// The role of a message in an exchange.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum MessageType {
    /// Asks something of the peer. May require acknowledgment.
    Request = 0,
    /// Answers a request, carrying its sequence number. Receiving one acknowledges the
    /// request.
    Response = 1,
    Error = 2,
}

impl MessageType {
    /// All message types, in discriminant order.
    pub const ALL: [Self; 3] = [Self::Request, Self::Response, Self::Error];

    #[inline(always)]
    pub const fn code(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Request),
            1 => Some(Self::Response),
            2 => Some(Self::Error),
            _ => None,
        }
    }

    /// A dense index in `0..3`, suitable for indexing per-type tables.
    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "Request",
            Self::Response => "Response",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl str::FromStr for MessageType {
    type Err = UnknownMessageType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or(UnknownMessageType)
    }
}

/// Message metadata.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct MessageHeader {
    pub message_type: MessageType,
    /// Identifier of the prototype describing the payload.
    pub prototype_handle: u8,
    /// Correlates a request with its response.
    pub sequence_number: u16,
}

impl MessageHeader {
    #[inline(always)]
    pub const fn encode(&self) -> [u8; HEADER_SIZE] {
        let [hi, lo] = self.sequence_number.to_be_bytes();
        [self.message_type.code(), self.prototype_handle, hi, lo]
    }

    #[inline]
    pub const fn decode(bytes: [u8; HEADER_SIZE]) -> Result<Self, FormatError> {
        let [ty, prototype_handle, hi, lo] = bytes;

        let Some(message_type) = MessageType::from_code(ty) else {
            return Err(FormatError::UnknownMessageType(ty));
        };

        Ok(Self {
            message_type,
            prototype_handle,
            sequence_number: u16::from_be_bytes([hi, lo]),
        })
    }
}

/// Generates message sequence numbers.
///
/// Yields `start, start + 1, ...`, wrapping from `u16::MAX` back to `0`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct SequenceCounter(u16);

impl SequenceCounter {
    #[inline(always)]
    pub const fn new(start: u16) -> Self {
        Self(start)
    }

    /// Returns the next sequence number and advances the counter.
    #[inline(always)]
    pub const fn next(&mut self) -> u16 {
        let n = self.0;
        self.0 = n.wrapping_add(1);
        n
    }

    /// Returns the number the next call to [`next`](Self::next) will yield.
    #[inline(always)]
    pub const fn peek(&self) -> u16 {
        self.0
    }
}

/// A framed message: a header and its payload.
///
/// The header's prototype handle always equals the payload prototype's identifier.
#[derive(Clone, PartialEq, Debug)]
pub struct Message {
    header: MessageHeader,
    payload: TypedBuffer,
}

impl Message {
    /// Creates a message carrying `payload`.
    ///
    /// Responses should be built with [`response_to`](Self::response_to), which carries
    /// over the request's sequence number. Building one here is allowed, but logged.
    pub fn new(message_type: MessageType, payload: TypedBuffer, sequence_number: u16) -> Self {
        if message_type == MessageType::Response {
            log::warn!(
                "building response {sequence_number} without a request, \
                 use Message::response_to to answer a request"
            );
        }

        Self::from_parts(message_type, payload, sequence_number)
    }

    /// Creates a message with a zero-filled payload for `prototype`.
    ///
    /// Fails if the prototype uses the reserved identifier.
    pub fn from_prototype(
        message_type: MessageType,
        prototype: impl Into<Arc<Prototype>>,
        sequence_number: u16,
    ) -> Result<Self, BufferError> {
        TypedBuffer::new(prototype).map(|p| Self::new(message_type, p, sequence_number))
    }

    /// Creates a response to `request`, carrying its sequence number.
    #[inline]
    pub fn response_to(request: &Message, payload: TypedBuffer) -> Self {
        Self::from_parts(MessageType::Response, payload, request.sequence_number())
    }

    /// Creates a response to `request` with a zero-filled payload for `prototype`.
    pub fn response_to_prototype(
        request: &Message,
        prototype: impl Into<Arc<Prototype>>,
    ) -> Result<Self, BufferError> {
        TypedBuffer::new(prototype).map(|p| Self::response_to(request, p))
    }

    #[inline(always)]
    fn from_parts(message_type: MessageType, payload: TypedBuffer, sequence_number: u16) -> Self {
        Self {
            header: MessageHeader {
                message_type,
                prototype_handle: payload.prototype().identifier(),
                sequence_number,
            },
            payload,
        }
    }

    #[inline(always)]
    pub const fn header(&self) -> &MessageHeader {
        &self.header
    }

    #[inline(always)]
    pub const fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    #[inline(always)]
    pub const fn prototype_handle(&self) -> u8 {
        self.header.prototype_handle
    }

    #[inline(always)]
    pub const fn sequence_number(&self) -> u16 {
        self.header.sequence_number
    }

    #[inline(always)]
    pub const fn payload(&self) -> &TypedBuffer {
        &self.payload
    }

    #[inline(always)]
    pub fn payload_mut(&mut self) -> &mut TypedBuffer {
        &mut self.payload
    }

    /// See [`TypedBuffer::get_field`].
    #[inline(always)]
    pub fn get_field(&self, name: &str) -> Result<FieldValue, FieldError> {
        self.payload.get_field(name)
    }

    /// See [`TypedBuffer::get`].
    #[inline(always)]
    pub fn get<T>(&self, name: &str) -> Result<T, FieldError>
    where
        T: TryFrom<FieldValue, Error = crate::error::ValueTypeError>,
    {
        self.payload.get(name)
    }

    /// See [`TypedBuffer::set_field`].
    #[inline(always)]
    pub fn set_field(
        &mut self,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<FieldValue, FieldError> {
        self.payload.set_field(name, value)
    }

    /// Length of this message once framed.
    #[inline(always)]
    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + self.payload.size()
    }

    /// Frames this message.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&PREAMBLE);
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(self.payload.data());
        out.extend_from_slice(&END_MARKER);
        out
    }

    /// Decodes a frame whose payload is described by `prototype`.
    ///
    /// The frame must be exactly [`frame_len(prototype)`](frame_len) bytes long, start
    /// with [`PREAMBLE`], end with [`END_MARKER`], and name `prototype` in its header.
    pub fn deserialize(
        prototype: impl Into<Arc<Prototype>>,
        bytes: &[u8],
    ) -> Result<Self, FormatError> {
        let prototype = prototype.into();

        if !prototype.is_valid() {
            return Err(FormatError::InvalidPrototype);
        }

        if bytes.len() <= PREAMBLE.len() {
            return Err(FormatError::TooShort(bytes.len()));
        }

        if !bytes.starts_with(&PREAMBLE) {
            return Err(FormatError::BadPreamble);
        }

        if !bytes.ends_with(&END_MARKER) {
            return Err(FormatError::BadEndMarker);
        }

        let expected = frame_len(&prototype);

        if bytes.len() != expected {
            return Err(FormatError::LengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }

        let rem = &bytes[PREAMBLE.len()..bytes.len() - END_MARKER.len()];
        // cannot fail, the length check above guarantees at least HEADER_SIZE bytes
        let (header, payload) = rem
            .split_first_chunk::<HEADER_SIZE>()
            .ok_or(FormatError::TooShort(bytes.len()))?;

        let header = MessageHeader::decode(*header)?;

        if header.prototype_handle != prototype.identifier() {
            return Err(FormatError::HandleMismatch {
                expected: prototype.identifier(),
                found: header.prototype_handle,
            });
        }

        let payload =
            TypedBuffer::from_bytes(prototype, payload).map_err(|e| match e {
                BufferError::InvalidPrototype(_) => FormatError::InvalidPrototype,
                BufferError::SizeMismatch { .. } => FormatError::LengthMismatch {
                    expected,
                    actual: bytes.len(),
                },
            })?;

        Ok(Self { header, payload })
    }

    /// Reads the prototype handle of a frame, without validating anything else.
    ///
    /// Returns [`RESERVED_HANDLE`] if `bytes` is too short to contain a full header.
    #[inline]
    pub fn peek_prototype_handle(bytes: &[u8]) -> u8 {
        if bytes.len() < PREAMBLE.len() + HEADER_SIZE {
            RESERVED_HANDLE
        } else {
            bytes[PREAMBLE.len() + 1]
        }
    }
}

/// Hexadecimal dump of the framed message.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
            for (i, b) in bytes.iter().enumerate() {
                if i != 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{b:02x}")?;
            }
            Ok(())
        }

        writeln!(f, "Message ({}):", self.message_type())?;
        writeln!(f, "  Preamble: {}", PREAMBLE.escape_ascii())?;
        f.write_str("  Header: ")?;
        hex(f, &self.header.encode())?;
        f.write_str("\n  Data: ")?;
        hex(f, self.payload.data())?;
        write!(f, "\n  End Marker: {}", END_MARKER.escape_ascii())
    }
}
