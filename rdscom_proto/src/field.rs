//! Field type table and typed field values.

use core::ops;
use serde::{Deserialize, Serialize};

use crate::error::ValueTypeError;

/// Supported field types.
///
/// All types have a fixed width known statically. Multi-byte values are packed
/// big-endian, the same byte order used by the message header.
///
/// The discriminants are the type codes used in a prototype's self-description.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum FieldType {
    U8 = 0,
    U16 = 1,
    U32 = 2,
    U64 = 3,
    I8 = 4,
    I16 = 5,
    I32 = 6,
    I64 = 7,
    F32 = 8,
    F64 = 9,
    Bool = 10,
    Byte = 11,
    /// Sentinel for absent or invalid fields. Zero bytes wide.
    Empty = 12,
}

impl FieldType {
    /// Returns the size of a value of this type in bytes.
    #[inline(always)]
    pub const fn size(self) -> usize {
        use FieldType::*;
        match self {
            U8 | I8 | Bool | Byte => 1,
            U16 | I16 => 2,
            U32 | I32 | F32 => 4,
            U64 | I64 | F64 => 8,
            Empty => 0,
        }
    }

    /// Returns the type code written in a prototype's self-description.
    #[inline(always)]
    pub const fn code(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn from_code(code: u8) -> Option<Self> {
        use FieldType::*;
        Some(match code {
            0 => U8,
            1 => U16,
            2 => U32,
            3 => U64,
            4 => I8,
            5 => I16,
            6 => I32,
            7 => I64,
            8 => F32,
            9 => F64,
            10 => Bool,
            11 => Byte,
            12 => Empty,
            _ => return None,
        })
    }

    /// Returns whether values of this type are integers. Raw bytes count as unsigned integers.
    #[inline(always)]
    pub const fn is_integer(self) -> bool {
        use FieldType::*;
        matches!(self, U8 | U16 | U32 | U64 | I8 | I16 | I32 | I64 | Byte)
    }

    /// Returns whether the type is signed (including floating-point types).
    #[inline(always)]
    pub const fn is_signed(self) -> bool {
        use FieldType::*;
        matches!(self, I8 | I16 | I32 | I64 | F32 | F64)
    }

    #[inline(always)]
    pub const fn is_float(self) -> bool {
        matches!(self, FieldType::F32 | FieldType::F64)
    }
}

/// A single field of a [`Prototype`](crate::Prototype): where it lives in the payload, and
/// how to interpret it.
///
/// Offsets are assigned by the owning prototype, never by hand.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Field {
    pub(crate) offset: usize,
    pub(crate) ty: FieldType,
}

impl Field {
    #[inline(always)]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    #[inline(always)]
    pub const fn field_type(&self) -> FieldType {
        self.ty
    }

    #[inline(always)]
    pub const fn size(&self) -> usize {
        self.ty.size()
    }

    /// The byte range this field occupies in a payload.
    #[inline(always)]
    pub const fn span(&self) -> ops::Range<usize> {
        self.offset..self.offset + self.size()
    }
}

/// A field value, tagged with its type.
///
/// Every variant corresponds to exactly one [`FieldType`] (there is no value for
/// [`FieldType::Empty`]).
#[derive(Clone, Copy, PartialEq, PartialOrd, Debug, Serialize, Deserialize)]
pub enum FieldValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Byte(u8),
}

/// Why a value could not be converted to a given field type.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Conversion {
    /// The value and the type belong to different families (e.g. a float into a boolean).
    Incompatible,
    /// Same family, but the value doesn't fit in the target type.
    OutOfRange,
}

impl FieldValue {
    /// Returns the type of this value.
    #[inline]
    pub const fn field_type(&self) -> FieldType {
        match self {
            Self::U8(_) => FieldType::U8,
            Self::U16(_) => FieldType::U16,
            Self::U32(_) => FieldType::U32,
            Self::U64(_) => FieldType::U64,
            Self::I8(_) => FieldType::I8,
            Self::I16(_) => FieldType::I16,
            Self::I32(_) => FieldType::I32,
            Self::I64(_) => FieldType::I64,
            Self::F32(_) => FieldType::F32,
            Self::F64(_) => FieldType::F64,
            Self::Bool(_) => FieldType::Bool,
            Self::Byte(_) => FieldType::Byte,
        }
    }

    /// Writes the big-endian representation of this value into `out`.
    ///
    /// Returns `None`, leaving `out` untouched, if its length isn't exactly the size of
    /// this value's type.
    pub fn encode(&self, out: &mut [u8]) -> Option<()> {
        if out.len() != self.field_type().size() {
            return None;
        }

        match *self {
            Self::U8(v) | Self::Byte(v) => out[0] = v,
            Self::Bool(v) => out[0] = u8::from(v),
            Self::I8(v) => out.copy_from_slice(&v.to_be_bytes()),
            Self::U16(v) => out.copy_from_slice(&v.to_be_bytes()),
            Self::I16(v) => out.copy_from_slice(&v.to_be_bytes()),
            Self::U32(v) => out.copy_from_slice(&v.to_be_bytes()),
            Self::I32(v) => out.copy_from_slice(&v.to_be_bytes()),
            Self::F32(v) => out.copy_from_slice(&v.to_be_bytes()),
            Self::U64(v) => out.copy_from_slice(&v.to_be_bytes()),
            Self::I64(v) => out.copy_from_slice(&v.to_be_bytes()),
            Self::F64(v) => out.copy_from_slice(&v.to_be_bytes()),
        }

        Some(())
    }

    /// Reads a value of type `ty` from its big-endian representation.
    ///
    /// Returns `None` for [`FieldType::Empty`], or if `bytes` isn't exactly `ty.size()` long.
    pub fn decode(ty: FieldType, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ty.size() {
            return None;
        }

        Some(match ty {
            FieldType::U8 => Self::U8(bytes[0]),
            FieldType::Byte => Self::Byte(bytes[0]),
            FieldType::Bool => Self::Bool(bytes[0] != 0),
            FieldType::I8 => Self::I8(i8::from_be_bytes(bytes.try_into().ok()?)),
            FieldType::U16 => Self::U16(u16::from_be_bytes(bytes.try_into().ok()?)),
            FieldType::I16 => Self::I16(i16::from_be_bytes(bytes.try_into().ok()?)),
            FieldType::U32 => Self::U32(u32::from_be_bytes(bytes.try_into().ok()?)),
            FieldType::I32 => Self::I32(i32::from_be_bytes(bytes.try_into().ok()?)),
            FieldType::F32 => Self::F32(f32::from_be_bytes(bytes.try_into().ok()?)),
            FieldType::U64 => Self::U64(u64::from_be_bytes(bytes.try_into().ok()?)),
            FieldType::I64 => Self::I64(i64::from_be_bytes(bytes.try_into().ok()?)),
            FieldType::F64 => Self::F64(f64::from_be_bytes(bytes.try_into().ok()?)),
            FieldType::Empty => return None,
        })
    }

    /// Returns this value as a wide integer, if it is one.
    #[inline]
    fn as_integer(&self) -> Option<i128> {
        Some(match *self {
            Self::U8(v) | Self::Byte(v) => v.into(),
            Self::U16(v) => v.into(),
            Self::U32(v) => v.into(),
            Self::U64(v) => v.into(),
            Self::I8(v) => v.into(),
            Self::I16(v) => v.into(),
            Self::I32(v) => v.into(),
            Self::I64(v) => v.into(),
            _ => return None,
        })
    }

    /// Converts this value to another field type.
    ///
    /// Integers convert between each other when the value is representable in the target
    /// type, floats convert between each other, booleans only convert to booleans.
    pub(crate) fn convert_to(self, ty: FieldType) -> Result<Self, Conversion> {
        if self.field_type() == ty {
            return Ok(self);
        }

        if ty.is_integer() {
            let v = self.as_integer().ok_or(Conversion::Incompatible)?;
            let range = |_| Conversion::OutOfRange;

            return Ok(match ty {
                FieldType::U8 => Self::U8(v.try_into().map_err(range)?),
                FieldType::Byte => Self::Byte(v.try_into().map_err(range)?),
                FieldType::U16 => Self::U16(v.try_into().map_err(range)?),
                FieldType::U32 => Self::U32(v.try_into().map_err(range)?),
                FieldType::U64 => Self::U64(v.try_into().map_err(range)?),
                FieldType::I8 => Self::I8(v.try_into().map_err(range)?),
                FieldType::I16 => Self::I16(v.try_into().map_err(range)?),
                FieldType::I32 => Self::I32(v.try_into().map_err(range)?),
                FieldType::I64 => Self::I64(v.try_into().map_err(range)?),
                _ => unreachable!("is_integer covers exactly the integer types"),
            });
        }

        match (self, ty) {
            (Self::F64(v), FieldType::F32) => {
                // only finite values that overflow f32 are rejected, NaN and infinities carry over
                let narrowed = v as f32;
                if v.is_finite() && !narrowed.is_finite() {
                    Err(Conversion::OutOfRange)
                } else {
                    Ok(Self::F32(narrowed))
                }
            }
            (Self::F32(v), FieldType::F64) => Ok(Self::F64(v.into())),
            _ => Err(Conversion::Incompatible),
        }
    }
}

macro_rules! impl_primitive {
    ($($t:ty => $variant:ident),* $(,)?) => {$(
        impl From<$t> for FieldValue {
            #[inline(always)]
            fn from(v: $t) -> Self {
                Self::$variant(v)
            }
        }

        impl TryFrom<FieldValue> for $t {
            type Error = ValueTypeError;

            #[inline]
            fn try_from(v: FieldValue) -> Result<Self, Self::Error> {
                match v {
                    FieldValue::$variant(x) => Ok(x),
                    other => Err(ValueTypeError { found: other.field_type() }),
                }
            }
        }
    )*};
}

impl_primitive! {
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    bool => Bool,
}

// `u8` backs both `U8` and `Byte`, converting into a value picks `U8`.
impl From<u8> for FieldValue {
    #[inline(always)]
    fn from(v: u8) -> Self {
        Self::U8(v)
    }
}

impl TryFrom<FieldValue> for u8 {
    type Error = ValueTypeError;

    #[inline]
    fn try_from(v: FieldValue) -> Result<Self, Self::Error> {
        match v {
            FieldValue::U8(x) | FieldValue::Byte(x) => Ok(x),
            other => Err(ValueTypeError {
                found: other.field_type(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_roundtrip() {
        for code in 0..=12 {
            let ty = FieldType::from_code(code).unwrap();
            assert_eq!(ty.code(), code);
        }
        assert_eq!(FieldType::from_code(13), None);
    }

    #[test]
    fn type_families() {
        assert!(FieldType::Byte.is_integer() && !FieldType::Byte.is_signed());
        assert!(FieldType::I64.is_integer() && FieldType::I64.is_signed());
        assert!(FieldType::F32.is_float() && FieldType::F32.is_signed());
        assert!(!FieldType::F64.is_integer());
        assert!(!FieldType::U32.is_float() && !FieldType::U32.is_signed());

        for ty in [FieldType::Bool, FieldType::Empty] {
            assert!(!ty.is_integer() && !ty.is_float() && !ty.is_signed());
        }
    }

    #[test]
    fn widths() {
        assert_eq!(FieldType::Byte.size(), 1);
        assert_eq!(FieldType::I16.size(), 2);
        assert_eq!(FieldType::F32.size(), 4);
        assert_eq!(FieldType::F64.size(), 8);
        assert_eq!(FieldType::Empty.size(), 0);
    }

    #[test]
    fn values_are_big_endian() {
        let mut out = [0; 2];
        FieldValue::U16(2020).encode(&mut out).unwrap();
        assert_eq!(out, [0x07, 0xE4]);

        let mut out = [0; 4];
        FieldValue::I32(-2).encode(&mut out).unwrap();
        assert_eq!(out, [0xFF, 0xFF, 0xFF, 0xFE]);

        assert_eq!(
            FieldValue::decode(FieldType::U16, &[0x07, 0xE4]),
            Some(FieldValue::U16(2020))
        );
    }

    #[test]
    fn encode_rejects_wrong_width() {
        let mut out = [0; 3];
        assert_eq!(FieldValue::U16(1).encode(&mut out), None);
        assert_eq!(out, [0; 3]);
        assert_eq!(FieldValue::decode(FieldType::U32, &[0; 2]), None);
        assert_eq!(FieldValue::decode(FieldType::Empty, &[]), None);
    }

    #[test]
    fn nonzero_bytes_decode_as_true() {
        assert_eq!(
            FieldValue::decode(FieldType::Bool, &[7]),
            Some(FieldValue::Bool(true))
        );
    }

    #[test]
    fn integer_conversions_check_range() {
        assert_eq!(
            FieldValue::U64(2020).convert_to(FieldType::U16),
            Ok(FieldValue::U16(2020))
        );
        assert_eq!(
            FieldValue::I32(1).convert_to(FieldType::Byte),
            Ok(FieldValue::Byte(1))
        );
        assert_eq!(
            FieldValue::I8(-1).convert_to(FieldType::U32),
            Err(Conversion::OutOfRange)
        );
        assert_eq!(
            FieldValue::U16(300).convert_to(FieldType::U8),
            Err(Conversion::OutOfRange)
        );
        assert_eq!(
            FieldValue::F32(1.0).convert_to(FieldType::I32),
            Err(Conversion::Incompatible)
        );
        assert_eq!(
            FieldValue::Bool(true).convert_to(FieldType::U8),
            Err(Conversion::Incompatible)
        );
    }

    #[test]
    fn float_conversions() {
        assert_eq!(
            FieldValue::F64(0.5).convert_to(FieldType::F32),
            Ok(FieldValue::F32(0.5))
        );
        assert_eq!(
            FieldValue::F64(1e300).convert_to(FieldType::F32),
            Err(Conversion::OutOfRange)
        );
    }

    #[test]
    fn typed_extraction() {
        assert_eq!(u16::try_from(FieldValue::U16(9)), Ok(9));
        assert_eq!(u8::try_from(FieldValue::Byte(b'A')), Ok(b'A'));
        assert_eq!(
            i64::try_from(FieldValue::Bool(false)),
            Err(ValueTypeError {
                found: FieldType::Bool
            })
        );
    }
}
