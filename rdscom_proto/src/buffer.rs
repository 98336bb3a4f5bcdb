//! Typed buffers: raw payload bytes interpreted through a prototype.

use alloc::{borrow::ToOwned, boxed::Box, sync::Arc, vec};

use crate::{
    error::{BufferError, FieldError},
    field::{Conversion, FieldType, FieldValue},
    prototype::Prototype,
};

/// A payload: raw bytes laid out as described by a [`Prototype`].
///
/// The length of the data always equals the prototype's size.
#[derive(Clone, PartialEq, Debug)]
pub struct TypedBuffer {
    prototype: Arc<Prototype>,
    data: Box<[u8]>,
}

impl TypedBuffer {
    /// Creates a zero-filled buffer for the given prototype.
    ///
    /// Fails if the prototype uses the reserved identifier.
    pub fn new(prototype: impl Into<Arc<Prototype>>) -> Result<Self, BufferError> {
        let prototype = prototype.into();
        Self::check_valid(&prototype)?;

        let data = vec![0; prototype.size()].into_boxed_slice();

        Ok(Self { prototype, data })
    }

    /// Wraps existing bytes, which must be exactly as long as the prototype's size.
    ///
    /// Fails if the prototype uses the reserved identifier, or on any length mismatch
    /// (no truncation or padding is performed).
    pub fn from_bytes(
        prototype: impl Into<Arc<Prototype>>,
        data: impl Into<Box<[u8]>>,
    ) -> Result<Self, BufferError> {
        let prototype = prototype.into();
        Self::check_valid(&prototype)?;

        let data = data.into();

        if data.len() != prototype.size() {
            return Err(BufferError::SizeMismatch {
                expected: prototype.size(),
                actual: data.len(),
            });
        }

        Ok(Self { prototype, data })
    }

    #[inline(always)]
    fn check_valid(prototype: &Prototype) -> Result<(), BufferError> {
        if prototype.is_valid() {
            Ok(())
        } else {
            Err(BufferError::InvalidPrototype(prototype.identifier()))
        }
    }

    #[inline(always)]
    pub fn prototype(&self) -> &Arc<Prototype> {
        &self.prototype
    }

    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Reads a field.
    pub fn get_field(&self, name: &str) -> Result<FieldValue, FieldError> {
        let field = self.prototype.find_field(name)?;

        if field.field_type() == FieldType::Empty {
            return Err(FieldError::Untyped(name.to_owned()));
        }

        self.data
            .get(field.span())
            .and_then(|bytes| FieldValue::decode(field.field_type(), bytes))
            .ok_or_else(|| FieldError::Truncated(name.to_owned()))
    }

    /// Reads a field and extracts it as a primitive.
    ///
    /// The primitive must match the field's type exactly (a `u8` also reads `Byte` fields).
    pub fn get<T>(&self, name: &str) -> Result<T, FieldError>
    where
        T: TryFrom<FieldValue, Error = crate::error::ValueTypeError>,
    {
        let value = self.get_field(name)?;
        T::try_from(value).map_err(|e| FieldError::WrongPrimitive {
            name: name.to_owned(),
            ty: e.found,
        })
    }

    /// Writes a field, returning the value actually stored.
    ///
    /// Values of a different type are converted when possible: integers to any integer
    /// type able to represent them, floats to either float type. Anything else is
    /// rejected, leaving the buffer unchanged.
    pub fn set_field(
        &mut self,
        name: &str,
        value: impl Into<FieldValue>,
    ) -> Result<FieldValue, FieldError> {
        let value = value.into();
        let field = self.prototype.find_field(name)?;
        let ty = field.field_type();

        if ty == FieldType::Empty {
            return Err(FieldError::Untyped(name.to_owned()));
        }

        let value = value.convert_to(ty).map_err(|e| match e {
            Conversion::Incompatible => FieldError::TypeMismatch {
                name: name.to_owned(),
                expected: ty,
                found: value.field_type(),
            },
            Conversion::OutOfRange => FieldError::OutOfRange {
                name: name.to_owned(),
                ty,
            },
        })?;

        self.data
            .get_mut(field.span())
            .and_then(|bytes| value.encode(bytes))
            .ok_or_else(|| FieldError::Truncated(name.to_owned()))?;

        Ok(value)
    }
}
