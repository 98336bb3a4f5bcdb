//! Prototypes: named, ordered sets of fixed-width fields describing a payload layout.

use alloc::{borrow::ToOwned, string::String, vec::Vec};

use crate::{
    error::{EncodeError, FieldError, ParseError},
    field::{Field, FieldType},
};

/// Reserved prototype identifier.
///
/// A prototype carrying this identifier is invalid: it can't back a buffer or a message,
/// and won't be registered by a communication interface.
pub const RESERVED_HANDLE: u8 = 80;

/// Describes the layout of a message payload.
///
/// Fields are laid out back to back, in insertion order, with no padding. A prototype's
/// [`identifier`](Self::identifier) is what messages carry in their header to name the
/// layout of their payload.
///
/// ```
/// use rdscom_proto::{FieldType, Prototype};
///
/// let car = Prototype::new(1)
///     .with_field("make", FieldType::Byte)
///     .with_field("model", FieldType::Byte)
///     .with_field("year", FieldType::U16);
///
/// assert_eq!(car.size(), 4);
/// ```
///
/// Prototypes are meant to be built once at setup time, then shared. Mutating one that
/// was already registered somewhere has no effect on the registered copy.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Prototype {
    identifier: u8,
    fields: Vec<(String, Field)>,
    // invariant: size == sum of all field sizes, fields[i].offset == sum of sizes before i
    size: usize,
}

impl Default for Prototype {
    /// Returns an empty, invalid prototype.
    #[inline(always)]
    fn default() -> Self {
        Self::new(RESERVED_HANDLE)
    }
}

impl Prototype {
    /// Creates an empty prototype with the given identifier.
    #[inline(always)]
    pub const fn new(identifier: u8) -> Self {
        Self {
            identifier,
            fields: Vec::new(),
            size: 0,
        }
    }

    #[inline(always)]
    pub const fn identifier(&self) -> u8 {
        self.identifier
    }

    /// Returns `false` if this prototype uses the [reserved identifier](RESERVED_HANDLE).
    #[inline(always)]
    pub const fn is_valid(&self) -> bool {
        self.identifier != RESERVED_HANDLE
    }

    /// Total payload size in bytes.
    #[inline(always)]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[inline(always)]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Field names, in layout order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Fields and their names, in layout order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, Field)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), *field))
    }

    /// Appends a field at the end of the layout.
    ///
    /// If a field with the same name already exists, it is removed first: the fields that
    /// followed it move down to close the gap, and the new definition goes at the end.
    pub fn add_field(&mut self, name: impl Into<String>, ty: FieldType) -> &mut Self {
        let name = name.into();

        if let Some(i) = self.position(&name) {
            let (_, old) = self.fields.remove(i);
            self.size = self.size.strict_sub(old.size());

            for (_, field) in &mut self.fields[i..] {
                field.offset = field.offset.strict_sub(old.size());
            }
        }

        self.fields.push((
            name,
            Field {
                offset: self.size,
                ty,
            },
        ));
        self.size = self.size.strict_add(ty.size());

        self
    }

    /// Builder-style variant of [`add_field`](Self::add_field).
    #[inline(always)]
    pub fn with_field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.add_field(name, ty);
        self
    }

    #[inline]
    fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }

    /// Looks up a field by name.
    pub fn find_field(&self, name: &str) -> Result<Field, FieldError> {
        self.position(name)
            .map(|i| self.fields[i].1)
            .ok_or_else(|| FieldError::NotFound(name.to_owned()))
    }

    /// Serializes this prototype's definition.
    ///
    /// Format: `identifier(1) field_count(1) { name_len(1) name(name_len) type_code(1) }*`,
    /// fields in layout order.
    pub fn serialize_format(&self) -> Result<Vec<u8>, EncodeError> {
        let count = u8::try_from(self.fields.len())
            .map_err(|_| EncodeError::TooManyFields(self.fields.len()))?;

        let mut out = Vec::with_capacity(
            2 + self
                .fields
                .iter()
                .map(|(name, _)| name.len() + 2)
                .sum::<usize>(),
        );

        out.push(self.identifier);
        out.push(count);

        for (name, field) in &self.fields {
            let len =
                u8::try_from(name.len()).map_err(|_| EncodeError::NameTooLong(name.clone()))?;
            out.push(len);
            out.extend_from_slice(name.as_bytes());
            out.push(field.ty.code());
        }

        Ok(out)
    }

    /// Rebuilds a prototype from its serialized definition.
    ///
    /// Offsets are recomputed by replaying the fields in their stored order. Bytes past
    /// the last described field are ignored.
    pub fn from_serialized_format(bytes: &[u8]) -> Result<Self, ParseError> {
        let ([identifier, count], mut rem) = bytes
            .split_first_chunk::<2>()
            .map(|(head, rem)| (*head, rem))
            .ok_or(ParseError::TooShort(bytes.len()))?;

        let mut proto = Self::new(identifier);

        for index in 0..usize::from(count) {
            let (&name_len, after_len) = rem.split_first().ok_or(ParseError::TooShort(bytes.len()))?;
            let declared = usize::from(name_len);

            if after_len.len() < declared {
                return Err(ParseError::NameOverrun { index, declared });
            }

            let (name, after_name) = after_len.split_at(declared);

            let (&code, after_code) = after_name
                .split_first()
                .ok_or(ParseError::MissingTypeCode { index })?;

            let name = core::str::from_utf8(name).map_err(|_| ParseError::InvalidName { index })?;
            let ty = FieldType::from_code(code).ok_or(ParseError::UnknownFieldType { index, code })?;

            proto.add_field(name, ty);
            rem = after_code;
        }

        Ok(proto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn car() -> Prototype {
        Prototype::new(1)
            .with_field("make", FieldType::Byte)
            .with_field("model", FieldType::Byte)
            .with_field("year", FieldType::U16)
    }

    #[test]
    fn offsets_follow_insertion_order() {
        let p = Prototype::new(3)
            .with_field("zeta", FieldType::U32)
            .with_field("alpha", FieldType::U8)
            .with_field("mid", FieldType::F64);

        assert_eq!(p.field_names().collect::<Vec<_>>(), ["zeta", "alpha", "mid"]);
        assert_eq!(p.find_field("zeta").unwrap().offset(), 0);
        assert_eq!(p.find_field("alpha").unwrap().offset(), 4);
        assert_eq!(p.find_field("mid").unwrap().offset(), 5);
        assert_eq!(p.size(), 13);
    }

    #[test]
    fn readding_a_field_moves_it_to_the_end() {
        let mut p = car();
        p.add_field("make", FieldType::U32);

        assert_eq!(p.field_names().collect::<Vec<_>>(), ["model", "year", "make"]);
        assert_eq!(p.find_field("model").unwrap().offset(), 0);
        assert_eq!(p.find_field("year").unwrap().offset(), 1);
        assert_eq!(p.find_field("make").unwrap().offset(), 3);
        assert_eq!(p.size(), 7);

        // spans never overlap
        let mut spans: Vec<_> = p.fields().map(|(_, f)| f.span()).collect();
        spans.sort_by_key(|s| s.start);
        for w in spans.windows(2) {
            assert!(w[0].end <= w[1].start);
        }
    }

    #[test]
    fn missing_field() {
        assert_eq!(
            car().find_field("color"),
            Err(FieldError::NotFound("color".into()))
        );
    }

    #[test]
    fn reserved_identifier_is_invalid() {
        assert!(!Prototype::new(RESERVED_HANDLE).is_valid());
        assert!(!Prototype::default().is_valid());
        assert!(car().is_valid());
    }

    #[test]
    fn serialized_format_layout() {
        let bytes = car().serialize_format().unwrap();
        let mut expected = vec![1, 3];
        expected.extend_from_slice(&[4, b'm', b'a', b'k', b'e', 11]);
        expected.extend_from_slice(&[5, b'm', b'o', b'd', b'e', b'l', 11]);
        expected.extend_from_slice(&[4, b'y', b'e', b'a', b'r', 1]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn serialized_format_roundtrip() {
        let p = car().with_field("ok", FieldType::Bool).with_field("t", FieldType::F64);
        let decoded = Prototype::from_serialized_format(&p.serialize_format().unwrap()).unwrap();
        assert_eq!(decoded, p);
    }

    #[test]
    fn parse_rejects_short_input() {
        assert_eq!(
            Prototype::from_serialized_format(&[1]),
            Err(ParseError::TooShort(1))
        );
        // claims one field, has nothing after the header
        assert_eq!(
            Prototype::from_serialized_format(&[1, 1]),
            Err(ParseError::TooShort(2))
        );
    }

    #[test]
    fn parse_rejects_name_overrun() {
        assert_eq!(
            Prototype::from_serialized_format(&[1, 1, 10, b'a', b'b']),
            Err(ParseError::NameOverrun {
                index: 0,
                declared: 10
            })
        );
        assert_eq!(
            Prototype::from_serialized_format(&[1, 1, 2, b'a', b'b']),
            Err(ParseError::MissingTypeCode { index: 0 })
        );
    }

    #[test]
    fn parse_rejects_unknown_type() {
        assert_eq!(
            Prototype::from_serialized_format(&[1, 1, 1, b'a', 42]),
            Err(ParseError::UnknownFieldType { index: 0, code: 42 })
        );
    }

    #[test]
    fn empty_prototype_roundtrip() {
        let p = Prototype::new(0);
        assert_eq!(p.serialize_format().unwrap(), [0, 0]);
        assert_eq!(Prototype::from_serialized_format(&[0, 0]).unwrap(), p);
    }

    #[test]
    fn oversized_names_cannot_be_described() {
        let name: String = core::iter::repeat_n('x', 256).collect();
        let p = Prototype::new(0).with_field(name.clone(), FieldType::U8);
        assert_eq!(p.serialize_format(), Err(EncodeError::NameTooLong(name)));
    }
}
