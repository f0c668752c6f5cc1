//! Single-byte labels that make up the wire format.
//!
//! Every encoded value starts with a header:
//!
//! ```text
//! [NullableLabel] [TypeTag] [type name if Custom] [DefaultLabel] [payload if NotDefault]
//! ```
//!
//! Custom objects open their payload with a [`KnownObjectLabel`]. Multi-byte
//! integers are little-endian; strings and type names carry a 7-bit encoded
//! length prefix.
//!
//! [`MetaByte`] is not part of the engine wire format. It trails the envelope
//! produced by [`crate::api::Serializer::encode`] and records which compressor
//! was applied.

use crate::error::{GraphwireError, Result};

/// Whether the declared slot type is a nullable wrapper around the tagged type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NullableLabel {
    /// Plain type.
    NotNullable = 0,
    /// `Nullable<T>` around the tagged type.
    Nullable = 1,
}

impl NullableLabel {
    /// Decodes the label byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::NotNullable),
            1 => Ok(Self::Nullable),
            other => Err(GraphwireError::CorruptedStream(format!(
                "unknown nullable label: {other}"
            ))),
        }
    }
}

/// Whether a value equals the default of its type. Default values carry no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DefaultLabel {
    /// Value is the type's default; nothing follows.
    Default = 0,
    /// Payload follows.
    NotDefault = 1,
}

impl DefaultLabel {
    /// Decodes the label byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Default),
            1 => Ok(Self::NotDefault),
            other => Err(GraphwireError::CorruptedStream(format!(
                "unknown default label: {other}"
            ))),
        }
    }
}

/// Opens the payload of a custom object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KnownObjectLabel {
    /// A 4-byte back-reference index into the known-object table follows.
    Known = 0,
    /// Member names follow; the object is appended to the known-object table.
    Unknown = 1,
}

impl KnownObjectLabel {
    /// Decodes the label byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Known),
            1 => Ok(Self::Unknown),
            other => Err(GraphwireError::CorruptedStream(format!(
                "unknown known-object label: {other}"
            ))),
        }
    }
}

/// Wire-level type tag.
///
/// Slot 21 is reserved and never produced; reading it is a stream error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    /// A length-prefixed type name follows the tag.
    Custom = 0,
    /// `bool`, 1 byte.
    Bool = 1,
    /// `u8`.
    Byte = 2,
    /// Unicode scalar, UTF-8 encoded (1-4 bytes).
    Char = 3,
    /// Four 32-bit words: lo, mid, hi, flags.
    Decimal = 4,
    /// `f64`.
    Double = 5,
    /// `f32`.
    Float = 6,
    /// `i32`.
    Int32 = 7,
    /// `i64`.
    Int64 = 8,
    /// `i8`.
    SByte = 9,
    /// `i16`.
    Int16 = 10,
    /// Length-prefixed UTF-8.
    String = 11,
    /// `u32`.
    UInt32 = 12,
    /// `u64`.
    UInt64 = 13,
    /// `u16`.
    UInt16 = 14,
    /// 64-bit tick count since 0001-01-01.
    DateTime = 15,
    /// 64-bit signed tick count.
    TimeSpan = 16,
    /// 16 raw bytes, mixed-endian GUID layout.
    Guid = 17,
    /// 32-bit ordinal. Reads back as `Int32`.
    Enum = 18,
    /// Length-prefixed UTF-8.
    Uri = 19,
    /// 32-bit length then one byte per bit.
    BitSet = 20,
    /// Rank-1 array of `Object`.
    ObjectArray = 22,
    /// 64-bit FILETIME (100ns ticks since 1601-01-01 UTC).
    DateTimeOffset = 23,
}

impl TypeTag {
    /// Decodes a tag byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        Ok(match byte {
            0 => Self::Custom,
            1 => Self::Bool,
            2 => Self::Byte,
            3 => Self::Char,
            4 => Self::Decimal,
            5 => Self::Double,
            6 => Self::Float,
            7 => Self::Int32,
            8 => Self::Int64,
            9 => Self::SByte,
            10 => Self::Int16,
            11 => Self::String,
            12 => Self::UInt32,
            13 => Self::UInt64,
            14 => Self::UInt16,
            15 => Self::DateTime,
            16 => Self::TimeSpan,
            17 => Self::Guid,
            18 => Self::Enum,
            19 => Self::Uri,
            20 => Self::BitSet,
            22 => Self::ObjectArray,
            23 => Self::DateTimeOffset,
            other => {
                return Err(GraphwireError::CorruptedStream(format!(
                    "unknown type label: {other}"
                )));
            }
        })
    }

    /// Returns the raw byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Trailer byte of an encoded envelope.
///
/// Bits 0-3 hold the compressor id. Bits 4-7 are reserved and must be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaByte(u8);

impl MetaByte {
    const COMPRESSION_MASK: u8 = 0b0000_1111;

    /// Creates a new `MetaByte` for the given compressor id (0-15).
    pub fn new(compression_id: u8) -> Self {
        Self(compression_id & Self::COMPRESSION_MASK)
    }

    /// Decodes the byte, rejecting reserved bits.
    pub fn from_byte(byte: u8) -> Result<Self> {
        if byte & !Self::COMPRESSION_MASK != 0 {
            return Err(GraphwireError::CorruptedStream(format!(
                "invalid envelope trailer: {byte:#04x}"
            )));
        }
        Ok(Self(byte))
    }

    /// Returns the compression algorithm id.
    pub fn compression_method(&self) -> u8 {
        self.0 & Self::COMPRESSION_MASK
    }

    /// Returns the raw byte representation.
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}
