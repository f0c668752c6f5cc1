//! Dynamic values carried through the engines.
//!
//! [`Value`] covers every simple type, bit-sets, the three collection shapes
//! and record references. Collections remember their declared element types so
//! the serializer can write them without outside help.

mod convert;
mod decimal;
pub mod ticks;

pub use convert::change_type;
pub use decimal::Decimal;

use crate::error::Result;
use crate::graph::{Heap, ObjRef};
use crate::types::TypeRef;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta};
use fixedbitset::FixedBitSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A URI kept as its original string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri(String);

impl Uri {
    /// Wraps a string.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Original text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One value of an object graph.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Null reference or empty nullable.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Unsigned 8-bit integer.
    Byte(u8),
    /// Signed 8-bit integer.
    SByte(i8),
    /// Unicode scalar value.
    Char(char),
    /// Signed 16-bit integer.
    Int16(i16),
    /// Unsigned 16-bit integer.
    UInt16(u16),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 64-bit integer.
    UInt64(u64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// 96-bit scaled decimal.
    Decimal(Decimal),
    /// UTF-8 text.
    String(String),
    /// Date and time without offset, in 100 ns ticks.
    DateTime(NaiveDateTime),
    /// Date and time with a UTC offset.
    DateTimeOffset(DateTime<FixedOffset>),
    /// Signed duration, in 100 ns ticks.
    TimeSpan(TimeDelta),
    /// 128-bit identifier.
    Guid(Uuid),
    /// Resource identifier kept as text.
    Uri(Uri),
    /// Enumeration member by ordinal.
    Enum {
        /// Enumeration name.
        ty: Arc<str>,
        /// Underlying 32-bit value.
        ordinal: i32,
    },
    /// Packed booleans.
    BitSet(FixedBitSet),
    /// Rank-1 byte array, written as a raw block.
    Bytes(Vec<u8>),
    /// Rectangular array; `items` are in row-major order.
    Array {
        /// Declared element type.
        elem: TypeRef,
        /// Length of each dimension.
        dims: Vec<usize>,
        /// Row-major elements; length is the product of `dims`.
        items: Vec<Value>,
    },
    /// Ordered list.
    List {
        /// Declared element type.
        elem: TypeRef,
        /// Elements.
        items: Vec<Value>,
    },
    /// Insertion-ordered map.
    Map {
        /// Declared key type.
        key: TypeRef,
        /// Declared value type.
        value: TypeRef,
        /// Entries in insertion order.
        entries: Vec<(Value, Value)>,
    },
    /// Reference to a record in the graph's heap.
    Object(ObjRef),
}

impl Value {
    /// Rank-1 array.
    pub fn array(elem: TypeRef, items: Vec<Value>) -> Self {
        Self::Array {
            elem,
            dims: vec![items.len()],
            items,
        }
    }

    /// Multi-dimensional array. `items` must hold the product of `dims` elements.
    pub fn array_nd(elem: TypeRef, dims: Vec<usize>, items: Vec<Value>) -> Self {
        Self::Array { elem, dims, items }
    }

    /// List.
    pub fn list(elem: TypeRef, items: Vec<Value>) -> Self {
        Self::List { elem, items }
    }

    /// Map.
    pub fn map(key: TypeRef, value: TypeRef, entries: Vec<(Value, Value)>) -> Self {
        Self::Map {
            key,
            value,
            entries,
        }
    }

    /// Enumeration member.
    pub fn enumeration(ty: impl Into<Arc<str>>, ordinal: i32) -> Self {
        Self::Enum {
            ty: ty.into(),
            ordinal,
        }
    }

    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Handle of a record value.
    pub fn as_object(&self) -> Option<ObjRef> {
        match self {
            Self::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// The concrete type of this value. `None` for null.
    pub fn runtime_type(&self, heap: &Heap) -> Result<Option<TypeRef>> {
        Ok(Some(match self {
            Self::Null => return Ok(None),
            Self::Bool(_) => TypeRef::Bool,
            Self::Byte(_) => TypeRef::Byte,
            Self::SByte(_) => TypeRef::SByte,
            Self::Char(_) => TypeRef::Char,
            Self::Int16(_) => TypeRef::Int16,
            Self::UInt16(_) => TypeRef::UInt16,
            Self::Int32(_) => TypeRef::Int32,
            Self::UInt32(_) => TypeRef::UInt32,
            Self::Int64(_) => TypeRef::Int64,
            Self::UInt64(_) => TypeRef::UInt64,
            Self::Float(_) => TypeRef::Float,
            Self::Double(_) => TypeRef::Double,
            Self::Decimal(_) => TypeRef::Decimal,
            Self::String(_) => TypeRef::String,
            Self::DateTime(_) => TypeRef::DateTime,
            Self::DateTimeOffset(_) => TypeRef::DateTimeOffset,
            Self::TimeSpan(_) => TypeRef::TimeSpan,
            Self::Guid(_) => TypeRef::Guid,
            Self::Uri(_) => TypeRef::Uri,
            Self::Enum { ty, .. } => TypeRef::Enum(Arc::clone(ty)),
            Self::BitSet(_) => TypeRef::BitSet,
            Self::Bytes(_) => TypeRef::array(TypeRef::Byte),
            Self::Array { elem, dims, .. } => {
                TypeRef::array_of_rank(elem.clone(), u8::try_from(dims.len()).unwrap_or(u8::MAX))
            }
            Self::List { elem, .. } => TypeRef::list(elem.clone()),
            Self::Map { key, value, .. } => TypeRef::map(key.clone(), value.clone()),
            Self::Object(id) => TypeRef::Named(Arc::clone(heap.resolve(*id)?.type_name())),
        }))
    }

    /// True if this value equals the default of `ty`, the condition for
    /// eliding its payload. Floats compare by bits, so `-0.0` is written out.
    pub fn is_default_for(&self, ty: &TypeRef) -> bool {
        match (self, ty) {
            (Self::Float(v), TypeRef::Float) => v.to_bits() == 0,
            (Self::Double(v), TypeRef::Double) => v.to_bits() == 0,
            _ => *self == default_value(ty),
        }
    }
}

/// Default of a type: zero for value types, null for everything else.
pub fn default_value(ty: &TypeRef) -> Value {
    match ty {
        TypeRef::Bool => Value::Bool(false),
        TypeRef::Byte => Value::Byte(0),
        TypeRef::SByte => Value::SByte(0),
        TypeRef::Char => Value::Char('\0'),
        TypeRef::Int16 => Value::Int16(0),
        TypeRef::UInt16 => Value::UInt16(0),
        TypeRef::Int32 => Value::Int32(0),
        TypeRef::UInt32 => Value::UInt32(0),
        TypeRef::Int64 => Value::Int64(0),
        TypeRef::UInt64 => Value::UInt64(0),
        TypeRef::Float => Value::Float(0.0),
        TypeRef::Double => Value::Double(0.0),
        TypeRef::Decimal => Value::Decimal(Decimal::ZERO),
        TypeRef::DateTime => Value::DateTime(ticks::datetime_epoch()),
        TypeRef::DateTimeOffset => Value::DateTimeOffset(ticks::offset_epoch()),
        TypeRef::TimeSpan => Value::TimeSpan(TimeDelta::zero()),
        TypeRef::Guid => Value::Guid(Uuid::nil()),
        TypeRef::Enum(name) => Value::enumeration(Arc::clone(name), 0),
        _ => Value::Null,
    }
}

macro_rules! impl_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

impl_from! {
    bool => Bool,
    u8 => Byte,
    i8 => SByte,
    char => Char,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    String => String,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    TimeDelta => TimeSpan,
    Uuid => Guid,
    Uri => Uri,
    FixedBitSet => BitSet,
    Vec<u8> => Bytes,
    ObjRef => Object,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_types_default_to_null() {
        for ty in [
            TypeRef::String,
            TypeRef::Uri,
            TypeRef::BitSet,
            TypeRef::list(TypeRef::Int32),
            TypeRef::named("A"),
            TypeRef::nullable(TypeRef::Int32),
        ] {
            assert_eq!(default_value(&ty), Value::Null, "{ty}");
        }
        assert!(!Value::from("").is_default_for(&TypeRef::String));
        assert!(Value::Int32(0).is_default_for(&TypeRef::Int32));
        assert!(Value::Double(0.0).is_default_for(&TypeRef::Double));
        assert!(!Value::Double(-0.0).is_default_for(&TypeRef::Double));
        assert!(!Value::Float(-0.0).is_default_for(&TypeRef::Float));
        assert!(!Value::Int32(0).is_default_for(&TypeRef::nullable(TypeRef::Int32)));
    }

    #[test]
    fn runtime_types_follow_shape() -> Result<()> {
        let mut heap = Heap::new();
        let id = heap.alloc(crate::graph::Object::new("Acme.Person"));
        assert_eq!(
            Value::Object(id).runtime_type(&heap)?,
            Some(TypeRef::named("Acme.Person"))
        );
        assert_eq!(
            Value::array_nd(TypeRef::Int32, vec![2, 2], vec![Value::Int32(0); 4]).runtime_type(&heap)?,
            Some(TypeRef::array_of_rank(TypeRef::Int32, 2))
        );
        assert_eq!(Value::Null.runtime_type(&heap)?, None);
        Ok(())
    }
}
