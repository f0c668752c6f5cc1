//! Declared and runtime types, plus their textual wire names.
//!
//! Custom-tagged values carry a type name. The syntax is small:
//!
//! ```text
//! Int32                      built-in simple type
//! Nullable<Int32>            nullable wrapper
//! Acme.Person[]              rank-1 array, Acme.Person[,] is rank 2
//! List<String>               list
//! Map<String,[Acme.Person, Acme, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null]>
//! Enum<Acme.Color>           enumeration
//! ```
//!
//! Record names that contain separators (`,`, `<`, `>`, `[`, `]`) are wrapped in
//! brackets.

use crate::error::{GraphwireError, Result};
use crate::format::TypeTag;
use std::fmt;
use std::sync::Arc;

/// Maximum nesting accepted by [`TypeRef::parse`].
pub const MAX_TYPE_DEPTH: usize = 64;

/// A declared slot type or the runtime type of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// Any value; the runtime type is written instead.
    Object,
    /// Boolean.
    Bool,
    /// Unsigned 8-bit integer.
    Byte,
    /// Signed 8-bit integer.
    SByte,
    /// Unicode scalar value.
    Char,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 64-bit integer.
    UInt64,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// 96-bit scaled decimal.
    Decimal,
    /// UTF-8 text.
    String,
    /// Date and time without offset, in 100 ns ticks.
    DateTime,
    /// Date and time with a UTC offset.
    DateTimeOffset,
    /// Signed duration, in 100 ns ticks.
    TimeSpan,
    /// 128-bit identifier.
    Guid,
    /// Resource identifier kept as text.
    Uri,
    /// Packed boolean vector.
    BitSet,
    /// Enumeration identified by name, carried as a 32-bit ordinal.
    Enum(Arc<str>),
    /// Value type that may also be null.
    Nullable(Box<TypeRef>),
    /// Rectangular array with the given rank (at least 1).
    Array(Box<TypeRef>, u8),
    /// Ordered list.
    List(Box<TypeRef>),
    /// Insertion-ordered key/value map.
    Map(Box<TypeRef>, Box<TypeRef>),
    /// A registered record or interface.
    Named(Arc<str>),
}

/// Coarse category used by both engines to pick a payload layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    /// Fixed or length-prefixed payload.
    Simple,
    /// Length then one byte per bit.
    BitSet,
    /// Rank, dimensions, then elements.
    Array,
    /// Count then elements.
    List,
    /// Count then interleaved keys and values.
    Map,
    /// Known-object marker then members.
    Record,
}

const SIMPLE_NAMES: &[(&str, TypeRef)] = &[
    ("Object", TypeRef::Object),
    ("Boolean", TypeRef::Bool),
    ("Byte", TypeRef::Byte),
    ("SByte", TypeRef::SByte),
    ("Char", TypeRef::Char),
    ("Int16", TypeRef::Int16),
    ("UInt16", TypeRef::UInt16),
    ("Int32", TypeRef::Int32),
    ("UInt32", TypeRef::UInt32),
    ("Int64", TypeRef::Int64),
    ("UInt64", TypeRef::UInt64),
    ("Single", TypeRef::Float),
    ("Double", TypeRef::Double),
    ("Decimal", TypeRef::Decimal),
    ("String", TypeRef::String),
    ("DateTime", TypeRef::DateTime),
    ("DateTimeOffset", TypeRef::DateTimeOffset),
    ("TimeSpan", TypeRef::TimeSpan),
    ("Guid", TypeRef::Guid),
    ("Uri", TypeRef::Uri),
    ("BitSet", TypeRef::BitSet),
];

impl TypeRef {
    /// `T[]`
    pub fn array(elem: TypeRef) -> Self {
        Self::Array(Box::new(elem), 1)
    }

    /// `T[,...]` with `rank` dimensions. A rank of zero is treated as one.
    pub fn array_of_rank(elem: TypeRef, rank: u8) -> Self {
        Self::Array(Box::new(elem), rank.max(1))
    }

    /// `List<T>`
    pub fn list(elem: TypeRef) -> Self {
        Self::List(Box::new(elem))
    }

    /// `Map<K,V>`
    pub fn map(key: TypeRef, value: TypeRef) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    /// `Nullable<T>`
    pub fn nullable(inner: TypeRef) -> Self {
        Self::Nullable(Box::new(inner))
    }

    /// A registered record or interface.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self::Named(name.into())
    }

    /// An enumeration.
    pub fn enumeration(name: impl Into<Arc<str>>) -> Self {
        Self::Enum(name.into())
    }

    /// Strips one `Nullable<>` layer.
    pub fn unwrap_nullable(&self) -> &TypeRef {
        match self {
            Self::Nullable(inner) => inner,
            other => other,
        }
    }

    /// True for `Nullable<T>`.
    pub fn is_nullable(&self) -> bool {
        matches!(self, Self::Nullable(_))
    }

    /// Built-in numeric, text, time, identifier and enum types.
    pub fn is_simple(&self) -> bool {
        match self {
            Self::Nullable(inner) => inner.is_simple(),
            Self::Object
            | Self::BitSet
            | Self::Array(..)
            | Self::List(_)
            | Self::Map(..)
            | Self::Named(_) => false,
            _ => true,
        }
    }

    /// Types whose default is a zero value rather than null.
    pub fn is_value_type(&self) -> bool {
        self.is_simple() && !matches!(self, Self::String | Self::Uri | Self::Nullable(_))
    }

    /// Payload layout for this type, ignoring any nullable wrapper.
    ///
    /// `Object` has no layout of its own and reports [`TypeCategory::Record`].
    pub fn category(&self) -> TypeCategory {
        match self.unwrap_nullable() {
            Self::BitSet => TypeCategory::BitSet,
            Self::Array(..) => TypeCategory::Array,
            Self::List(_) => TypeCategory::List,
            Self::Map(..) => TypeCategory::Map,
            Self::Named(_) | Self::Object => TypeCategory::Record,
            _ => TypeCategory::Simple,
        }
    }

    /// Wire tag for this type, ignoring any nullable wrapper.
    pub fn tag(&self) -> TypeTag {
        match self.unwrap_nullable() {
            Self::Bool => TypeTag::Bool,
            Self::Byte => TypeTag::Byte,
            Self::SByte => TypeTag::SByte,
            Self::Char => TypeTag::Char,
            Self::Int16 => TypeTag::Int16,
            Self::UInt16 => TypeTag::UInt16,
            Self::Int32 => TypeTag::Int32,
            Self::UInt32 => TypeTag::UInt32,
            Self::Int64 => TypeTag::Int64,
            Self::UInt64 => TypeTag::UInt64,
            Self::Float => TypeTag::Float,
            Self::Double => TypeTag::Double,
            Self::Decimal => TypeTag::Decimal,
            Self::String => TypeTag::String,
            Self::DateTime => TypeTag::DateTime,
            Self::DateTimeOffset => TypeTag::DateTimeOffset,
            Self::TimeSpan => TypeTag::TimeSpan,
            Self::Guid => TypeTag::Guid,
            Self::Uri => TypeTag::Uri,
            Self::BitSet => TypeTag::BitSet,
            Self::Enum(_) => TypeTag::Enum,
            Self::Array(elem, 1) if **elem == Self::Object => TypeTag::ObjectArray,
            _ => TypeTag::Custom,
        }
    }

    /// Type read back for a non-custom tag. Enumerations come back as `Int32`.
    pub fn from_tag(tag: TypeTag) -> Option<Self> {
        Some(match tag {
            TypeTag::Custom => return None,
            TypeTag::Bool => Self::Bool,
            TypeTag::Byte => Self::Byte,
            TypeTag::Char => Self::Char,
            TypeTag::Decimal => Self::Decimal,
            TypeTag::Double => Self::Double,
            TypeTag::Float => Self::Float,
            TypeTag::Int32 | TypeTag::Enum => Self::Int32,
            TypeTag::Int64 => Self::Int64,
            TypeTag::SByte => Self::SByte,
            TypeTag::Int16 => Self::Int16,
            TypeTag::String => Self::String,
            TypeTag::UInt32 => Self::UInt32,
            TypeTag::UInt64 => Self::UInt64,
            TypeTag::UInt16 => Self::UInt16,
            TypeTag::DateTime => Self::DateTime,
            TypeTag::TimeSpan => Self::TimeSpan,
            TypeTag::Guid => Self::Guid,
            TypeTag::Uri => Self::Uri,
            TypeTag::BitSet => Self::BitSet,
            TypeTag::ObjectArray => Self::array(Self::Object),
            TypeTag::DateTimeOffset => Self::DateTimeOffset,
        })
    }

    /// Rebuilds the type with every record name passed through `f`.
    ///
    /// Enumeration names are left alone; they are never registered.
    pub fn map_names<F>(&self, f: &mut F) -> Result<TypeRef>
    where
        F: FnMut(&str) -> Result<Arc<str>>,
    {
        Ok(match self {
            Self::Named(name) => Self::Named(f(name)?),
            Self::Nullable(inner) => Self::Nullable(Box::new(inner.map_names(f)?)),
            Self::Array(elem, rank) => Self::Array(Box::new(elem.map_names(f)?), *rank),
            Self::List(elem) => Self::List(Box::new(elem.map_names(f)?)),
            Self::Map(k, v) => Self::Map(Box::new(k.map_names(f)?), Box::new(v.map_names(f)?)),
            other => other.clone(),
        })
    }

    /// Parses a wire type name. Record names are returned verbatim, unresolved.
    pub fn parse(text: &str) -> Result<TypeRef> {
        let mut parser = Parser { src: text, pos: 0 };
        let ty = parser.parse_type(0)?;
        parser.skip_ws();
        if parser.pos != text.len() {
            return Err(parser.error("trailing characters"));
        }
        Ok(ty)
    }

    fn simple_name(&self) -> Option<&'static str> {
        SIMPLE_NAMES
            .iter()
            .find(|(_, ty)| ty == self)
            .map(|(name, _)| *name)
    }
}

/// The last dot-separated segment of a record name, ignoring any assembly suffix.
///
/// `"Acme.Models.Person, Acme, Version=1.0.0.0"` yields `"Person"`.
pub fn short_name(name: &str) -> &str {
    let head = name.split(',').next().unwrap_or(name).trim();
    head.rsplit('.').next().unwrap_or(head)
}

fn write_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if name.contains([',', '<', '>', '[', ']']) {
        write!(f, "[{name}]")
    } else {
        f.write_str(name)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.simple_name() {
            return f.write_str(name);
        }
        match self {
            Self::Enum(name) => {
                f.write_str("Enum<")?;
                write_name(f, name)?;
                f.write_str(">")
            }
            Self::Nullable(inner) => write!(f, "Nullable<{inner}>"),
            Self::Array(elem, rank) => {
                write!(f, "{elem}[")?;
                for _ in 1..*rank {
                    f.write_str(",")?;
                }
                f.write_str("]")
            }
            Self::List(elem) => write!(f, "List<{elem}>"),
            Self::Map(k, v) => write!(f, "Map<{k},{v}>"),
            Self::Named(name) => write_name(f, name),
            // Simple types were handled above.
            _ => Ok(()),
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, what: &str) -> GraphwireError {
        GraphwireError::TypeResolution(format!(
            "malformed type name '{}' at offset {}: {what}",
            self.src, self.pos
        ))
    }

    fn rest(&self) -> &'a str {
        self.src.get(self.pos..).unwrap_or("")
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{c}'")))
        }
    }

    fn parse_type(&mut self, depth: usize) -> Result<TypeRef> {
        if depth > MAX_TYPE_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.skip_ws();
        let mut ty = if self.peek() == Some('[') {
            TypeRef::Named(self.bracketed()?.into())
        } else {
            let ident = self.ident()?;
            if self.eat('<') {
                self.generic(ident, depth)?
            } else if let Some((_, ty)) = SIMPLE_NAMES.iter().find(|(name, _)| *name == ident) {
                ty.clone()
            } else {
                TypeRef::Named(ident.into())
            }
        };

        // Array suffixes: `[]`, `[,]`, ...
        loop {
            self.skip_ws();
            let rest = self.rest();
            let Some(body) = rest.strip_prefix('[') else {
                break;
            };
            let commas = body.chars().take_while(|c| *c == ',').count();
            if !body[commas..].starts_with(']') {
                break;
            }
            let rank = u8::try_from(commas + 1).map_err(|_| self.error("array rank too large"))?;
            self.pos += commas + 2;
            ty = TypeRef::Array(Box::new(ty), rank);
        }
        Ok(ty)
    }

    fn ident(&mut self) -> Result<&'a str> {
        let rest = self.rest();
        let end = rest.find([',', '<', '>', '[', ']']).unwrap_or(rest.len());
        let ident = rest[..end].trim();
        if ident.is_empty() {
            return Err(self.error("expected a type name"));
        }
        self.pos += end;
        Ok(ident)
    }

    fn bracketed(&mut self) -> Result<&'a str> {
        let rest = self.rest();
        let mut depth = 0usize;
        for (i, c) in rest.char_indices() {
            match c {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        let name = rest[1..i].trim();
                        if name.is_empty() {
                            return Err(self.error("empty bracketed name"));
                        }
                        self.pos += i + 1;
                        return Ok(name);
                    }
                }
                _ => {}
            }
        }
        Err(self.error("unterminated '['"))
    }

    fn generic(&mut self, ident: &str, depth: usize) -> Result<TypeRef> {
        let ty = match ident {
            "Nullable" => TypeRef::nullable(self.parse_type(depth + 1)?),
            "List" => TypeRef::list(self.parse_type(depth + 1)?),
            "Map" => {
                let key = self.parse_type(depth + 1)?;
                self.expect(',')?;
                let value = self.parse_type(depth + 1)?;
                TypeRef::map(key, value)
            }
            "Enum" => match self.parse_type(depth + 1)? {
                TypeRef::Named(name) => TypeRef::Enum(name),
                _ => return Err(self.error("enumeration argument must be a name")),
            },
            other => return Err(self.error(&format!("unknown generic type '{other}'"))),
        };
        self.expect('>')?;
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_render_and_parse_back() -> Result<()> {
        let cases = [
            TypeRef::Int32,
            TypeRef::nullable(TypeRef::Double),
            TypeRef::array(TypeRef::Byte),
            TypeRef::array_of_rank(TypeRef::String, 3),
            TypeRef::list(TypeRef::named("Acme.Person")),
            TypeRef::map(TypeRef::String, TypeRef::list(TypeRef::Object)),
            TypeRef::enumeration("Acme.Color"),
            TypeRef::named("Acme.Person, Acme, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null"),
            TypeRef::array(TypeRef::list(TypeRef::array_of_rank(TypeRef::Float, 2))),
        ];
        for ty in cases {
            let text = ty.to_string();
            assert_eq!(TypeRef::parse(&text)?, ty, "{text}");
        }
        Ok(())
    }

    #[test]
    fn rendered_names_are_stable() {
        assert_eq!(TypeRef::array_of_rank(TypeRef::Int32, 2).to_string(), "Int32[,]");
        assert_eq!(
            TypeRef::map(TypeRef::String, TypeRef::named("A.B, Asm")).to_string(),
            "Map<String,[A.B, Asm]>"
        );
    }

    #[test]
    fn malformed_names_fail_resolution() {
        for bad in ["", "List<Int32", "Foo<Int32>", "Map<Int32>", "[A.B", "Int32 x>"] {
            assert!(
                matches!(TypeRef::parse(bad), Err(GraphwireError::TypeResolution(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn deep_nesting_is_capped() {
        let text = format!("{}Int32{}", "List<".repeat(100), ">".repeat(100));
        assert!(TypeRef::parse(&text).is_err());
    }

    #[test]
    fn short_names_drop_namespace_and_assembly() {
        assert_eq!(short_name("Acme.Models.Person, Acme, Version=1.0.0.0"), "Person");
        assert_eq!(short_name("Person"), "Person");
    }

    #[test]
    fn enum_tag_reads_back_as_int32() {
        assert_eq!(TypeRef::enumeration("X").tag(), TypeTag::Enum);
        assert_eq!(TypeRef::from_tag(TypeTag::Enum), Some(TypeRef::Int32));
        assert_eq!(TypeRef::array(TypeRef::Object).tag(), TypeTag::ObjectArray);
        assert_eq!(TypeRef::array(TypeRef::Int32).tag(), TypeTag::Custom);
    }
}
