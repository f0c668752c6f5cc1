//! Lossless conversion between a stream type and a target type.
//!
//! Numeric conversions are decided by value: a stream `Int64` holding `7`
//! converts to `SByte`, one holding `300` does not. Nothing is ever silently
//! truncated, rounded to a different integer, or wrapped.

use super::{Decimal, Uri, Value, ticks};
use crate::error::{GraphwireError, Result};
use crate::types::TypeRef;
use chrono::{DateTime, NaiveDateTime};
use std::sync::Arc;
use uuid::Uuid;

const DATETIME_TEXT: &str = "%Y-%m-%dT%H:%M:%S%.f";

fn cast_error(from: &TypeRef, to: &TypeRef, value: &Value) -> GraphwireError {
    let shown = match value {
        Value::Null => "(null)".to_owned(),
        other => display_text(other).unwrap_or_else(|| format!("{other:?}")),
    };
    GraphwireError::Cast(format!("cannot cast from {from} to {to}, value: {shown}"))
}

/// Converts a simple `value` read as `from` into `to`.
///
/// Rules, in order:
/// * a nullable target accepts null, otherwise converts to its inner type;
/// * a nullable source only converts to a non-nullable `String`, to an
///   enumeration from `Int32`, or to another nullable;
/// * null into a value type fails;
/// * anything converts to `String`, and strings parse into any simple type;
/// * numeric kinds convert when the value is representable exactly;
/// * `Char` converts to numbers through its scalar value, never the reverse.
pub fn change_type(value: Value, from: &TypeRef, to: &TypeRef) -> Result<Value> {
    if from == to {
        return Ok(value);
    }

    let mut target = to;
    let target_was_nullable = to.is_nullable();
    if let TypeRef::Nullable(inner) = to {
        if value.is_null() {
            return Ok(Value::Null);
        }
        target = inner;
    }

    let mut source = from;
    if let TypeRef::Nullable(inner) = from {
        let int_to_enum = **inner == TypeRef::Int32 && matches!(target, TypeRef::Enum(_));
        if target_was_nullable || *target == TypeRef::String || int_to_enum {
            source = inner;
        } else {
            return Err(cast_error(from, to, &value));
        }
    }

    if value.is_null() {
        return if target.is_value_type() {
            Err(cast_error(from, to, &value))
        } else {
            Ok(Value::Null)
        };
    }
    if source == target {
        return Ok(value);
    }

    convert_simple(&value, target).ok_or_else(|| cast_error(from, to, &value))
}

fn convert_simple(value: &Value, target: &TypeRef) -> Option<Value> {
    if *target == TypeRef::String {
        return display_text(value).map(Value::String);
    }
    if let Value::String(text) = value {
        return parse_text(text, target);
    }
    match target {
        TypeRef::Enum(name) => {
            let ordinal = i32::try_from(Number::of(value)?.integral()?).ok()?;
            Some(Value::Enum {
                ty: Arc::clone(name),
                ordinal,
            })
        }
        _ => Number::of(value)?.into_value(target),
    }
}

/// Intermediate numeric form.
enum Number {
    Int(i128),
    Float(f64),
    Dec(Decimal),
}

impl Number {
    fn of(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Byte(v) => Self::Int((*v).into()),
            Value::SByte(v) => Self::Int((*v).into()),
            Value::Int16(v) => Self::Int((*v).into()),
            Value::UInt16(v) => Self::Int((*v).into()),
            Value::Int32(v) => Self::Int((*v).into()),
            Value::UInt32(v) => Self::Int((*v).into()),
            Value::Int64(v) => Self::Int((*v).into()),
            Value::UInt64(v) => Self::Int((*v).into()),
            Value::Char(c) => Self::Int(u32::from(*c).into()),
            Value::Enum { ordinal, .. } => Self::Int((*ordinal).into()),
            Value::Float(v) => Self::Float((*v).into()),
            Value::Double(v) => Self::Float(*v),
            Value::Decimal(d) => Self::Dec(*d),
            _ => return None,
        })
    }

    /// Exact integer value, if there is one.
    fn integral(&self) -> Option<i128> {
        match self {
            Self::Int(i) => Some(*i),
            // 2^127 saturates and then fails every range check below.
            Self::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i128),
            Self::Float(_) => None,
            Self::Dec(d) => d.to_i128(),
        }
    }

    fn into_value(self, target: &TypeRef) -> Option<Value> {
        Some(match target {
            TypeRef::Byte => Value::Byte(self.integral()?.try_into().ok()?),
            TypeRef::SByte => Value::SByte(self.integral()?.try_into().ok()?),
            TypeRef::Int16 => Value::Int16(self.integral()?.try_into().ok()?),
            TypeRef::UInt16 => Value::UInt16(self.integral()?.try_into().ok()?),
            TypeRef::Int32 => Value::Int32(self.integral()?.try_into().ok()?),
            TypeRef::UInt32 => Value::UInt32(self.integral()?.try_into().ok()?),
            TypeRef::Int64 => Value::Int64(self.integral()?.try_into().ok()?),
            TypeRef::UInt64 => Value::UInt64(self.integral()?.try_into().ok()?),
            TypeRef::Double => Value::Double(match self {
                Self::Int(i) => i as f64,
                Self::Float(f) => f,
                Self::Dec(d) => d.to_f64(),
            }),
            TypeRef::Float => {
                let wide = match self {
                    Self::Int(i) => i as f64,
                    Self::Float(f) => f,
                    Self::Dec(d) => d.to_f64(),
                };
                let narrow = wide as f32;
                if wide.is_finite() && narrow.is_infinite() {
                    return None;
                }
                Value::Float(narrow)
            }
            TypeRef::Decimal => Value::Decimal(match self {
                Self::Int(i) => Decimal::from_i128(i)?,
                Self::Float(f) => Decimal::from_f64(f)?,
                Self::Dec(d) => d,
            }),
            // Char, Bool, time and identifier types never come from numbers.
            _ => return None,
        })
    }
}

/// Text form of a simple value, used for conversions into `String`.
fn display_text(value: &Value) -> Option<String> {
    Some(match value {
        Value::Bool(true) => "True".to_owned(),
        Value::Bool(false) => "False".to_owned(),
        Value::Byte(v) => v.to_string(),
        Value::SByte(v) => v.to_string(),
        Value::Char(c) => c.to_string(),
        Value::Int16(v) => v.to_string(),
        Value::UInt16(v) => v.to_string(),
        Value::Int32(v) => v.to_string(),
        Value::UInt32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::UInt64(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::String(s) => s.clone(),
        Value::DateTime(dt) => dt.format(DATETIME_TEXT).to_string(),
        Value::DateTimeOffset(dt) => dt.to_rfc3339(),
        Value::TimeSpan(delta) => ticks::format_timespan(delta)?,
        Value::Guid(g) => g.to_string(),
        Value::Uri(u) => u.to_string(),
        Value::Enum { ordinal, .. } => ordinal.to_string(),
        _ => return None,
    })
}

fn parse_text(text: &str, target: &TypeRef) -> Option<Value> {
    let t = text.trim();
    Some(match target {
        TypeRef::Bool => {
            if t.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if t.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else {
                return None;
            }
        }
        TypeRef::Byte => Value::Byte(t.parse().ok()?),
        TypeRef::SByte => Value::SByte(t.parse().ok()?),
        TypeRef::Int16 => Value::Int16(t.parse().ok()?),
        TypeRef::UInt16 => Value::UInt16(t.parse().ok()?),
        TypeRef::Int32 => Value::Int32(t.parse().ok()?),
        TypeRef::UInt32 => Value::UInt32(t.parse().ok()?),
        TypeRef::Int64 => Value::Int64(t.parse().ok()?),
        TypeRef::UInt64 => Value::UInt64(t.parse().ok()?),
        TypeRef::Float => Value::Float(t.parse().ok()?),
        TypeRef::Double => Value::Double(t.parse().ok()?),
        TypeRef::Decimal => Value::Decimal(t.parse().ok()?),
        TypeRef::Char => {
            let mut chars = text.chars();
            let c = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            Value::Char(c)
        }
        TypeRef::DateTime => Value::DateTime(NaiveDateTime::parse_from_str(t, DATETIME_TEXT).ok()?),
        TypeRef::DateTimeOffset => Value::DateTimeOffset(DateTime::parse_from_rfc3339(t).ok()?),
        TypeRef::TimeSpan => Value::TimeSpan(ticks::parse_timespan(t)?),
        TypeRef::Guid => Value::Guid(Uuid::parse_str(t).ok()?),
        TypeRef::Uri => Value::Uri(Uri::new(text)),
        TypeRef::Enum(name) => Value::Enum {
            ty: Arc::clone(name),
            ordinal: t.parse().ok()?,
        },
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cast(value: Value, from: TypeRef, to: TypeRef) -> Result<Value> {
        change_type(value, &from, &to)
    }

    #[test]
    fn narrowing_is_value_based() -> Result<()> {
        assert_eq!(cast(Value::Int16(100), TypeRef::Int16, TypeRef::SByte)?, Value::SByte(100));
        assert!(matches!(
            cast(Value::Int16(300), TypeRef::Int16, TypeRef::SByte),
            Err(GraphwireError::Cast(_))
        ));
        assert!(cast(Value::Int32(-1), TypeRef::Int32, TypeRef::UInt64).is_err());
        Ok(())
    }

    #[test]
    fn widening_always_succeeds() -> Result<()> {
        assert_eq!(cast(Value::Byte(255), TypeRef::Byte, TypeRef::Int64)?, Value::Int64(255));
        assert_eq!(cast(Value::Int32(-5), TypeRef::Int32, TypeRef::Double)?, Value::Double(-5.0));
        assert_eq!(cast(Value::Float(1.5), TypeRef::Float, TypeRef::Double)?, Value::Double(1.5));
        assert_eq!(
            cast(Value::Int64(i64::MAX), TypeRef::Int64, TypeRef::Decimal)?,
            Value::Decimal(Decimal::from_i128(i64::MAX.into()).unwrap_or_default())
        );
        Ok(())
    }

    #[test]
    fn fractional_floats_do_not_become_integers() -> Result<()> {
        assert!(cast(Value::Double(2.5), TypeRef::Double, TypeRef::Int32).is_err());
        assert_eq!(cast(Value::Double(2.0), TypeRef::Double, TypeRef::Int32)?, Value::Int32(2));
        assert!(cast(Value::Double(1e300), TypeRef::Double, TypeRef::Float).is_err());
        Ok(())
    }

    #[test]
    fn nullable_sources_are_restricted() -> Result<()> {
        let nint = TypeRef::nullable(TypeRef::Int32);
        assert!(cast(Value::Int32(4), nint.clone(), TypeRef::Int64).is_err());
        assert!(cast(Value::Null, nint.clone(), TypeRef::Int32).is_err());
        assert_eq!(cast(Value::Int32(4), nint.clone(), TypeRef::String)?, Value::from("4"));
        assert_eq!(
            cast(Value::Int32(2), nint.clone(), TypeRef::enumeration("Color"))?,
            Value::enumeration("Color", 2)
        );
        assert_eq!(
            cast(Value::Int32(4), nint, TypeRef::nullable(TypeRef::Int64))?,
            Value::Int64(4)
        );
        Ok(())
    }

    #[test]
    fn chars_only_widen_to_numbers() -> Result<()> {
        assert_eq!(cast(Value::Char('A'), TypeRef::Char, TypeRef::Int32)?, Value::Int32(65));
        assert!(cast(Value::Int32(65), TypeRef::Int32, TypeRef::Char).is_err());
        assert!(cast(Value::Bool(true), TypeRef::Bool, TypeRef::Int32).is_err());
        Ok(())
    }

    #[test]
    fn strings_convert_both_ways() -> Result<()> {
        assert_eq!(cast(Value::Bool(true), TypeRef::Bool, TypeRef::String)?, Value::from("True"));
        assert_eq!(cast(Value::from(" 42 "), TypeRef::String, TypeRef::Int16)?, Value::Int16(42));
        assert!(cast(Value::from("x"), TypeRef::String, TypeRef::Int16).is_err());
        let g = Uuid::from_u128(0x1234);
        assert_eq!(
            cast(Value::Guid(g), TypeRef::Guid, TypeRef::String)
                .and_then(|s| cast(s, TypeRef::String, TypeRef::Guid))?,
            Value::Guid(g)
        );
        Ok(())
    }
}
