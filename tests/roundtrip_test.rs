#![allow(missing_docs)]

use chrono::{NaiveDate, TimeDelta, TimeZone, Utc};
use fixedbitset::FixedBitSet;
use graphwire::graph::Heap;
use graphwire::value::ticks;
use graphwire::{
    Decimal, Graph, GraphwireError, Object, Result, Serializer, TypeRef, TypeRegistry, TypeSchema,
    Uri, Value,
};
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

fn serializer() -> Serializer {
    Serializer::builder()
        .registry(Arc::new(TypeRegistry::new()))
        .build()
}

fn roundtrip(value: Value, ty: &TypeRef) -> Result<Value> {
    let s = serializer();
    let bytes = s.serialize(&Graph::from_value(value), ty)?;
    Ok(s.deserialize(&bytes, ty)?.root)
}

fn assert_roundtrips(ty: TypeRef, values: Vec<Value>) -> Result<()> {
    for value in values {
        assert_eq!(roundtrip(value.clone(), &ty)?, value, "{ty}");
    }
    Ok(())
}

// --- SIMPLE TYPES ---

#[test]
fn integer_boundaries() -> Result<()> {
    assert_roundtrips(TypeRef::Byte, vec![0u8.into(), 1u8.into(), 127u8.into(), u8::MAX.into()])?;
    assert_roundtrips(TypeRef::SByte, vec![i8::MIN.into(), 0i8.into(), 42i8.into(), i8::MAX.into()])?;
    assert_roundtrips(TypeRef::Int16, vec![i16::MIN.into(), 0i16.into(), (-300i16).into(), i16::MAX.into()])?;
    assert_roundtrips(TypeRef::UInt16, vec![0u16.into(), 5000u16.into(), u16::MAX.into()])?;
    assert_roundtrips(TypeRef::Int32, vec![i32::MIN.into(), 0i32.into(), 123_456i32.into(), i32::MAX.into()])?;
    assert_roundtrips(TypeRef::UInt32, vec![0u32.into(), 1u32.into(), u32::MAX.into()])?;
    assert_roundtrips(TypeRef::Int64, vec![i64::MIN.into(), 0i64.into(), (-7i64).into(), i64::MAX.into()])?;
    assert_roundtrips(TypeRef::UInt64, vec![0u64.into(), 99u64.into(), u64::MAX.into()])
}

#[test]
fn float_boundaries() -> Result<()> {
    assert_roundtrips(
        TypeRef::Float,
        vec![f32::MIN.into(), 0f32.into(), 1.5f32.into(), f32::MAX.into(), f32::INFINITY.into()],
    )?;
    assert_roundtrips(
        TypeRef::Double,
        vec![f64::MIN.into(), 0f64.into(), (-2.25f64).into(), f64::MAX.into(), f64::EPSILON.into()],
    )?;
    let nan = roundtrip(Value::Double(f64::NAN), &TypeRef::Double)?;
    assert!(matches!(nan, Value::Double(v) if v.is_nan()));
    Ok(())
}

#[test]
fn negative_zero_keeps_its_sign() -> Result<()> {
    let double = roundtrip(Value::Double(-0.0), &TypeRef::Double)?;
    assert!(matches!(double, Value::Double(v) if v == 0.0 && v.is_sign_negative()));
    let float = roundtrip(Value::Float(-0.0), &TypeRef::Float)?;
    assert!(matches!(float, Value::Float(v) if v == 0.0 && v.is_sign_negative()));
    Ok(())
}

#[test]
fn decimal_boundaries() -> Result<()> {
    let max = Decimal::new((1i128 << 96) - 1, 0);
    let min = Decimal::new(-((1i128 << 96) - 1), 0);
    let mid = Decimal::new(-123_456_789, 4);
    let tiny = Decimal::new(1, 28);
    let values = [max, min, mid, tiny, Some(Decimal::ZERO)]
        .into_iter()
        .map(|d| d.map(Value::Decimal).ok_or_else(|| GraphwireError::Internal("decimal".into())))
        .collect::<Result<Vec<_>>>()?;
    assert_roundtrips(TypeRef::Decimal, values)
}

#[test]
fn text_and_identifiers() -> Result<()> {
    assert_roundtrips(
        TypeRef::String,
        vec![Value::Null, "".into(), "plain".into(), "ünïcødé ✓ 漢字".into(), "x".repeat(70_000).into()],
    )?;
    assert_roundtrips(
        TypeRef::Char,
        vec!['\0'.into(), 'a'.into(), 'é'.into(), '漢'.into(), '\u{1F600}'.into()],
    )?;
    assert_roundtrips(
        TypeRef::Guid,
        vec![Uuid::nil().into(), Uuid::from_u128(0x0123_4567_89ab_cdef_fedc_ba98_7654_3210).into(), Uuid::from_u128(u128::MAX).into()],
    )?;
    assert_roundtrips(
        TypeRef::Uri,
        vec![Value::Null, Uri::new("https://example.org/a?b=c").into()],
    )?;
    assert_roundtrips(TypeRef::Bool, vec![true.into(), false.into()])
}

#[test]
fn dates_and_durations() -> Result<()> {
    let mid = NaiveDate::from_ymd_opt(2024, 2, 29)
        .and_then(|d| d.and_hms_nano_opt(13, 45, 12, 123_456_700))
        .ok_or_else(|| GraphwireError::Internal("date".into()))?;
    let last = ticks::datetime_from_ticks(3_155_378_975_999_999_999)?;
    assert_roundtrips(
        TypeRef::DateTime,
        vec![ticks::datetime_epoch().into(), mid.into(), last.into()],
    )?;

    assert_roundtrips(
        TypeRef::TimeSpan,
        vec![
            TimeDelta::zero().into(),
            TimeDelta::milliseconds(-1500).into(),
            ticks::timespan_from_ticks(i64::MAX)?.into(),
            ticks::timespan_from_ticks(i64::MIN)?.into(),
        ],
    )?;

    let utc = Utc
        .with_ymd_and_hms(1999, 12, 31, 23, 59, 59)
        .single()
        .ok_or_else(|| GraphwireError::Internal("date".into()))?;
    assert_roundtrips(
        TypeRef::DateTimeOffset,
        vec![ticks::offset_epoch().into(), utc.fixed_offset().into()],
    )
}

#[test]
fn offsets_read_back_as_the_same_instant() -> Result<()> {
    let plus_two = chrono::FixedOffset::east_opt(2 * 3600)
        .and_then(|tz| tz.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).single())
        .ok_or_else(|| GraphwireError::Internal("date".into()))?;
    let back = roundtrip(plus_two.into(), &TypeRef::DateTimeOffset)?;
    let Value::DateTimeOffset(back) = back else {
        panic!("expected an offset date, got {back:?}");
    };
    assert_eq!(back, plus_two);
    assert_eq!(back.offset().local_minus_utc(), 0);
    Ok(())
}

#[test]
fn offsets_before_1601_are_rejected() -> Result<()> {
    let early = Utc
        .with_ymd_and_hms(1500, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| GraphwireError::Internal("date".into()))?;
    assert!(matches!(
        roundtrip(early.fixed_offset().into(), &TypeRef::DateTimeOffset),
        Err(GraphwireError::Format(_))
    ));
    Ok(())
}

#[test]
fn sub_tick_precision_is_rejected() -> Result<()> {
    let fine = NaiveDate::from_ymd_opt(2020, 1, 1)
        .and_then(|d| d.and_hms_nano_opt(0, 0, 0, 123))
        .ok_or_else(|| GraphwireError::Internal("date".into()))?;
    assert!(matches!(roundtrip(fine.into(), &TypeRef::DateTime), Err(GraphwireError::Format(_))));
    assert!(matches!(
        roundtrip(fine.and_utc().fixed_offset().into(), &TypeRef::DateTimeOffset),
        Err(GraphwireError::Format(_))
    ));
    assert!(matches!(
        roundtrip(TimeDelta::nanoseconds(1_050).into(), &TypeRef::TimeSpan),
        Err(GraphwireError::Format(_))
    ));

    let whole = fine - TimeDelta::nanoseconds(23);
    assert_eq!(roundtrip(whole.into(), &TypeRef::DateTime)?, Value::DateTime(whole));
    Ok(())
}

// --- DEFAULT ELISION ---

#[test]
fn default_members_are_elided_and_still_roundtrip() -> Result<()> {
    let reg = TypeRegistry::new();
    reg.register(
        TypeSchema::record("Acme.Counter")
            .field("Name", TypeRef::String)
            .field("Id", TypeRef::Int32),
    );
    let s = Serializer::builder().registry(Arc::new(reg)).build();
    let ty = TypeRef::named("Acme.Counter");

    let mut streams = Vec::new();
    for id in [0i32, 5] {
        let mut heap = Heap::new();
        let root = heap.alloc(Object::new("Acme.Counter").with("Name", "c").with("Id", id));
        let bytes = s.serialize(&Graph::new(heap, Value::Object(root)), &ty)?;

        let back = s.deserialize(&bytes, &ty)?;
        let obj = back.root_object().ok_or_else(|| GraphwireError::Internal("root".into()))?;
        assert_eq!(back.member(obj, "Id"), Some(&Value::Int32(id)));
        assert_eq!(back.member(obj, "Name"), Some(&Value::from("c")));
        streams.push(bytes.len());
    }
    assert!(streams[0] < streams[1], "{streams:?}");
    Ok(())
}

#[test]
fn enums_and_nullables() -> Result<()> {
    let color = TypeRef::enumeration("Color");
    assert_roundtrips(
        color.clone(),
        vec![Value::enumeration("Color", 0), Value::enumeration("Color", -4)],
    )?;
    assert_roundtrips(
        TypeRef::nullable(TypeRef::Int32),
        vec![Value::Null, 0i32.into(), 17i32.into()],
    )?;
    assert_roundtrips(
        TypeRef::nullable(color),
        vec![Value::Null, Value::enumeration("Color", 3)],
    )
}

// --- COLLECTIONS ---

#[test]
fn collections_keep_order_and_shape() -> Result<()> {
    let mut bits = FixedBitSet::with_capacity(11);
    bits.insert(0);
    bits.insert(7);
    bits.insert(10);
    assert_roundtrips(TypeRef::BitSet, vec![bits.into(), FixedBitSet::with_capacity(3).into()])?;

    let list_ty = TypeRef::list(TypeRef::String);
    assert_roundtrips(
        list_ty,
        vec![
            Value::list(TypeRef::String, vec![]),
            Value::list(TypeRef::String, vec!["a".into(), Value::Null, "".into(), "d".into()]),
        ],
    )?;

    let grid_ty = TypeRef::array_of_rank(TypeRef::Int32, 2);
    let grid = Value::array_nd(
        TypeRef::Int32,
        vec![2, 3],
        (0..6).map(Value::Int32).collect(),
    );
    assert_roundtrips(grid_ty, vec![grid])?;

    let map_ty = TypeRef::map(TypeRef::String, TypeRef::nullable(TypeRef::Int64));
    let map = Value::map(
        TypeRef::String,
        TypeRef::nullable(TypeRef::Int64),
        vec![
            ("zeta".into(), 1i64.into()),
            ("alpha".into(), Value::Null),
            ("mid".into(), 0i64.into()),
        ],
    );
    assert_roundtrips(map_ty, vec![map])
}

#[test]
fn byte_arrays_are_raw_blocks() -> Result<()> {
    let payload: Vec<u8> = (0..=255).collect();
    let s = serializer();
    let ty = TypeRef::array(TypeRef::Byte);
    let bytes = s.serialize(&Graph::from_value(payload.clone()), &ty)?;
    // Header, custom name, label, rank, one dimension, then the block.
    assert!(bytes.len() < payload.len() + 32);
    assert!(bytes.ends_with(&payload));
    assert_eq!(s.deserialize(&bytes, &ty)?.root, Value::Bytes(payload));
    Ok(())
}

#[test]
fn object_slots_carry_runtime_types() -> Result<()> {
    let items = vec![
        Value::Int32(5),
        "five".into(),
        Value::Null,
        Value::list(TypeRef::Bool, vec![true.into()]),
        Value::Bytes(vec![9, 8]),
    ];
    let value = Value::array(TypeRef::Object, items);
    assert_roundtrips(TypeRef::array(TypeRef::Object), vec![value])
}

// --- CONVERSIONS ---

#[test]
fn widening_reads_succeed() -> Result<()> {
    let s = serializer();
    let bytes = s.serialize(&Graph::from_value(-12i16), &TypeRef::Int16)?;
    assert_eq!(s.deserialize(&bytes, &TypeRef::Int64)?.root, Value::Int64(-12));
    assert_eq!(s.deserialize(&bytes, &TypeRef::Double)?.root, Value::Double(-12.0));
    assert_eq!(s.deserialize(&bytes, &TypeRef::String)?.root, Value::from("-12"));
    assert_eq!(s.deserialize(&bytes, &TypeRef::SByte)?.root, Value::SByte(-12));
    Ok(())
}

#[test]
fn lossy_reads_fail_with_cast_error() -> Result<()> {
    let s = serializer();
    let bytes = s.serialize(&Graph::from_value(1000i16), &TypeRef::Int16)?;
    assert!(matches!(s.deserialize(&bytes, &TypeRef::SByte), Err(GraphwireError::Cast(_))));
    assert!(matches!(s.deserialize(&bytes, &TypeRef::Bool), Err(GraphwireError::Cast(_))));

    let bytes = s.serialize(&Graph::from_value(2.5f64), &TypeRef::Double)?;
    assert!(matches!(s.deserialize(&bytes, &TypeRef::Int32), Err(GraphwireError::Cast(_))));

    let bytes = s.serialize(&Graph::from_value(Value::Null), &TypeRef::nullable(TypeRef::Int32))?;
    assert!(matches!(s.deserialize(&bytes, &TypeRef::Int32), Err(GraphwireError::Cast(_))));
    Ok(())
}

// --- PROPERTIES ---

proptest! {
    #[test]
    fn any_i64_roundtrips(v in any::<i64>()) {
        prop_assert_eq!(roundtrip(Value::Int64(v), &TypeRef::Int64).ok(), Some(Value::Int64(v)));
    }

    #[test]
    fn any_string_roundtrips(s in ".*") {
        let v = Value::String(s);
        prop_assert_eq!(roundtrip(v.clone(), &TypeRef::String).ok(), Some(v));
    }

    #[test]
    fn int_lists_roundtrip(items in proptest::collection::vec(any::<i32>(), 0..64)) {
        let v = Value::list(TypeRef::Int32, items.into_iter().map(Value::Int32).collect());
        prop_assert_eq!(roundtrip(v.clone(), &TypeRef::list(TypeRef::Int32)).ok(), Some(v));
    }

    #[test]
    fn narrowing_succeeds_exactly_when_the_value_fits(v in any::<i32>()) {
        let s = serializer();
        let bytes = s.serialize(&Graph::from_value(v), &TypeRef::Int32).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let read = s.deserialize(&bytes, &TypeRef::Int16);
        match i16::try_from(v) {
            Ok(small) => prop_assert_eq!(read.ok().map(|g| g.root), Some(Value::Int16(small))),
            Err(_) => prop_assert!(matches!(read, Err(GraphwireError::Cast(_)))),
        }
    }
}
