//! Deserialization engine.
//!
//! Mirrors the encoder's breadth-first walk in two phases.
//!
//! **Materialize.** Work items are dequeued in the order the encoder queued
//! them. Simple values and back-references are attached to their destination
//! at once. Records and collections become entries of an append-only record
//! list (index 0 holds the root) and queue one item per member or element.
//!
//! **Wire-up.** The record list is walked from the last entry to the first.
//! Each collection is finalized, then attached to its parent. A parent always
//! has a smaller index than its children, so one reverse pass is enough.
//!
//! A member the target type no longer has still occupies its place in the
//! stream. It is queued as `None` and its bytes are consumed without being
//! attached anywhere.

use crate::error::{GraphwireError, Result};
use crate::format::{DefaultLabel, KnownObjectLabel, NullableLabel, TypeTag};
use crate::graph::{Graph, Heap, ObjRef};
use crate::types::{
    MemberDescriptor, TypeCategory, TypeDescriptor, TypeRef, TypeRegistry, XxBuildHasher,
};
use crate::value::{Decimal, Uri, Value, change_type, default_value, ticks};
use crate::wire::WireReader;
use fixedbitset::FixedBitSet;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Smallest possible encoded value: nullable label, tag, default label.
const MIN_VALUE_LEN: usize = 3;

/// Where a finished value goes.
#[derive(Debug, Clone)]
enum Locator {
    /// The overall result.
    Root,
    /// A member of the parent record.
    Member(Arc<str>),
    /// A position in the parent collection. Maps use even slots for keys and
    /// odd slots for values.
    Slot(usize),
}

#[derive(Debug)]
struct WorkItem {
    parent: usize,
    target: TypeRef,
    locator: Locator,
}

#[derive(Debug)]
enum Shape {
    Array { elem: TypeRef, dims: Vec<usize> },
    List { elem: TypeRef },
    Map { key: TypeRef, value: TypeRef },
}

/// Collects collection elements as they arrive, in any order.
#[derive(Debug)]
pub(crate) struct PendingCollection {
    shape: Shape,
    slots: Vec<Value>,
}

impl PendingCollection {
    fn new(shape: Shape, len: usize) -> Self {
        Self {
            shape,
            slots: vec![Value::Null; len],
        }
    }

    fn put(&mut self, index: usize, value: Value) -> Result<()> {
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            GraphwireError::Internal(format!("collection slot {index} out of range"))
        })?;
        *slot = value;
        Ok(())
    }

    fn finish(self) -> Value {
        match self.shape {
            Shape::Array { elem, dims } => {
                if elem == TypeRef::Byte && dims.len() == 1 {
                    let bytes: Option<Vec<u8>> = self
                        .slots
                        .iter()
                        .map(|v| match v {
                            Value::Byte(b) => Some(*b),
                            _ => None,
                        })
                        .collect();
                    if let Some(bytes) = bytes {
                        return Value::Bytes(bytes);
                    }
                }
                Value::Array {
                    elem,
                    dims,
                    items: self.slots,
                }
            }
            Shape::List { elem } => Value::List {
                elem,
                items: self.slots,
            },
            Shape::Map { key, value } => {
                let mut entries = Vec::with_capacity(self.slots.len() / 2);
                let mut slots = self.slots.into_iter();
                while let (Some(k), Some(v)) = (slots.next(), slots.next()) {
                    entries.push((k, v));
                }
                Value::Map {
                    key,
                    value,
                    entries,
                }
            }
        }
    }
}

#[derive(Debug)]
enum Slot {
    Ready(Value),
    Pending(PendingCollection),
}

#[derive(Debug)]
struct Record {
    slot: Slot,
    parent: usize,
    locator: Locator,
}

/// Per-call state. Never shared between calls.
pub(crate) struct Decoder<'a> {
    registry: &'a TypeRegistry,
    input: WireReader<'a>,
    heap: Heap,
    queue: VecDeque<Option<WorkItem>>,
    records: Vec<Record>,
    known: Vec<Option<ObjRef>>,
    dropped: HashSet<String, XxBuildHasher>,
}

/// Rebuilds a graph from `bytes`, converting the root to `target`.
///
/// # Errors
/// * [`GraphwireError::CorruptedStream`] on truncation or malformed labels.
/// * [`GraphwireError::TypeResolution`] when a type name cannot be resolved.
/// * [`GraphwireError::Cast`] when a value cannot be converted losslessly.
/// * [`GraphwireError::Construction`] when a record type is not constructible.
pub fn deserialize(registry: &TypeRegistry, bytes: &[u8], target: &TypeRef) -> Result<Graph> {
    let mut decoder = Decoder::new(registry, bytes);
    let root = decoder.run(target)?;
    debug!(
        bytes = bytes.len(),
        objects = decoder.heap.len(),
        known = decoder.known.len(),
        "graph deserialized"
    );
    Ok(Graph::new(decoder.heap, root))
}

impl<'a> Decoder<'a> {
    fn new(registry: &'a TypeRegistry, bytes: &'a [u8]) -> Self {
        Self {
            registry,
            input: WireReader::new(bytes),
            heap: Heap::new(),
            queue: VecDeque::new(),
            records: vec![Record {
                slot: Slot::Ready(Value::Null),
                parent: 0,
                locator: Locator::Root,
            }],
            known: Vec::new(),
            dropped: HashSet::default(),
        }
    }

    fn run(&mut self, target: &TypeRef) -> Result<Value> {
        self.queue.push_back(Some(WorkItem {
            parent: 0,
            target: target.clone(),
            locator: Locator::Root,
        }));
        while let Some(item) = self.queue.pop_front() {
            match item {
                Some(item) => self.read_item(item)?,
                None => self.skip_item()?,
            }
        }
        if !self.input.is_at_end() {
            return Err(GraphwireError::CorruptedStream(format!(
                "{} trailing bytes after the last value",
                self.input.remaining()
            )));
        }

        while self.records.len() > 1 {
            let Some(record) = self.records.pop() else { break };
            let value = match record.slot {
                Slot::Ready(value) => value,
                Slot::Pending(pending) => pending.finish(),
            };
            self.attach(record.parent, &record.locator, value)?;
        }
        match self.records.pop() {
            Some(Record {
                slot: Slot::Ready(root),
                ..
            }) => Ok(root),
            _ => Err(GraphwireError::Internal("root record missing".into())),
        }
    }

    // ---- Headers -------------------------------------------------------------

    /// Reads nullable label, tag and type name. Names are only resolved when
    /// the value has a destination.
    fn read_header(&mut self, resolve: bool) -> Result<TypeRef> {
        let nullable = NullableLabel::from_byte(self.input.read_u8()?)?;
        let tag = TypeTag::from_byte(self.input.read_u8()?)?;
        let ty = match TypeRef::from_tag(tag) {
            Some(ty) => ty,
            None => {
                let name = self.input.read_str()?;
                if resolve {
                    self.registry.resolve_type(name)?
                } else {
                    TypeRef::parse(name)?
                }
            }
        };
        Ok(match nullable {
            NullableLabel::Nullable => TypeRef::nullable(ty),
            NullableLabel::NotNullable => ty,
        })
    }

    fn read_default_label(&mut self) -> Result<DefaultLabel> {
        DefaultLabel::from_byte(self.input.read_u8()?)
    }

    /// Declared `Object` and interface slots take the stream's type.
    fn resolve_target(&self, declared: &TypeRef, stream: &TypeRef) -> Result<TypeRef> {
        if *declared == TypeRef::Object {
            return Ok(stream.clone());
        }
        if self.registry.is_interface(declared) {
            return match stream.unwrap_nullable() {
                TypeRef::Named(name) if self.registry.accepts(declared, name) => Ok(stream.clone()),
                TypeRef::Object => Ok(declared.clone()),
                _ => Err(cast(stream, declared)),
            };
        }
        Ok(declared.clone())
    }

    fn check_count(&self, count: usize, min_len: usize, what: &str) -> Result<()> {
        match count.checked_mul(min_len) {
            Some(needed) if needed <= self.input.remaining() => Ok(()),
            _ => Err(GraphwireError::CorruptedStream(format!(
                "{what} of {count} exceeds the remaining {} bytes",
                self.input.remaining()
            ))),
        }
    }

    // ---- Values with a destination --------------------------------------------

    fn read_item(&mut self, item: WorkItem) -> Result<()> {
        let stream = self.read_header(true)?;
        let target = self.resolve_target(&item.target, &stream)?;
        let label = self.read_default_label()?;
        trace!(%stream, %target, ?label, "value");

        let category = stream.category();
        if category == TypeCategory::Simple {
            let value = match label {
                DefaultLabel::Default => default_value(&stream),
                DefaultLabel::NotDefault => self.read_simple(stream.unwrap_nullable())?,
            };
            let value = change_type(value, &stream, &target)?;
            return self.attach(item.parent, &item.locator, value);
        }

        if label == DefaultLabel::Default {
            if *stream.unwrap_nullable() != TypeRef::Object && stream.category() != target.category() {
                return Err(cast(&stream, &target));
            }
            return self.attach(item.parent, &item.locator, default_value(&target));
        }

        match category {
            TypeCategory::BitSet => {
                if *target.unwrap_nullable() != TypeRef::BitSet {
                    return Err(cast(&stream, &target));
                }
                let bits = self.read_bitset()?;
                self.attach(item.parent, &item.locator, Value::BitSet(bits))
            }
            TypeCategory::Array => self.read_array(item, &stream, &target),
            TypeCategory::List => {
                let TypeRef::List(elem) = target.unwrap_nullable() else {
                    return Err(cast(&stream, &target));
                };
                let elem = (**elem).clone();
                let count = self.input.read_count("list count")?;
                self.check_count(count, MIN_VALUE_LEN, "list count")?;
                let index = self.push_pending(item, Shape::List { elem: elem.clone() }, count);
                for i in 0..count {
                    self.enqueue(index, elem.clone(), Locator::Slot(i));
                }
                Ok(())
            }
            TypeCategory::Map => {
                let TypeRef::Map(key, value) = target.unwrap_nullable() else {
                    return Err(cast(&stream, &target));
                };
                let (key, value) = ((**key).clone(), (**value).clone());
                let count = self.input.read_count("map count")?;
                self.check_count(count, 2 * MIN_VALUE_LEN, "map count")?;
                let shape = Shape::Map {
                    key: key.clone(),
                    value: value.clone(),
                };
                let index = self.push_pending(item, shape, 2 * count);
                for i in 0..count {
                    self.enqueue(index, key.clone(), Locator::Slot(2 * i));
                    self.enqueue(index, value.clone(), Locator::Slot(2 * i + 1));
                }
                Ok(())
            }
            TypeCategory::Record => self.read_record(item, &stream, &target),
            TypeCategory::Simple => Err(GraphwireError::Internal("simple value fell through".into())),
        }
    }

    fn enqueue(&mut self, parent: usize, target: TypeRef, locator: Locator) {
        self.queue.push_back(Some(WorkItem {
            parent,
            target,
            locator,
        }));
    }

    fn push_pending(&mut self, item: WorkItem, shape: Shape, len: usize) -> usize {
        self.records.push(Record {
            slot: Slot::Pending(PendingCollection::new(shape, len)),
            parent: item.parent,
            locator: item.locator,
        });
        self.records.len() - 1
    }

    /// Reads rank and dimensions; returns the dimensions and element count.
    fn read_dims(&mut self, stream_rank: u8) -> Result<(Vec<usize>, usize)> {
        let rank = self.input.read_i32()?;
        if rank != i32::from(stream_rank) {
            return Err(GraphwireError::CorruptedStream(format!(
                "array rank {rank} does not match its type (rank {stream_rank})"
            )));
        }
        let mut dims = Vec::with_capacity(usize::from(stream_rank));
        let mut total = 1usize;
        for _ in 0..stream_rank {
            let d = self.input.read_count("array dimension")?;
            total = total.checked_mul(d).ok_or_else(|| {
                GraphwireError::CorruptedStream("array element count overflows".into())
            })?;
            dims.push(d);
        }
        Ok((dims, total))
    }

    fn read_array(&mut self, item: WorkItem, stream: &TypeRef, target: &TypeRef) -> Result<()> {
        let TypeRef::Array(stream_elem, rank) = stream.unwrap_nullable() else {
            return Err(GraphwireError::Internal(format!("{stream} is not an array")));
        };
        let elem = match target.unwrap_nullable() {
            TypeRef::Array(elem, r) if r == rank => (**elem).clone(),
            _ => return Err(cast(stream, target)),
        };
        let (dims, total) = self.read_dims(*rank)?;

        if **stream_elem == TypeRef::Byte && *rank == 1 {
            if elem != TypeRef::Byte {
                return Err(cast(stream, target));
            }
            let bytes = self.input.take(total, "byte array")?.to_vec();
            return self.attach(item.parent, &item.locator, Value::Bytes(bytes));
        }

        self.check_count(total, MIN_VALUE_LEN, "array length")?;
        let index = self.push_pending(
            item,
            Shape::Array {
                elem: elem.clone(),
                dims,
            },
            total,
        );
        for i in 0..total {
            self.enqueue(index, elem.clone(), Locator::Slot(i));
        }
        Ok(())
    }

    fn read_record(&mut self, item: WorkItem, stream: &TypeRef, target: &TypeRef) -> Result<()> {
        let TypeRef::Named(stream_name) = stream.unwrap_nullable() else {
            return Err(GraphwireError::CorruptedStream(format!(
                "{stream} carries no record payload"
            )));
        };
        let TypeRef::Named(target_name) = target.unwrap_nullable() else {
            return Err(cast(stream, target));
        };
        if !self.registry.castable(stream_name, target_name) {
            return Err(cast(stream, target));
        }

        match KnownObjectLabel::from_byte(self.input.read_u8()?)? {
            KnownObjectLabel::Known => {
                let value = match self.back_reference()? {
                    Some(id) => Value::Object(id),
                    None => {
                        warn!(type_name = %target_name, "back-reference to a skipped record, attaching null");
                        Value::Null
                    }
                };
                self.attach(item.parent, &item.locator, value)
            }
            KnownObjectLabel::Unknown => {
                let descriptor = self.registry.descriptor(target_name)?;
                let id = self.heap.alloc(descriptor.new_instance()?);
                self.known.push(Some(id));
                self.records.push(Record {
                    slot: Slot::Ready(Value::Object(id)),
                    parent: item.parent,
                    locator: item.locator,
                });
                let index = self.records.len() - 1;
                self.read_members(index, &descriptor, TypeDescriptor::field)?;
                self.read_members(index, &descriptor, TypeDescriptor::property)
            }
        }
    }

    fn back_reference(&mut self) -> Result<Option<ObjRef>> {
        let raw = self.input.read_i32()?;
        usize::try_from(raw)
            .ok()
            .and_then(|i| self.known.get(i).copied())
            .ok_or_else(|| {
                GraphwireError::CorruptedStream(format!(
                    "back-reference {raw} outside the {} known records",
                    self.known.len()
                ))
            })
    }

    fn read_members<F>(&mut self, parent: usize, descriptor: &TypeDescriptor, lookup: F) -> Result<()>
    where
        F: for<'d> Fn(&'d TypeDescriptor, &str) -> Option<&'d MemberDescriptor>,
    {
        let count = self.input.read_u16()?;
        for _ in 0..count {
            let name = self.input.read_str()?;
            match lookup(descriptor, name) {
                Some(member) => self.enqueue(
                    parent,
                    member.ty.clone(),
                    Locator::Member(Arc::clone(&member.name)),
                ),
                None => {
                    let key = format!("{}.{name}", descriptor.name());
                    if !self.dropped.contains(&key) {
                        warn!(member = %key, "member missing from the target type, skipping its value");
                        self.dropped.insert(key);
                    }
                    self.queue.push_back(None);
                }
            }
        }
        Ok(())
    }

    fn attach(&mut self, parent: usize, locator: &Locator, value: Value) -> Result<()> {
        match locator {
            Locator::Root => match self.records.first_mut() {
                Some(root) => {
                    root.slot = Slot::Ready(value);
                    Ok(())
                }
                None => Err(GraphwireError::Internal("root record missing".into())),
            },
            Locator::Member(name) => {
                let id = match self.records.get(parent) {
                    Some(Record {
                        slot: Slot::Ready(Value::Object(id)),
                        ..
                    }) => *id,
                    _ => {
                        return Err(GraphwireError::Internal(format!(
                            "record {parent} is not an object"
                        )));
                    }
                };
                self.heap.resolve_mut(id)?.set_shared(name, value);
                Ok(())
            }
            Locator::Slot(index) => match self.records.get_mut(parent) {
                Some(Record {
                    slot: Slot::Pending(pending),
                    ..
                }) => pending.put(*index, value),
                _ => Err(GraphwireError::Internal(format!(
                    "record {parent} is not a collection"
                ))),
            },
        }
    }

    // ---- Values without a destination ----------------------------------------

    fn skip_item(&mut self) -> Result<()> {
        let stream = self.read_header(false)?;
        if self.read_default_label()? == DefaultLabel::Default {
            return Ok(());
        }
        match stream.category() {
            TypeCategory::Simple => {
                self.read_simple(stream.unwrap_nullable())?;
            }
            TypeCategory::BitSet => {
                self.read_bitset()?;
            }
            TypeCategory::Array => {
                let TypeRef::Array(elem, rank) = stream.unwrap_nullable() else {
                    return Err(GraphwireError::Internal(format!("{stream} is not an array")));
                };
                let (_, total) = self.read_dims(*rank)?;
                if **elem == TypeRef::Byte && *rank == 1 {
                    self.input.take(total, "byte array")?;
                } else {
                    self.skip_values(total)?;
                }
            }
            TypeCategory::List => {
                let count = self.input.read_count("list count")?;
                self.skip_values(count)?;
            }
            TypeCategory::Map => {
                let count = self.input.read_count("map count")?;
                let values = count.checked_mul(2).ok_or_else(|| {
                    GraphwireError::CorruptedStream(format!("map count {count} overflows"))
                })?;
                self.skip_values(values)?;
            }
            TypeCategory::Record => {
                if *stream.unwrap_nullable() == TypeRef::Object {
                    return Err(GraphwireError::CorruptedStream(
                        "Object carries no record payload".into(),
                    ));
                }
                match KnownObjectLabel::from_byte(self.input.read_u8()?)? {
                    KnownObjectLabel::Known => {
                        self.back_reference()?;
                    }
                    KnownObjectLabel::Unknown => {
                        // Keeps later back-reference indices aligned with the writer's table.
                        self.known.push(None);
                        for _ in 0..2 {
                            let count = self.input.read_u16()?;
                            for _ in 0..count {
                                self.input.read_str()?;
                                self.queue.push_back(None);
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn skip_values(&mut self, count: usize) -> Result<()> {
        self.check_count(count, MIN_VALUE_LEN, "element count")?;
        self.queue.extend(std::iter::repeat_with(|| None).take(count));
        Ok(())
    }

    // ---- Payloads ---------------------------------------------------------------

    fn read_bitset(&mut self) -> Result<FixedBitSet> {
        let len = self.input.read_count("bit-set length")?;
        let raw = self.input.take(len, "bit-set")?;
        let mut bits = FixedBitSet::with_capacity(len);
        for (i, b) in raw.iter().enumerate() {
            match b {
                0 => {}
                1 => bits.insert(i),
                other => {
                    return Err(GraphwireError::CorruptedStream(format!(
                        "invalid bit value {other}"
                    )));
                }
            }
        }
        Ok(bits)
    }

    fn read_simple(&mut self, ty: &TypeRef) -> Result<Value> {
        let input = &mut self.input;
        Ok(match ty {
            TypeRef::Bool => Value::Bool(input.read_bool()?),
            TypeRef::Byte => Value::Byte(input.read_u8()?),
            TypeRef::SByte => Value::SByte(input.read_i8()?),
            TypeRef::Char => Value::Char(input.read_char()?),
            TypeRef::Int16 => Value::Int16(input.read_i16()?),
            TypeRef::UInt16 => Value::UInt16(input.read_u16()?),
            TypeRef::Int32 => Value::Int32(input.read_i32()?),
            TypeRef::UInt32 => Value::UInt32(input.read_u32()?),
            TypeRef::Int64 => Value::Int64(input.read_i64()?),
            TypeRef::UInt64 => Value::UInt64(input.read_u64()?),
            TypeRef::Float => Value::Float(input.read_f32()?),
            TypeRef::Double => Value::Double(input.read_f64()?),
            TypeRef::Decimal => {
                let (lo, mid, hi) = (input.read_i32()?, input.read_i32()?, input.read_i32()?);
                Value::Decimal(Decimal::from_words(lo, mid, hi, input.read_i32()?)?)
            }
            TypeRef::String => Value::String(input.read_str()?.to_owned()),
            TypeRef::Uri => Value::Uri(Uri::new(input.read_str()?)),
            TypeRef::DateTime => Value::DateTime(ticks::datetime_from_ticks(input.read_i64()?)?),
            TypeRef::DateTimeOffset => {
                Value::DateTimeOffset(ticks::offset_from_filetime(input.read_i64()?)?)
            }
            TypeRef::TimeSpan => Value::TimeSpan(ticks::timespan_from_ticks(input.read_i64()?)?),
            TypeRef::Guid => {
                let mut raw = [0u8; 16];
                raw.copy_from_slice(input.take(16, "guid")?);
                Value::Guid(Uuid::from_bytes_le(raw))
            }
            TypeRef::Enum(name) => Value::enumeration(Arc::clone(name), input.read_i32()?),
            other => {
                return Err(GraphwireError::CorruptedStream(format!(
                    "{other} has no simple payload"
                )));
            }
        })
    }
}

fn cast(stream: &TypeRef, target: &TypeRef) -> GraphwireError {
    GraphwireError::Cast(format!("cannot cast from {stream} to {target}"))
}
