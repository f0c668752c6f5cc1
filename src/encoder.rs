//! Serialization engine.
//!
//! Walks a [`Graph`] breadth-first through a FIFO work queue, so nesting depth
//! never turns into call-stack depth. Every dequeued item writes one value
//! header and, unless the value is its type's default, a payload. Collection
//! elements and record members are queued rather than written in place, which
//! fixes the order the decoder has to mirror: a record's member names appear
//! together, their values follow later in queue order.
//!
//! Records are deduplicated by [`ObjRef`] identity. The first visit writes
//! the members and appends the record to the known-object table; every later
//! visit writes only its table index. That is what terminates cycles and keeps
//! shared references shared.

use crate::error::{GraphwireError, Result};
use crate::format::{DefaultLabel, KnownObjectLabel, NullableLabel, TypeTag};
use crate::graph::{Graph, Heap, ObjRef};
use crate::types::{FastMap, MemberDescriptor, TypeCategory, TypeRef, TypeRegistry};
use crate::value::{Value, ticks};
use crate::wire::WireWriter;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

/// A value waiting to be written. `None` stands for a record member that was
/// never set and is written as the default of its declared type.
struct WorkItem<'g> {
    value: Option<&'g Value>,
    declared: TypeRef,
}

/// Per-call state. Never shared between calls.
pub(crate) struct Encoder<'g> {
    registry: &'g TypeRegistry,
    heap: &'g Heap,
    out: WireWriter,
    queue: VecDeque<WorkItem<'g>>,
    known: FastMap<ObjRef, i32>,
    wire_names: FastMap<TypeRef, Arc<str>>,
    items: usize,
}

/// Serializes `graph` with `declared` as the type of its root.
///
/// # Errors
/// Returns [`GraphwireError::Format`] when a value does not fit its declared
/// type, a record type is not registered, or a size exceeds a wire field.
pub fn serialize(registry: &TypeRegistry, graph: &Graph, declared: &TypeRef) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new(registry, &graph.heap);
    encoder.run(&graph.root, declared)?;
    debug!(
        bytes = encoder.out.len(),
        items = encoder.items,
        records = encoder.known.len(),
        "graph serialized"
    );
    Ok(encoder.out.into_inner())
}

impl<'g> Encoder<'g> {
    fn new(registry: &'g TypeRegistry, heap: &'g Heap) -> Self {
        Self {
            registry,
            heap,
            out: WireWriter::new(),
            queue: VecDeque::new(),
            known: FastMap::default(),
            wire_names: FastMap::default(),
            items: 0,
        }
    }

    fn run(&mut self, root: &'g Value, declared: &TypeRef) -> Result<()> {
        self.queue.push_back(WorkItem {
            value: Some(root),
            declared: declared.clone(),
        });
        while let Some(item) = self.queue.pop_front() {
            self.items += 1;
            match item.value {
                Some(value) => self.write_value(value, &item.declared)?,
                None => {
                    self.write_header(&item.declared)?;
                    self.out.write_u8(DefaultLabel::Default as u8);
                }
            }
        }
        Ok(())
    }

    fn write_value(&mut self, value: &'g Value, declared: &TypeRef) -> Result<()> {
        let ty = self.effective_type(value, declared)?;
        self.write_header(&ty)?;
        if value.is_default_for(&ty) {
            self.out.write_u8(DefaultLabel::Default as u8);
            return Ok(());
        }
        self.out.write_u8(DefaultLabel::NotDefault as u8);

        match ty.category() {
            TypeCategory::Simple => self.write_simple(value),
            TypeCategory::BitSet => self.write_bitset(value),
            TypeCategory::Array => self.write_array(value),
            TypeCategory::List => self.write_list(value),
            TypeCategory::Map => self.write_map(value),
            TypeCategory::Record => self.write_record(value),
        }
    }

    /// Type written to the stream for `value` in a slot declared as `declared`.
    fn effective_type(&self, value: &Value, declared: &TypeRef) -> Result<TypeRef> {
        let Some(runtime) = value.runtime_type(self.heap)? else {
            if declared.is_value_type() {
                return Err(GraphwireError::Format(format!(
                    "null value in a slot declared as non-nullable {declared}"
                )));
            }
            return Ok(declared.clone());
        };

        if *declared == TypeRef::Object || *declared == runtime {
            return Ok(runtime);
        }
        match (declared, &runtime) {
            (TypeRef::Nullable(inner), _) if **inner == runtime => Ok(declared.clone()),
            (TypeRef::Named(_), TypeRef::Named(name)) if self.registry.accepts(declared, name) => {
                Ok(runtime)
            }
            _ => Err(GraphwireError::Format(format!(
                "value of type {runtime} does not fit a slot declared as {declared}"
            ))),
        }
    }

    fn write_header(&mut self, ty: &TypeRef) -> Result<()> {
        let nullable = if ty.is_nullable() {
            NullableLabel::Nullable
        } else {
            NullableLabel::NotNullable
        };
        self.out.write_u8(nullable as u8);

        let tag = ty.tag();
        self.out.write_u8(tag.as_u8());
        if tag == TypeTag::Custom {
            let name = self.wire_name(ty.unwrap_nullable())?;
            self.out.write_str(&name);
        }
        Ok(())
    }

    fn wire_name(&mut self, ty: &TypeRef) -> Result<Arc<str>> {
        if let Some(name) = self.wire_names.get(ty) {
            return Ok(Arc::clone(name));
        }
        let name: Arc<str> = Arc::from(self.registry.wire_name(ty)?);
        self.wire_names.insert(ty.clone(), Arc::clone(&name));
        Ok(name)
    }

    fn write_simple(&mut self, value: &Value) -> Result<()> {
        let out = &mut self.out;
        match value {
            Value::Bool(v) => out.write_bool(*v),
            Value::Byte(v) => out.write_u8(*v),
            Value::SByte(v) => out.write_i8(*v),
            Value::Char(c) => out.write_char(*c),
            Value::Int16(v) => out.write_i16(*v),
            Value::UInt16(v) => out.write_u16(*v),
            Value::Int32(v) => out.write_i32(*v),
            Value::UInt32(v) => out.write_u32(*v),
            Value::Int64(v) => out.write_i64(*v),
            Value::UInt64(v) => out.write_u64(*v),
            Value::Float(v) => out.write_f32(*v),
            Value::Double(v) => out.write_f64(*v),
            Value::Decimal(d) => {
                for word in d.to_words() {
                    out.write_i32(word);
                }
            }
            Value::String(s) => out.write_str(s),
            Value::Uri(u) => out.write_str(u.as_str()),
            Value::DateTime(dt) => out.write_i64(ticks::datetime_to_ticks(dt)?),
            Value::DateTimeOffset(dt) => out.write_i64(ticks::offset_to_filetime(dt)?),
            Value::TimeSpan(delta) => out.write_i64(ticks::timespan_to_ticks(delta)?),
            Value::Guid(g) => out.write_bytes(&g.to_bytes_le()),
            Value::Enum { ordinal, .. } => out.write_i32(*ordinal),
            other => return Err(shape_mismatch("simple value", other)),
        }
        Ok(())
    }

    fn write_bitset(&mut self, value: &Value) -> Result<()> {
        let Value::BitSet(bits) = value else {
            return Err(shape_mismatch("bit-set", value));
        };
        self.out.write_i32(wire_len(bits.len(), "bit-set length")?);
        for i in 0..bits.len() {
            self.out.write_bool(bits.contains(i));
        }
        Ok(())
    }

    fn write_array(&mut self, value: &'g Value) -> Result<()> {
        match value {
            Value::Bytes(bytes) => {
                self.out.write_i32(1);
                self.out.write_i32(wire_len(bytes.len(), "array length")?);
                self.out.write_bytes(bytes);
                Ok(())
            }
            Value::Array { elem, dims, items } => {
                let expected = dims.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d));
                if dims.is_empty() || expected != Some(items.len()) {
                    return Err(GraphwireError::Format(format!(
                        "array with dimensions {dims:?} holds {} elements",
                        items.len()
                    )));
                }
                self.out.write_i32(wire_len(dims.len(), "array rank")?);
                for d in dims {
                    self.out.write_i32(wire_len(*d, "array dimension")?);
                }
                if *elem == TypeRef::Byte && dims.len() == 1 {
                    // Rank-1 byte arrays are a raw block, never per-element items.
                    for item in items {
                        match item {
                            Value::Byte(b) => self.out.write_u8(*b),
                            other => return Err(shape_mismatch("byte", other)),
                        }
                    }
                    return Ok(());
                }
                self.enqueue_all(items, elem);
                Ok(())
            }
            other => Err(shape_mismatch("array", other)),
        }
    }

    fn write_list(&mut self, value: &'g Value) -> Result<()> {
        let Value::List { elem, items } = value else {
            return Err(shape_mismatch("list", value));
        };
        self.out.write_i32(wire_len(items.len(), "list count")?);
        self.enqueue_all(items, elem);
        Ok(())
    }

    fn write_map(&mut self, value: &'g Value) -> Result<()> {
        let Value::Map {
            key,
            value: value_ty,
            entries,
        } = value
        else {
            return Err(shape_mismatch("map", value));
        };
        self.out.write_i32(wire_len(entries.len(), "map count")?);
        for (k, v) in entries {
            self.queue.push_back(WorkItem {
                value: Some(k),
                declared: key.clone(),
            });
            self.queue.push_back(WorkItem {
                value: Some(v),
                declared: value_ty.clone(),
            });
        }
        Ok(())
    }

    fn enqueue_all(&mut self, items: &'g [Value], elem: &TypeRef) {
        self.queue.extend(items.iter().map(|item| WorkItem {
            value: Some(item),
            declared: elem.clone(),
        }));
    }

    fn write_record(&mut self, value: &Value) -> Result<()> {
        let Value::Object(id) = value else {
            return Err(shape_mismatch("record", value));
        };
        if let Some(index) = self.known.get(id) {
            self.out.write_u8(KnownObjectLabel::Known as u8);
            self.out.write_i32(*index);
            trace!(object = %id, index, "back-reference");
            return Ok(());
        }

        let heap: &'g Heap = self.heap;
        let object = heap.resolve(*id)?;
        let index = wire_len(self.known.len(), "known-object index")?;
        self.known.insert(*id, index);
        self.out.write_u8(KnownObjectLabel::Unknown as u8);

        let descriptor = self.registry.descriptor(object.type_name())?;
        trace!(object = %id, type_name = %object.type_name(), index, "record");
        for members in [descriptor.fields(), descriptor.properties()] {
            self.write_members(members, |name| object.get(name))?;
        }
        Ok(())
    }

    fn write_members<F>(&mut self, members: &[MemberDescriptor], lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<&'g Value>,
    {
        let count = u16::try_from(members.len()).map_err(|_| {
            GraphwireError::Format(format!("{} members exceed the 16-bit count", members.len()))
        })?;
        self.out.write_u16(count);
        for member in members {
            self.out.write_str(&member.name);
            self.queue.push_back(WorkItem {
                value: lookup(&member.name),
                declared: member.ty.clone(),
            });
        }
        Ok(())
    }
}

fn wire_len(len: usize, what: &str) -> Result<i32> {
    i32::try_from(len)
        .map_err(|_| GraphwireError::Format(format!("{what} {len} exceeds the 32-bit wire field")))
}

fn shape_mismatch(expected: &str, found: &Value) -> GraphwireError {
    GraphwireError::Internal(format!("expected a {expected}, found {found:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Object;
    use crate::types::TypeSchema;

    fn registry() -> TypeRegistry {
        let reg = TypeRegistry::new();
        reg.register(
            TypeSchema::record("Node")
                .field("Label", TypeRef::String)
                .field("Next", TypeRef::named("Node")),
        );
        reg
    }

    #[test]
    fn default_values_have_no_payload() -> Result<()> {
        let reg = TypeRegistry::new();
        let zero = serialize(&reg, &Graph::from_value(0i32), &TypeRef::Int32)?;
        assert_eq!(zero, [0, TypeTag::Int32.as_u8(), 0]);
        let seven = serialize(&reg, &Graph::from_value(7i32), &TypeRef::Int32)?;
        assert_eq!(seven, [0, TypeTag::Int32.as_u8(), 1, 7, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn nullable_header_carries_the_inner_tag() -> Result<()> {
        let reg = TypeRegistry::new();
        let ty = TypeRef::nullable(TypeRef::Int16);
        assert_eq!(serialize(&reg, &Graph::from_value(Value::Null), &ty)?, [1, 10, 0]);
        assert_eq!(serialize(&reg, &Graph::from_value(0i16), &ty)?, [1, 10, 1, 0, 0]);
        Ok(())
    }

    #[test]
    fn object_slots_write_the_runtime_type() -> Result<()> {
        let reg = TypeRegistry::new();
        let bytes = serialize(&reg, &Graph::from_value("hi"), &TypeRef::Object)?;
        assert_eq!(bytes, [0, TypeTag::String.as_u8(), 1, 2, b'h', b'i']);
        Ok(())
    }

    #[test]
    fn cycles_become_back_references() -> Result<()> {
        let reg = registry();
        let mut heap = Heap::new();
        let a = heap.alloc(Object::new("Node").with("Label", "a"));
        let b = heap.alloc(Object::new("Node").with("Label", "b").with("Next", a));
        heap.resolve_mut(a)?.set("Next", b);
        let bytes = serialize(&reg, &Graph::new(heap, Value::Object(a)), &TypeRef::named("Node"))?;
        // The last value is `b.Next`: a known reference to table index 0.
        assert_eq!(&bytes[bytes.len() - 5..], &[KnownObjectLabel::Known as u8, 0, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn mismatched_values_are_format_errors() {
        let reg = registry();
        assert!(matches!(
            serialize(&reg, &Graph::from_value(1i64), &TypeRef::Int32),
            Err(GraphwireError::Format(_))
        ));
        assert!(matches!(
            serialize(&reg, &Graph::from_value(Value::Null), &TypeRef::Int32),
            Err(GraphwireError::Format(_))
        ));
        let mut heap = Heap::new();
        let ghost = heap.alloc(Object::new("Ghost"));
        assert!(matches!(
            serialize(&reg, &Graph::new(heap, Value::Object(ghost)), &TypeRef::Object),
            Err(GraphwireError::Format(_))
        ));
    }

    #[test]
    fn byte_arrays_are_raw_blocks() -> Result<()> {
        let reg = TypeRegistry::new();
        let ty = TypeRef::array(TypeRef::Byte);
        let raw = serialize(&reg, &Graph::from_value(vec![1u8, 2, 3]), &ty)?;
        let boxed = Value::array(TypeRef::Byte, vec![Value::Byte(1), Value::Byte(2), Value::Byte(3)]);
        assert_eq!(serialize(&reg, &Graph::from_value(boxed), &ty)?, raw);
        assert!(raw.ends_with(&[1, 0, 0, 0, 3, 0, 0, 0, 1, 2, 3]));
        Ok(())
    }
}
