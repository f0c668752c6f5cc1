//! Tools for inspecting serialized streams.
//! Useful for debugging schema drift and payload size.
//!
//! The wire carries every tag, type name, member name and count, so a stream
//! can be walked without a [`TypeRegistry`](crate::types::TypeRegistry).

use crate::error::{GraphwireError, Result};
use crate::format::{DefaultLabel, KnownObjectLabel, NullableLabel, TypeTag};
use crate::types::{TypeCategory, TypeRef};
use crate::wire::WireReader;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A structural report of a serialized stream.
#[derive(Debug, Default, Clone, Serialize)]
pub struct StreamReport {
    /// Stream length in bytes.
    pub total_bytes: usize,
    /// Type of the root value as written.
    pub root_type: String,
    /// Every value header, including elided defaults.
    pub values: usize,
    /// Values elided because they were their type's default.
    pub default_values: usize,
    /// Records written in full.
    pub objects: usize,
    /// Records written as a back-reference.
    pub back_references: usize,
    /// Bit-sets, arrays, lists and maps.
    pub collections: usize,
    /// Bytes carried by raw byte arrays.
    pub raw_bytes: usize,
    /// Member names per record type, fields first, as first seen.
    pub members: BTreeMap<String, Vec<String>>,
    /// Distinct types seen in value headers.
    pub type_names: BTreeSet<String>,
}

/// The stream inspector tool.
#[derive(Debug)]
pub struct StreamInspector;

impl StreamInspector {
    /// Walks `bytes` and returns a structural report.
    ///
    /// # Errors
    /// Returns [`GraphwireError::CorruptedStream`] for truncated or malformed
    /// streams and [`GraphwireError::TypeResolution`] for unparsable type names.
    pub fn inspect(bytes: &[u8]) -> Result<StreamReport> {
        let mut walker = Walker {
            input: WireReader::new(bytes),
            report: StreamReport {
                total_bytes: bytes.len(),
                ..StreamReport::default()
            },
            pending: 1,
        };
        while walker.pending > 0 {
            walker.pending -= 1;
            walker.value()?;
        }
        if !walker.input.is_at_end() {
            return Err(GraphwireError::CorruptedStream(format!(
                "{} trailing bytes after the last value",
                walker.input.remaining()
            )));
        }
        Ok(walker.report)
    }
}

struct Walker<'a> {
    input: WireReader<'a>,
    report: StreamReport,
    /// Values announced but not read yet. Order does not matter for counting.
    pending: usize,
}

impl Walker<'_> {
    fn announce(&mut self, count: usize) -> Result<()> {
        // Every value takes at least three bytes.
        if count.saturating_mul(3) > self.input.remaining() {
            return Err(GraphwireError::CorruptedStream(format!(
                "{count} values announced with {} bytes left",
                self.input.remaining()
            )));
        }
        self.pending += count;
        Ok(())
    }

    fn value(&mut self) -> Result<()> {
        let nullable = NullableLabel::from_byte(self.input.read_u8()?)?;
        let tag = TypeTag::from_byte(self.input.read_u8()?)?;
        let ty = match TypeRef::from_tag(tag) {
            Some(ty) => ty,
            None => TypeRef::parse(self.input.read_str()?)?,
        };
        let ty = match nullable {
            NullableLabel::Nullable => TypeRef::nullable(ty),
            NullableLabel::NotNullable => ty,
        };

        let name = ty.to_string();
        if self.report.values == 0 {
            self.report.root_type.clone_from(&name);
        }
        self.report.values += 1;
        self.report.type_names.insert(name);

        if DefaultLabel::from_byte(self.input.read_u8()?)? == DefaultLabel::Default {
            self.report.default_values += 1;
            return Ok(());
        }

        let inner = ty.unwrap_nullable();
        match inner.category() {
            TypeCategory::Simple => self.simple(inner),
            TypeCategory::BitSet => {
                self.report.collections += 1;
                let len = self.input.read_count("bit-set length")?;
                self.input.take(len, "bit-set")?;
                Ok(())
            }
            TypeCategory::Array => {
                self.report.collections += 1;
                let TypeRef::Array(elem, rank) = inner else {
                    return Ok(());
                };
                let declared = self.input.read_i32()?;
                if declared != i32::from(*rank) {
                    return Err(GraphwireError::CorruptedStream(format!(
                        "array rank {declared} does not match {inner}"
                    )));
                }
                let mut total = 1usize;
                for _ in 0..*rank {
                    let d = self.input.read_count("array dimension")?;
                    total = total.checked_mul(d).ok_or_else(|| {
                        GraphwireError::CorruptedStream("array element count overflows".into())
                    })?;
                }
                if **elem == TypeRef::Byte && *rank == 1 {
                    self.input.take(total, "byte array")?;
                    self.report.raw_bytes += total;
                    Ok(())
                } else {
                    self.announce(total)
                }
            }
            TypeCategory::List => {
                self.report.collections += 1;
                let count = self.input.read_count("list count")?;
                self.announce(count)
            }
            TypeCategory::Map => {
                self.report.collections += 1;
                let count = self.input.read_count("map count")?;
                self.announce(count.saturating_mul(2))
            }
            TypeCategory::Record => self.record(inner),
        }
    }

    fn record(&mut self, ty: &TypeRef) -> Result<()> {
        let TypeRef::Named(type_name) = ty else {
            return Err(GraphwireError::CorruptedStream(format!(
                "{ty} carries no record payload"
            )));
        };
        match KnownObjectLabel::from_byte(self.input.read_u8()?)? {
            KnownObjectLabel::Known => {
                self.input.read_i32()?;
                self.report.back_references += 1;
            }
            KnownObjectLabel::Unknown => {
                self.report.objects += 1;
                let mut names = Vec::new();
                for _ in 0..2 {
                    let count = self.input.read_u16()?;
                    for _ in 0..count {
                        names.push(self.input.read_str()?.to_owned());
                    }
                    self.announce(usize::from(count))?;
                }
                self.report
                    .members
                    .entry(type_name.to_string())
                    .or_insert(names);
            }
        }
        Ok(())
    }

    fn simple(&mut self, ty: &TypeRef) -> Result<()> {
        let fixed = match ty {
            TypeRef::Bool | TypeRef::Byte | TypeRef::SByte => 1,
            TypeRef::Int16 | TypeRef::UInt16 => 2,
            TypeRef::Int32 | TypeRef::UInt32 | TypeRef::Float | TypeRef::Enum(_) => 4,
            TypeRef::Int64
            | TypeRef::UInt64
            | TypeRef::Double
            | TypeRef::DateTime
            | TypeRef::DateTimeOffset
            | TypeRef::TimeSpan => 8,
            TypeRef::Decimal | TypeRef::Guid => 16,
            TypeRef::Char => {
                self.input.read_char()?;
                return Ok(());
            }
            TypeRef::String | TypeRef::Uri => {
                self.input.read_str()?;
                return Ok(());
            }
            other => {
                return Err(GraphwireError::CorruptedStream(format!(
                    "{other} has no simple payload"
                )));
            }
        };
        self.input.take(fixed, "simple value")?;
        Ok(())
    }
}

impl std::fmt::Display for StreamReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== GRAPHWIRE STREAM REPORT ===")?;
        writeln!(f, "Size:            {}b", self.total_bytes)?;
        writeln!(f, "Root:            {}", self.root_type)?;
        writeln!(
            f,
            "Values:          {} ({} default)",
            self.values, self.default_values
        )?;
        writeln!(
            f,
            "Objects:         {} (+{} back-references)",
            self.objects, self.back_references
        )?;
        writeln!(f, "Collections:     {}", self.collections)?;
        writeln!(f, "Raw bytes:       {}b", self.raw_bytes)?;
        if !self.members.is_empty() {
            writeln!(f, "\n[RECORD TYPES]")?;
            for (ty, members) in &self.members {
                writeln!(f, "{ty}: {}", members.join(", "))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::serialize;
    use crate::graph::{Graph, Heap, Object};
    use crate::types::{TypeRegistry, TypeSchema};
    use crate::value::Value;

    fn registry() -> TypeRegistry {
        let reg = TypeRegistry::new();
        reg.register(
            TypeSchema::record("Node")
                .field("Label", TypeRef::String)
                .field("Next", TypeRef::named("Node"))
                .property("Payload", TypeRef::array(TypeRef::Byte)),
        );
        reg
    }

    #[test]
    fn counts_objects_and_back_references() -> Result<()> {
        let reg = registry();
        let mut heap = Heap::new();
        let a = heap.alloc(Object::new("Node").with("Label", "a"));
        let b = heap.alloc(
            Object::new("Node")
                .with("Next", Value::Object(a))
                .with("Payload", Value::Bytes(vec![1, 2, 3])),
        );
        heap.resolve_mut(a)?.set("Next", Value::Object(b));

        let bytes = serialize(&reg, &Graph::new(heap, Value::Object(a)), &TypeRef::named("Node"))?;
        let report = StreamInspector::inspect(&bytes)?;

        assert_eq!(report.total_bytes, bytes.len());
        assert_eq!(report.root_type, "Node");
        assert_eq!(report.objects, 2);
        assert_eq!(report.back_references, 1);
        assert_eq!(report.raw_bytes, 3);
        assert_eq!(
            report.members.get("Node").map(Vec::as_slice),
            Some(["Label", "Next", "Payload"].map(String::from).as_slice())
        );
        // a.Payload and b.Label are elided.
        assert_eq!(report.default_values, 2);
        assert!(report.to_string().contains("Node: Label, Next, Payload"));
        Ok(())
    }

    #[test]
    fn report_serializes_to_json() -> Result<()> {
        let bytes = serialize(
            &TypeRegistry::new(),
            &Graph::from_value(Value::list(TypeRef::Int32, vec![Value::Int32(1), Value::Int32(0)])),
            &TypeRef::list(TypeRef::Int32),
        )?;
        let report = StreamInspector::inspect(&bytes)?;
        assert_eq!(report.values, 3);
        assert_eq!(report.collections, 1);
        let json = serde_json::to_value(&report).map_err(|e| GraphwireError::Internal(e.to_string()))?;
        assert_eq!(json["root_type"], "List<Int32>");
        Ok(())
    }

    #[test]
    fn truncation_is_reported() -> Result<()> {
        let bytes = serialize(&TypeRegistry::new(), &Graph::from_value(7i64), &TypeRef::Int64)?;
        assert!(StreamInspector::inspect(&bytes[..bytes.len() - 1]).is_err());
        Ok(())
    }
}
