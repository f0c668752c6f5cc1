#![allow(missing_docs)]

use graphwire::graph::Heap;
use graphwire::{
    CompressionType, Graph, GraphwireError, Object, Result, Serializer, StreamInspector, TypeRef,
    TypeRegistry, TypeSchema, Value,
};
use std::sync::Arc;

fn registry() -> Arc<TypeRegistry> {
    let reg = TypeRegistry::new();
    reg.register(
        TypeSchema::record("Shop.Order")
            .field("Number", TypeRef::Int64)
            .field("Lines", TypeRef::list(TypeRef::named("Shop.Line")))
            .property("Notes", TypeRef::map(TypeRef::String, TypeRef::String)),
    );
    reg.register(
        TypeSchema::record("Shop.Line")
            .field("Sku", TypeRef::String)
            .field("Quantity", TypeRef::Int32),
    );
    Arc::new(reg)
}

// Generator of data. Records are allocated in the order the decoder
// rebuilds them, so round-tripped graphs compare equal.
fn create_order(lines: i32) -> Graph {
    let mut heap = Heap::new();
    let notes = Value::map(
        TypeRef::String,
        TypeRef::String,
        vec![("gift".into(), "yes".into()), ("door".into(), Value::Null)],
    );
    let order = heap.alloc(
        Object::new("Shop.Order")
            .with("Number", 9_000_000_001i64)
            .with("Lines", Value::Null)
            .with("Notes", notes),
    );
    let items = (0..lines)
        .map(|i| {
            let line = Object::new("Shop.Line")
                .with("Sku", format!("SKU-{:05}", i % 50))
                .with("Quantity", i % 7);
            Value::Object(heap.alloc(line))
        })
        .collect();
    if let Some(order) = heap.get_mut(order) {
        order.set("Lines", Value::list(TypeRef::named("Shop.Line"), items));
    }
    Graph::new(heap, Value::Object(order))
}

// --- TESTS ---

/// Every backend through the facade envelope.
#[test]
fn test_encode_decode_all_backends() -> Result<()> {
    let graph = create_order(500);
    let ty = TypeRef::named("Shop.Order");
    let mut sizes = Vec::new();
    for compression in [
        CompressionType::None,
        CompressionType::Lzo,
        CompressionType::Gzip,
        CompressionType::Deflate,
    ] {
        let s = Serializer::builder()
            .registry(registry())
            .compression(compression)
            .build();
        let bytes = s.encode(&graph, &ty)?;
        let back = s.decode(&bytes, &ty)?;
        assert_eq!(back, graph, "{compression:?}");
        sizes.push(bytes.len());
    }
    // Anything compresses better than nothing on this data.
    assert!(sizes[1..].iter().all(|&n| n < sizes[0]));
    Ok(())
}

/// Standard File IO through `save_graph` / `load_graph`.
#[test]
#[cfg(not(target_arch = "wasm32"))]
fn test_standard_file_io() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file_path = dir.path().join("order.gw");
    let graph = create_order(2000);
    let ty = TypeRef::named("Shop.Order");
    let s = Serializer::builder()
        .registry(registry())
        .compression(CompressionType::Lzo)
        .build();

    graphwire::io::save_graph(&file_path, &s, &graph, &ty)?;
    let loaded = graphwire::io::load_graph(&file_path, &s, &ty)?;
    assert_eq!(loaded, graph);
    Ok(())
}

#[test]
fn test_corrupted_envelope_is_rejected() -> Result<()> {
    let s = Serializer::builder().registry(registry()).build();
    let mut bytes = s.encode(&create_order(3), &TypeRef::Object)?;
    if let Some(last) = bytes.last_mut() {
        *last = 0x0F;
    }
    assert!(matches!(
        s.decode(&bytes, &TypeRef::Object),
        Err(GraphwireError::Compression(_))
    ));
    assert!(s.decode(&[], &TypeRef::Object).is_err());
    Ok(())
}

#[test]
fn test_global_registry_is_shared() -> Result<()> {
    TypeRegistry::global().register(TypeSchema::record("Global.Flag").field("On", TypeRef::Bool));
    let writer = Serializer::new();
    let reader = Serializer::default();
    assert!(Arc::ptr_eq(writer.registry(), reader.registry()));

    let mut heap = Heap::new();
    let id = heap.alloc(Object::new("Global.Flag").with("On", true));
    let graph = Graph::new(heap, Value::Object(id));
    let back = reader.decode(&writer.encode(&graph, &TypeRef::Object)?, &TypeRef::Object)?;
    assert_eq!(back, graph);
    Ok(())
}

#[test]
fn test_batches_run_in_parallel_and_keep_order() -> Result<()> {
    let s = Serializer::builder()
        .registry(registry())
        .compression(CompressionType::Lzo)
        .build();
    let items: Vec<(Graph, TypeRef)> = (1..=16)
        .map(|n| (create_order(n * 10), TypeRef::named("Shop.Order")))
        .collect();

    let streams = s.serialize_batch(&items)?;
    let envelopes = s.compress_batch(&streams)?;
    for (((graph, ty), raw), sealed) in items.iter().zip(&streams).zip(&envelopes) {
        assert_eq!(&s.deserialize(raw, ty)?, graph);
        assert_eq!(&s.decode(sealed, ty)?, graph);
    }
    Ok(())
}

#[test]
fn test_inspector_reads_facade_output() -> Result<()> {
    let s = Serializer::builder().registry(registry()).build();
    let bytes = s.serialize(&create_order(20), &TypeRef::named("Shop.Order"))?;
    let report = StreamInspector::inspect(&bytes)?;

    assert_eq!(report.objects, 21);
    assert_eq!(report.collections, 2);
    assert_eq!(
        report.members.get("Shop.Line").cloned(),
        Some(vec!["Sku".to_owned(), "Quantity".to_owned()])
    );
    assert!(report.type_names.contains("List<Shop.Line>"));
    Ok(())
}
