//! # Graphwire
//!
//! A compact binary codec for object graphs with shared and cyclic references,
//! plus a built-in LZO1X-class compressor.
//!
//! ## Overview
//!
//! Graphwire writes a whole graph of records, collections and simple values
//! into one self-describing byte stream, and rebuilds it on the other side.
//! The stream carries type tags, type names and member names, so readers can
//! tolerate schema drift between the writing and the reading program.
//!
//! ### Key Features
//!
//! *   **Breadth-First Traversal:** Both engines drive an explicit FIFO queue
//!     instead of recursing, so deep or long graphs never exhaust the stack.
//! *   **Reference Identity:** A record reached twice is written once; later
//!     occurrences become back-references, which also closes cycles.
//! *   **Default Elision:** Values equal to their type's default carry no payload.
//! *   **Schema Drift:** Members added to the reading type keep their defaults,
//!     members removed from it are consumed and dropped, and renamed
//!     namespaces or versioned names resolve by short name.
//! *   **Lossless Conversion:** A stream value may be read into a different
//!     simple type as long as the value fits. Narrowing that loses data fails.
//! *   **Compression:** The [`lzo`] codec, plus GZip/Deflate (`flate2`) and LZ4
//!     (`lz4_flex`) through one [`Compressor`] interface.
//!
//! ## Architecture
//!
//! ### The Data Model
//!
//! Types are described explicitly: a [`TypeSchema`] lists a record's fields
//! and properties and is registered once in a [`TypeRegistry`]. Values are
//! dynamic [`Value`]s; records live in a [`Heap`](graph::Heap) arena and are
//! referenced by [`ObjRef`] handles. A [`Graph`] pairs the heap with its root.
//!
//! ### Wire Format
//!
//! Every value starts with a header:
//! ```text
//! [Nullable Label] [Type Tag] [Type Name (custom tag only)] [Default Label] [Payload?]
//! ```
//! Records continue with a known-object marker and either a back-reference
//! index or their member names, whose values are queued behind everything
//! already pending.
//!
//! ### Engines
//!
//! The [`encoder`] walks the graph and owns the known-object table. The
//! [`decoder`] materializes records and collections in stream order, then
//! wires children into parents in one reverse pass.
//!
//! ## Usage Patterns
//!
//! ```rust
//! use graphwire::{Graph, Object, Serializer, TypeRef, TypeRegistry, TypeSchema, Value};
//! use graphwire::graph::Heap;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(TypeRegistry::new());
//! registry.register(
//!     TypeSchema::record("Shop.Customer")
//!         .field("Name", TypeRef::String)
//!         .field("Visits", TypeRef::Int32),
//! );
//! let serializer = Serializer::builder().registry(registry).build();
//!
//! let mut heap = Heap::new();
//! let id = heap.alloc(Object::new("Shop.Customer").with("Name", "Ada").with("Visits", 3));
//! let graph = Graph::new(heap, Value::Object(id));
//!
//! let bytes = serializer.encode(&graph, &TypeRef::Object)?;
//! let back = serializer.decode(&bytes, &TypeRef::named("Shop.Customer"))?;
//! let root = back.root_object().ok_or(graphwire::GraphwireError::Internal("no root".into()))?;
//! assert_eq!(back.member(root, "Visits"), Some(&Value::Int32(3)));
//! # Ok::<(), graphwire::GraphwireError>(())
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **Encapsulated Unsafe:** the only `unsafe` is the memory map in [`io`].
//! * **No Panics:** No `unwrap()` or `panic!()` calls in the library (enforced by clippy lints).
//! * **Comprehensive Errors:** All failures correspond to a [`GraphwireError`] variant.
//! * **Untrusted Input:** Counts and lengths are checked against the remaining
//!   input before anything is allocated.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod api;
pub mod compression;
pub mod error;
pub mod format;
pub mod graph;
pub mod inspector;
pub mod io;
pub mod lzo;
pub mod types;
pub mod value;

// --- ENGINES ---
pub mod decoder;
pub mod encoder;

// Private modules
pub(crate) mod wire;

// --- RE-EXPORTS ---

#[cfg(feature = "lz4")]
pub use compression::Lz4Compressor;
pub use compression::{
    CompressionType, Compressor, CompressorRegistry, DeflateCompressor, GzipCompressor,
    LzoCompressor, NoCompression,
};

pub use api::{Serializer, SerializerBuilder};
pub use decoder::deserialize;
pub use encoder::serialize;
pub use error::{GraphwireError, Result};
pub use graph::{Graph, Object, ObjRef};
pub use inspector::{StreamInspector, StreamReport};
pub use types::{TypeRef, TypeRegistry, TypeSchema};
pub use value::{Decimal, Uri, Value};
