//! Object graphs with shared and cyclic references.
//!
//! Records live in a [`Heap`] arena and refer to each other through [`ObjRef`]
//! index handles, so back-edges never own their target. A [`Graph`] pairs a
//! heap with the root value handed to the serializer or returned by the
//! deserializer.

/// Defines `Heap`, `Object` and `Graph`.
pub mod core;
/// Defines the `ObjRef` handle.
pub mod id;

pub use core::{Graph, Heap, Object};
pub use id::ObjRef;
