//! The main entry point: the [`Serializer`] facade and its builder.

use crate::compression::{CompressionType, CompressorRegistry};
use crate::decoder;
use crate::encoder;
use crate::error::Result;
use crate::graph::Graph;
use crate::io::{open, seal};
use crate::types::{TypeRef, TypeRegistry};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

/// Serializes and deserializes object graphs against one [`TypeRegistry`].
///
/// Every call owns its own engine state, so one `Serializer` can be shared
/// freely between threads.
///
/// ```rust
/// use graphwire::{Graph, Serializer, TypeRef, Value};
///
/// let serializer = Serializer::new();
/// let bytes = serializer.serialize(&Graph::from_value("hello"), &TypeRef::String)?;
/// let graph = serializer.deserialize(&bytes, &TypeRef::String)?;
/// assert_eq!(graph.root, Value::from("hello"));
/// # Ok::<(), graphwire::GraphwireError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Serializer {
    registry: Arc<TypeRegistry>,
    compression: CompressionType,
    compressors: Arc<CompressorRegistry>,
}

impl Serializer {
    /// Serializer over the global registry, without compression.
    pub fn new() -> Self {
        SerializerBuilder::default().build()
    }

    /// Starts a builder.
    pub fn builder() -> SerializerBuilder {
        SerializerBuilder::default()
    }

    /// The registry types are resolved against.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Compression applied by [`encode`](Self::encode).
    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    /// Writes `graph` as a raw stream, treating the root as `declared`.
    ///
    /// # Errors
    /// See [`encoder::serialize`].
    pub fn serialize(&self, graph: &Graph, declared: &TypeRef) -> Result<Vec<u8>> {
        encoder::serialize(&self.registry, graph, declared)
    }

    /// Rebuilds a graph from a raw stream, converting the root to `target`.
    ///
    /// # Errors
    /// See [`decoder::deserialize`].
    pub fn deserialize(&self, bytes: &[u8], target: &TypeRef) -> Result<Graph> {
        decoder::deserialize(&self.registry, bytes, target)
    }

    /// Serializes, compresses with the configured backend and appends the
    /// [`MetaByte`](crate::format::MetaByte) trailer.
    ///
    /// # Errors
    /// Any error of [`serialize`](Self::serialize), or
    /// [`GraphwireError::Compression`](crate::GraphwireError::Compression) from the backend.
    pub fn encode(&self, graph: &Graph, declared: &TypeRef) -> Result<Vec<u8>> {
        let raw = self.serialize(graph, declared)?;
        let sealed = seal(&raw, self.compression)?;
        debug!(raw = raw.len(), sealed = sealed.len(), compression = ?self.compression, "graph encoded");
        Ok(sealed)
    }

    /// Reverses [`encode`](Self::encode). The trailer picks the decompressor,
    /// so payloads from differently configured serializers are accepted.
    ///
    /// # Errors
    /// [`GraphwireError::CorruptedStream`](crate::GraphwireError::CorruptedStream) for a
    /// missing or malformed trailer,
    /// [`GraphwireError::Compression`](crate::GraphwireError::Compression) for an
    /// unregistered backend or a damaged payload, then any error of
    /// [`deserialize`](Self::deserialize).
    pub fn decode(&self, bytes: &[u8], target: &TypeRef) -> Result<Graph> {
        let raw = open(bytes, &self.compressors)?;
        self.deserialize(&raw, target)
    }

    /// Serializes independent graphs in parallel. Output order matches input order.
    pub fn serialize_batch(&self, items: &[(Graph, TypeRef)]) -> Result<Vec<Vec<u8>>> {
        items
            .par_iter()
            .map(|(graph, declared)| self.serialize(graph, declared))
            .collect()
    }

    /// Compresses independent buffers in parallel into envelopes.
    pub fn compress_batch<B>(&self, buffers: &[B]) -> Result<Vec<Vec<u8>>>
    where
        B: AsRef<[u8]> + Sync,
    {
        buffers
            .par_iter()
            .map(|buf| seal(buf.as_ref(), self.compression))
            .collect()
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

/// Configures a [`Serializer`].
#[derive(Debug, Default)]
pub struct SerializerBuilder {
    registry: Option<Arc<TypeRegistry>>,
    compression: CompressionType,
    compressors: Option<CompressorRegistry>,
}

impl SerializerBuilder {
    /// Resolves types against `registry` instead of the global one.
    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Backend used by [`Serializer::encode`].
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Backends available to [`Serializer::decode`], for custom compressors.
    pub fn compressors(mut self, compressors: CompressorRegistry) -> Self {
        self.compressors = Some(compressors);
        self
    }

    /// Finishes the configuration.
    pub fn build(self) -> Serializer {
        Serializer {
            registry: self.registry.unwrap_or_else(TypeRegistry::global),
            compression: self.compression,
            compressors: Arc::new(self.compressors.unwrap_or_default()),
        }
    }
}
