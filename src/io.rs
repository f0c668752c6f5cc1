//! File helpers.
//!
//! Files written here hold an envelope: the (possibly compressed) payload
//! followed by one [`MetaByte`] naming the compressor. Reads go through a
//! memory map; writes are buffered.

use crate::api::Serializer;
use crate::compression::{CompressionType, CompressorRegistry};
use crate::error::{GraphwireError, Result};
use crate::format::MetaByte;
use crate::graph::Graph;
use crate::types::TypeRef;
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Wraps `payload` compressed with `compression` into an envelope.
pub(crate) fn seal(payload: &[u8], compression: CompressionType) -> Result<Vec<u8>> {
    let compressor = compression.compressor();
    let mut out = Vec::with_capacity(payload.len() / 2 + 1);
    compressor.compress_append(payload, &mut out)?;
    out.push(MetaByte::new(compressor.id()).as_u8());
    Ok(out)
}

/// Splits an envelope and restores its payload.
pub(crate) fn open(envelope: &[u8], compressors: &CompressorRegistry) -> Result<Vec<u8>> {
    let Some((&last, body)) = envelope.split_last() else {
        return Err(GraphwireError::eof("envelope trailer"));
    };
    let meta = MetaByte::from_byte(last)?;
    let compressor = compressors.get(meta.compression_method())?;
    Ok(compressor.decompress(body)?.into_owned())
}

/// Maps `path` read-only and hands its bytes to `f`.
fn with_mapped<T>(path: &Path, f: impl FnOnce(&[u8]) -> Result<T>) -> Result<T> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return f(&[]);
    }
    // Safety: the map is dropped before returning; external modification of
    // the file while it is mapped is not guarded against.
    #[allow(unsafe_code)]
    let mmap = unsafe { Mmap::map(&file)? };
    f(&mmap)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}

/// Compresses `input` into an envelope file at `output`. Returns the bytes written.
pub fn compress_file<P, Q>(input: P, output: Q, compression: CompressionType) -> Result<u64>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let sealed = with_mapped(input.as_ref(), |data| seal(data, compression))?;
    write_file(output.as_ref(), &sealed)?;
    debug!(
        input = %input.as_ref().display(),
        compressed = sealed.len(),
        ?compression,
        "file compressed"
    );
    Ok(sealed.len() as u64)
}

/// Restores a file written by [`compress_file`]. Returns the bytes written.
pub fn decompress_file<P, Q>(input: P, output: Q) -> Result<u64>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let compressors = CompressorRegistry::new();
    let data = with_mapped(input.as_ref(), |envelope| open(envelope, &compressors))?;
    write_file(output.as_ref(), &data)?;
    Ok(data.len() as u64)
}

/// Encodes `graph` with `serializer` and writes the envelope to `path`.
pub fn save_graph<P: AsRef<Path>>(
    path: P,
    serializer: &Serializer,
    graph: &Graph,
    declared: &TypeRef,
) -> Result<()> {
    let bytes = serializer.encode(graph, declared)?;
    write_file(path.as_ref(), &bytes)
}

/// Reads an envelope written by [`save_graph`] and rebuilds the graph.
pub fn load_graph<P: AsRef<Path>>(path: P, serializer: &Serializer, target: &TypeRef) -> Result<Graph> {
    with_mapped(path.as_ref(), |bytes| serializer.decode(bytes, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_names_its_compressor() -> Result<()> {
        let payload = b"abcabcabcabcabcabc".repeat(10);
        for ty in [CompressionType::None, CompressionType::Lzo, CompressionType::Gzip] {
            let sealed = seal(&payload, ty)?;
            assert_eq!(sealed.last().copied(), Some(ty.id()));
            assert_eq!(open(&sealed, &CompressorRegistry::new())?, payload);
        }
        Ok(())
    }

    #[test]
    fn empty_envelope_is_corrupted() {
        assert!(matches!(
            open(&[], &CompressorRegistry::new()),
            Err(GraphwireError::CorruptedStream(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = std::env::temp_dir().join("graphwire-does-not-exist.bin");
        assert!(matches!(
            decompress_file(&dir, dir.with_extension("out")),
            Err(GraphwireError::Io(_))
        ));
    }
}
