//! Pluggable compression backends.
//!
//! Every backend implements [`Compressor`] and is addressed by a small numeric
//! id, which the facade stores in the [`MetaByte`](crate::format::MetaByte)
//! trailer of an encoded payload. The [`CompressorRegistry`] maps ids back to
//! backends when decoding.
//!
//! | id | backend | crate |
//! |----|---------|-------|
//! | 0 | [`NoCompression`] | |
//! | 1 | [`LzoCompressor`] | built in ([`crate::lzo`]) |
//! | 2 | [`GzipCompressor`] | `flate2` |
//! | 3 | [`DeflateCompressor`] | `flate2` |
//! | 4 | `Lz4Compressor` (feature `lz4`) | `lz4_flex` |

use crate::error::{GraphwireError, Result};
use crate::lzo;
use flate2::Compression;
use flate2::read::{DeflateDecoder, GzDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};
use std::borrow::Cow;
use std::io::{Read, Write};

/// Interface for compression algorithms.
pub trait Compressor: Send + Sync + std::fmt::Debug {
    /// Id stored in the `MetaByte`. 0 is reserved for no compression.
    fn id(&self) -> u8;

    /// Compresses the data. May borrow the input when nothing is done.
    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>>;

    /// Restores the original data.
    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>>;

    /// Compresses the data and appends it to `output`.
    fn compress_append(&self, data: &[u8], output: &mut Vec<u8>) -> Result<()> {
        output.extend_from_slice(&self.compress(data)?);
        Ok(())
    }
}

/// Selects one of the built-in backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionType {
    /// Store the payload as is.
    #[default]
    None,
    /// The built-in LZO1X-class codec.
    Lzo,
    /// GZip framing around DEFLATE.
    Gzip,
    /// Raw DEFLATE.
    Deflate,
    /// LZ4 block with a 4-byte length prefix.
    #[cfg(feature = "lz4")]
    Lz4,
}

impl CompressionType {
    /// Backend id used on the wire.
    pub fn id(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Lzo => 1,
            Self::Gzip => 2,
            Self::Deflate => 3,
            #[cfg(feature = "lz4")]
            Self::Lz4 => 4,
        }
    }

    /// Fresh instance of the selected backend.
    pub fn compressor(self) -> Box<dyn Compressor> {
        match self {
            Self::None => Box::new(NoCompression),
            Self::Lzo => Box::new(LzoCompressor),
            Self::Gzip => Box::new(GzipCompressor::default()),
            Self::Deflate => Box::new(DeflateCompressor::default()),
            #[cfg(feature = "lz4")]
            Self::Lz4 => Box::new(Lz4Compressor),
        }
    }
}

/// Pass-through backend (id 0).
#[derive(Debug, Clone, Copy)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn id(&self) -> u8 {
        0
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Borrowed(data))
    }
}

/// The crate's own LZO1X-class codec (id 1).
#[derive(Debug, Clone, Copy)]
pub struct LzoCompressor;

impl Compressor for LzoCompressor {
    fn id(&self) -> u8 {
        1
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        lzo::compress(data).map(Cow::Owned)
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        lzo::decompress(data).map(Cow::Owned)
    }
}

fn flate_error(e: std::io::Error) -> GraphwireError {
    GraphwireError::Compression(e.to_string())
}

/// GZip via `flate2` (id 2).
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: Compression,
}

impl GzipCompressor {
    /// Backend with an explicit level, 0 (store) to 9 (best).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Compressor for GzipCompressor {
    fn id(&self) -> u8 {
        2
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let mut encoder = GzEncoder::new(Vec::new(), self.level);
        encoder.write_all(data).map_err(flate_error)?;
        encoder.finish().map(Cow::Owned).map_err(flate_error)
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).map_err(flate_error)?;
        Ok(Cow::Owned(out))
    }
}

/// Raw DEFLATE via `flate2` (id 3).
#[derive(Debug, Clone, Copy)]
pub struct DeflateCompressor {
    level: Compression,
}

impl DeflateCompressor {
    /// Backend with an explicit level, 0 (store) to 9 (best).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Compressor for DeflateCompressor {
    fn id(&self) -> u8 {
        3
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let mut encoder = DeflateEncoder::new(Vec::new(), self.level);
        encoder.write_all(data).map_err(flate_error)?;
        encoder.finish().map(Cow::Owned).map_err(flate_error)
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let mut decoder = DeflateDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).map_err(flate_error)?;
        Ok(Cow::Owned(out))
    }
}

/// LZ4 via `lz4_flex` (id 4).
#[cfg(feature = "lz4")]
#[derive(Debug, Clone, Copy)]
pub struct Lz4Compressor;

#[cfg(feature = "lz4")]
impl Compressor for Lz4Compressor {
    fn id(&self) -> u8 {
        4
    }

    fn compress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        Ok(Cow::Owned(lz4_flex::compress_prepend_size(data)))
    }

    fn decompress<'a>(&self, data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let vec = lz4_flex::decompress_size_prepended(data)
            .map_err(|e| GraphwireError::Compression(e.to_string()))?;
        Ok(Cow::Owned(vec))
    }

    fn compress_append(&self, data: &[u8], output: &mut Vec<u8>) -> Result<()> {
        // Same layout as `compress_prepend_size`: u32 LE length, then the block.
        let len = u32::try_from(data.len())
            .map_err(|_| GraphwireError::Compression("lz4 input exceeds 4 GiB".into()))?;
        output.extend_from_slice(&len.to_le_bytes());

        let start = output.len();
        output.resize(start + lz4_flex::block::get_maximum_output_size(data.len()), 0);
        match lz4_flex::block::compress_into(data, &mut output[start..]) {
            Ok(written) => {
                output.truncate(start + written);
                Ok(())
            }
            Err(e) => {
                output.truncate(start);
                Err(GraphwireError::Compression(e.to_string()))
            }
        }
    }
}

/// Maps backend ids to implementations.
#[derive(Debug)]
pub struct CompressorRegistry {
    algorithms: Vec<Option<Box<dyn Compressor>>>,
}

impl CompressorRegistry {
    /// Registry holding every built-in backend.
    pub fn new() -> Self {
        let mut reg = Self {
            algorithms: (0..8).map(|_| None).collect(),
        };
        reg.register(Box::new(NoCompression));
        reg.register(Box::new(LzoCompressor));
        reg.register(Box::new(GzipCompressor::default()));
        reg.register(Box::new(DeflateCompressor::default()));
        #[cfg(feature = "lz4")]
        reg.register(Box::new(Lz4Compressor));
        reg
    }

    /// Registers a backend in the slot named by its id, replacing any previous one.
    pub fn register(&mut self, algo: Box<dyn Compressor>) {
        let id = usize::from(algo.id());
        if id >= self.algorithms.len() {
            self.algorithms.resize_with(id + 1, || None);
        }
        if let Some(slot) = self.algorithms.get_mut(id) {
            *slot = Some(algo);
        }
    }

    /// Backend for `id`.
    ///
    /// # Errors
    /// Returns [`GraphwireError::Compression`] if nothing is registered under `id`.
    pub fn get(&self, id: u8) -> Result<&dyn Compressor> {
        self.algorithms
            .get(usize::from(id))
            .and_then(|slot| slot.as_deref())
            .ok_or_else(|| {
                GraphwireError::Compression(format!(
                    "algorithm id {id} is not registered or available"
                ))
            })
    }
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
