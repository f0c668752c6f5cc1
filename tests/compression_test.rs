#![allow(missing_docs)]

use graphwire::compression::{CompressionType, Compressor};
use graphwire::{GraphwireError, Result, lzo};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.r#gen::<u8>()).collect()
}

/// Text-like data: random words from a small vocabulary, so matches of every
/// distance and length show up.
fn wordy_bytes(len: usize, seed: u64) -> Vec<u8> {
    const WORDS: [&str; 12] = [
        "graph", "wire ", "node", " edge ", "record", "\n", "0123", "queue", "  ", "map<", ">", "list",
    ];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(len + 8);
    while out.len() < len {
        out.extend_from_slice(WORDS[rng.gen_range(0..WORDS.len())].as_bytes());
    }
    out.truncate(len);
    out
}

#[test]
fn random_buffers_roundtrip() -> Result<()> {
    for (i, len) in [0usize, 1, 1000, 1_000_000].into_iter().enumerate() {
        let data = random_bytes(len, 0xC0FFEE + i as u64);
        let packed = lzo::compress(&data)?;
        assert_eq!(lzo::decompress(&packed)?, data, "len {len}");
    }
    Ok(())
}

#[test]
fn compressible_buffers_roundtrip_and_shrink() -> Result<()> {
    for len in [3usize, 17, 300, 4096, 70_000, 1_000_000] {
        let data = wordy_bytes(len, len as u64);
        let packed = lzo::compress(&data)?;
        assert_eq!(lzo::decompress(&packed)?, data, "len {len}");
        if len >= 4096 {
            assert!(packed.len() < data.len() * 3 / 4, "len {len}: {}", packed.len());
        }
    }
    Ok(())
}

#[test]
fn repeated_bytes_do_not_expand() -> Result<()> {
    let data = vec![0x5A; 1000];
    let packed = lzo::compress(&data)?;
    assert!(packed.len() <= data.len());
    assert_eq!(lzo::decompress(&packed)?, data);
    Ok(())
}

#[test]
fn any_truncation_is_detected() -> Result<()> {
    for data in [wordy_bytes(2000, 7), random_bytes(500, 8), vec![1, 2, 3]] {
        let packed = lzo::compress(&data)?;
        for k in 1..=packed.len() {
            let cut = &packed[..packed.len() - k];
            assert!(
                matches!(lzo::decompress(cut), Err(GraphwireError::CorruptedStream(_))),
                "truncated by {k} of {}",
                packed.len()
            );
        }
    }
    Ok(())
}

#[test]
fn flipped_length_trailer_is_detected() -> Result<()> {
    let data = wordy_bytes(5000, 3);
    let mut packed = lzo::compress(&data)?;
    let last = packed.len() - 1;
    packed[last] ^= 0x01;
    assert!(lzo::decompress(&packed).is_err());
    Ok(())
}

#[test]
fn every_backend_roundtrips_serializer_output() -> Result<()> {
    let mut backends = vec![
        CompressionType::None,
        CompressionType::Lzo,
        CompressionType::Gzip,
        CompressionType::Deflate,
    ];
    #[cfg(feature = "lz4")]
    backends.push(CompressionType::Lz4);

    let data = wordy_bytes(50_000, 11);
    for ty in backends {
        let backend = ty.compressor();
        let packed = backend.compress(&data)?;
        assert_eq!(backend.decompress(&packed)?.as_ref(), data.as_slice(), "{ty:?}");
    }
    Ok(())
}

#[test]
fn file_helpers_roundtrip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("plain.bin");
    let packed = dir.path().join("plain.bin.lzo");
    let restored = dir.path().join("restored.bin");

    let data = wordy_bytes(100_000, 5);
    std::fs::write(&input, &data)?;

    let written = graphwire::io::compress_file(&input, &packed, CompressionType::Lzo)?;
    assert!(written < data.len() as u64);
    let restored_len = graphwire::io::decompress_file(&packed, &restored)?;
    assert_eq!(restored_len, data.len() as u64);
    assert_eq!(std::fs::read(&restored)?, data);
    Ok(())
}

#[test]
fn empty_file_roundtrips() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("empty");
    let packed = dir.path().join("empty.gz");
    let restored = dir.path().join("empty.out");
    std::fs::write(&input, b"")?;

    graphwire::io::compress_file(&input, &packed, CompressionType::Gzip)?;
    graphwire::io::decompress_file(&packed, &restored)?;
    assert!(std::fs::read(&restored)?.is_empty());
    Ok(())
}
