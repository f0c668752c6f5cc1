//! Little-endian primitive codec over in-memory buffers.
//!
//! [`WireWriter`] appends to a growable buffer and cannot fail.
//! [`WireReader`] is a cursor over a borrowed slice; every read is
//! bounds-checked and reports truncation as
//! [`GraphwireError::CorruptedStream`].

use crate::error::{GraphwireError, Result};

/// Upper bound on a 7-bit encoded length (matches a signed 32-bit length).
const MAX_PREFIXED_LEN: u64 = i32::MAX as u64;

/// Append-only encoder.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consumes the writer and returns the buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a Unicode scalar as its UTF-8 bytes.
    pub fn write_char(&mut self, c: char) {
        let mut tmp = [0u8; 4];
        self.buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes an unsigned LEB128 value (7 bits per byte, high bit = continuation).
    pub fn write_7bit(&mut self, mut v: u64) {
        while v >= 0x80 {
            self.buf.push((v as u8) | 0x80);
            v >>= 7;
        }
        self.buf.push(v as u8);
    }

    /// Writes a 7-bit length prefix followed by the UTF-8 bytes.
    pub fn write_str(&mut self, s: &str) {
        self.write_7bit(s.len() as u64);
        self.buf.extend_from_slice(s.as_bytes());
    }
}

/// Bounds-checked cursor over an encoded buffer.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// True once every byte was consumed.
    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// Takes `n` bytes or fails with a truncation error naming `what`.
    pub fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| GraphwireError::eof(what))?;
        let slice = self.data.get(self.pos..end).ok_or_else(|| GraphwireError::eof(what))?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let slice = self.take(N, what)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>("byte")?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(i8::from_le_bytes(self.array("sbyte")?))
    }

    /// Any non-zero byte reads as `true`.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array("uint16")?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.array("int16")?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array("uint32")?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array("int32")?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array("uint64")?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array("int64")?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array("single")?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.array("double")?))
    }

    /// Reads one UTF-8 encoded scalar.
    pub fn read_char(&mut self) -> Result<char> {
        let lead = self.read_u8()?;
        let width = match lead {
            0x00..=0x7F => 1,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => {
                return Err(GraphwireError::CorruptedStream(format!(
                    "invalid UTF-8 lead byte {lead:#04x} in char"
                )));
            }
        };
        let mut tmp = [lead, 0, 0, 0];
        let rest = self.take(width - 1, "char")?;
        tmp[1..width].copy_from_slice(rest);
        std::str::from_utf8(&tmp[..width])
            .ok()
            .and_then(|s| s.chars().next())
            .ok_or_else(|| GraphwireError::CorruptedStream("invalid UTF-8 in char".into()))
    }

    /// Reads an unsigned LEB128 value of at most 5 bytes.
    pub fn read_7bit(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(GraphwireError::CorruptedStream(
            "7-bit encoded length is too long".into(),
        ))
    }

    /// Reads a 7-bit length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> Result<&'a str> {
        let len = self.read_7bit()?;
        if len > MAX_PREFIXED_LEN {
            return Err(GraphwireError::CorruptedStream(format!(
                "string length {len} out of range"
            )));
        }
        let bytes = self.take(len as usize, "string")?;
        std::str::from_utf8(bytes)
            .map_err(|e| GraphwireError::CorruptedStream(format!("invalid UTF-8 in string: {e}")))
    }

    /// Reads a signed 32-bit count and rejects negative values.
    pub fn read_count(&mut self, what: &str) -> Result<usize> {
        let raw = self.read_i32()?;
        usize::try_from(raw)
            .map_err(|_| GraphwireError::CorruptedStream(format!("negative {what}: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_bit_lengths_cross_byte_boundaries() -> Result<()> {
        let mut w = WireWriter::new();
        for v in [0u64, 127, 128, 16_383, 16_384, i32::MAX as u64] {
            w.write_7bit(v);
        }
        let bytes = w.into_inner();
        assert_eq!(&bytes[..3], &[0x00, 0x7F, 0x80]);

        let mut r = WireReader::new(&bytes);
        for v in [0u64, 127, 128, 16_383, 16_384, i32::MAX as u64] {
            assert_eq!(r.read_7bit()?, v);
        }
        assert!(r.is_at_end());
        Ok(())
    }

    #[test]
    fn truncated_reads_are_stream_errors() {
        let mut r = WireReader::new(&[1, 2, 3]);
        assert!(matches!(r.read_i32(), Err(GraphwireError::CorruptedStream(_))));
        // The failed read does not advance the cursor.
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn chars_use_utf8_width() -> Result<()> {
        let mut w = WireWriter::new();
        for c in ['a', 'é', '€', '🦀'] {
            w.write_char(c);
        }
        let bytes = w.into_inner();
        assert_eq!(bytes.len(), 1 + 2 + 3 + 4);
        let mut r = WireReader::new(&bytes);
        for c in ['a', 'é', '€', '🦀'] {
            assert_eq!(r.read_char()?, c);
        }
        Ok(())
    }

    #[test]
    fn oversized_string_prefix_is_rejected() {
        let mut w = WireWriter::new();
        w.write_7bit(10);
        w.write_bytes(b"abc");
        let bytes = w.into_inner();
        assert!(WireReader::new(&bytes).read_str().is_err());
    }
}
