//! LZO1X-1 class compressor and a bounds-checked decompressor.
//!
//! ## Stream layout
//!
//! ```text
//! [ instructions ... ] [ 0x11 0x00 0x00 ] [ u32 LE uncompressed length ]
//! ```
//!
//! Instructions alternate between literal runs and back-references. A
//! back-reference falls in one of three match classes:
//!
//! | class | offset      | length                 | opcode       |
//! |-------|-------------|------------------------|--------------|
//! | M2    | <= 0x800    | 3..=8                  | `0b LLL OOO SS` + 1 byte |
//! | M3    | <= 0x4000   | 2..=33, then extended  | `0b 001 LLLLL` + 2 bytes |
//! | M4    | <= 0xBFFF   | 2..=9, then extended   | `0b 0001 H LLL` + 2 bytes |
//!
//! The two low bits of a match's first offset byte (`SS`) hold the length of
//! a literal run of up to three bytes that follows it. Longer lengths are
//! extended with a zero marker, one `0x00` per additional 255 and a final
//! remainder byte. An M4 match with a zero offset is the end marker.

use crate::error::{GraphwireError, Result};
use tracing::trace;

const D_BITS: u32 = 14;
const D_MASK: usize = (1 << D_BITS) - 1;
const DICT_SIZE: usize = D_MASK + 1;

const M2_MAX_LEN: usize = 8;
const M2_MAX_OFFSET: usize = 0x0800;
const M3_MARKER: u8 = 32;
const M3_MAX_OFFSET: usize = 0x4000;
const M3_MAX_LEN: usize = 33;
const M4_MARKER: u8 = 16;
const M4_MAX_LEN: usize = 9;
const M4_MAX_OFFSET: usize = 0xBFFF;

/// Inputs this short are stored as one literal run.
const MIN_MATCH_INPUT: usize = M2_MAX_LEN + 5;
const END_MARKER: [u8; 3] = [M4_MARKER | 1, 0, 0];
const TRAILER_LEN: usize = 4;
/// One extension byte yields at most 255 output bytes.
const MAX_EXPANSION: usize = 256;

fn corrupted(msg: &str) -> GraphwireError {
    GraphwireError::CorruptedStream(format!("lzo: {msg}"))
}

/// Compresses `input`. The result always ends with the end marker and the
/// 4-byte length trailer, so even an empty input produces 7 bytes.
///
/// # Errors
/// Returns [`GraphwireError::Compression`] if the input does not fit the
/// 32-bit length trailer.
pub fn compress(input: &[u8]) -> Result<Vec<u8>> {
    let declared = u32::try_from(input.len()).map_err(|_| {
        GraphwireError::Compression(format!(
            "lzo: input of {} bytes exceeds the 4 GiB limit",
            input.len()
        ))
    })?;

    let mut out = Vec::with_capacity(input.len() + input.len() / 16 + 64 + 3 + TRAILER_LEN);
    let tail_start = if input.len() <= MIN_MATCH_INPUT {
        0
    } else {
        compress_core(input, &mut out)
    };

    let tail = &input[tail_start..];
    if !tail.is_empty() {
        if out.is_empty() && tail.len() <= 238 {
            out.push(17 + tail.len() as u8);
            out.extend_from_slice(tail);
        } else {
            emit_literals(&mut out, tail);
        }
    }

    out.extend_from_slice(&END_MARKER);
    out.extend_from_slice(&declared.to_le_bytes());
    trace!(input = input.len(), output = out.len(), "lzo compressed");
    Ok(out)
}

fn primary_index(src: &[u8], ip: usize) -> usize {
    let x = (((u32::from(src[ip + 2]) << 5) ^ u32::from(src[ip + 1])) << 5) ^ u32::from(src[ip]);
    ((0x21u32.wrapping_mul(x) >> 5) as usize) & D_MASK
}

fn secondary_index(index: usize) -> usize {
    (index & (D_MASK & 0x7FF)) ^ (((D_MASK >> 1) + 1) | 0x1F)
}

enum Probe {
    Miss,
    Hit(usize),
    /// In range but unlikely to extend past three bytes; try the other slot.
    Weak,
}

fn probe(src: &[u8], dict: &[usize], ip: usize, index: usize) -> Probe {
    let pos = dict[index];
    if pos >= ip || ip - pos > M4_MAX_OFFSET {
        Probe::Miss
    } else if ip - pos <= M2_MAX_OFFSET || src[pos + 3] == src[ip + 3] {
        Probe::Hit(pos)
    } else {
        Probe::Weak
    }
}

/// Main match loop. Returns where the trailing literal run begins.
fn compress_core(src: &[u8], out: &mut Vec<u8>) -> usize {
    let mut dict = vec![0usize; DICT_SIZE];
    let in_end = src.len();
    // Keeps `ip + M2_MAX_LEN` inside the input for the short-match check.
    let ip_end = in_end - MIN_MATCH_INPUT;
    let mut ii = 0;
    let mut ip = 4;

    loop {
        let first = primary_index(src, ip);
        let (index, candidate) = match probe(src, &dict, ip, first) {
            Probe::Miss => (first, None),
            Probe::Hit(pos) => (first, Some(pos)),
            Probe::Weak => {
                let second = secondary_index(first);
                match probe(src, &dict, ip, second) {
                    Probe::Hit(pos) => (second, Some(pos)),
                    _ => (second, None),
                }
            }
        };
        dict[index] = ip;

        let Some(mpos) = candidate.filter(|&pos| src[pos..pos + 3] == src[ip..ip + 3]) else {
            ip += 1;
            if ip >= ip_end {
                break;
            }
            continue;
        };

        if ip > ii {
            emit_literals(out, &src[ii..ip]);
        }

        let offset = ip - mpos;
        let mut len = 3;
        while len <= M2_MAX_LEN && src[mpos + len] == src[ip + len] {
            len += 1;
        }
        if len <= M2_MAX_LEN {
            emit_short_match(out, offset, len);
        } else {
            while ip + len < in_end && src[mpos + len] == src[ip + len] {
                len += 1;
            }
            emit_long_match(out, offset, len);
        }

        ip += len;
        ii = ip;
        if ip >= ip_end {
            break;
        }
    }
    ii
}

fn push_extension(out: &mut Vec<u8>, mut remainder: usize) {
    while remainder > 255 {
        remainder -= 255;
        out.push(0);
    }
    out.push(remainder as u8);
}

fn emit_literals(out: &mut Vec<u8>, literals: &[u8]) {
    let t = literals.len();
    if t <= 3 {
        // Short runs ride in the state bits of the previous match.
        if let Some(state) = out.len().checked_sub(2).and_then(|i| out.get_mut(i)) {
            *state |= t as u8;
        }
    } else if t <= 18 {
        out.push((t - 3) as u8);
    } else {
        out.push(0);
        push_extension(out, t - 18);
    }
    out.extend_from_slice(literals);
}

fn push_offset(out: &mut Vec<u8>, offset: usize) {
    out.push(((offset & 63) << 2) as u8);
    out.push((offset >> 6) as u8);
}

fn m4_marker(offset: usize) -> u8 {
    M4_MARKER | ((offset & 0x4000) >> 11) as u8
}

fn emit_short_match(out: &mut Vec<u8>, offset: usize, len: usize) {
    if offset <= M2_MAX_OFFSET {
        let offset = offset - 1;
        out.push((((len - 1) << 5) | ((offset & 7) << 2)) as u8);
        out.push((offset >> 3) as u8);
    } else if offset <= M3_MAX_OFFSET {
        out.push(M3_MARKER | (len - 2) as u8);
        push_offset(out, offset - 1);
    } else {
        let offset = offset - 0x4000;
        out.push(m4_marker(offset) | (len - 2) as u8);
        push_offset(out, offset);
    }
}

fn emit_long_match(out: &mut Vec<u8>, offset: usize, len: usize) {
    if offset <= M3_MAX_OFFSET {
        if len <= M3_MAX_LEN {
            out.push(M3_MARKER | (len - 2) as u8);
        } else {
            out.push(M3_MARKER);
            push_extension(out, len - M3_MAX_LEN);
        }
        push_offset(out, offset - 1);
    } else {
        let offset = offset - 0x4000;
        if len <= M4_MAX_LEN {
            out.push(m4_marker(offset) | (len - 2) as u8);
        } else {
            out.push(m4_marker(offset));
            push_extension(out, len - M4_MAX_LEN);
        }
        push_offset(out, offset);
    }
}

/// Decompresses a stream produced by [`compress`].
///
/// The format carries no checksum. Structural damage is detected, but
/// altered literal bytes decode to altered output of the declared length.
///
/// # Errors
/// Returns [`GraphwireError::CorruptedStream`] if the stream is truncated,
/// references data before the start of the output, would write past the
/// declared length, lacks the end marker, or has bytes left after it.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
    if input.len() < END_MARKER.len() + TRAILER_LEN {
        return Err(corrupted("stream shorter than its end marker"));
    }
    let (body, trailer) = input.split_at(input.len() - TRAILER_LEN);
    let mut len_bytes = [0u8; TRAILER_LEN];
    len_bytes.copy_from_slice(trailer);
    let declared = u32::from_le_bytes(len_bytes) as usize;
    if declared > body.len().saturating_mul(MAX_EXPANSION).saturating_add(MAX_EXPANSION) {
        return Err(corrupted("declared length exceeds the maximum expansion"));
    }

    let mut decoder = Decoder {
        src: body,
        ip: 0,
        out: Vec::with_capacity(declared),
        limit: declared,
    };
    decoder.run()?;

    if decoder.ip != body.len() {
        return Err(corrupted("input not consumed after the end marker"));
    }
    if decoder.out.len() != declared {
        return Err(corrupted("output length differs from the trailer"));
    }
    trace!(input = input.len(), output = declared, "lzo decompressed");
    Ok(decoder.out)
}

#[derive(Debug, Clone, Copy)]
enum Step {
    /// Next byte is a literal run length or a match opcode.
    Instruction,
    /// A literal run just ended; a small opcode here is a 3-byte M1 match.
    AfterLiteralRun,
    /// Decode the match with this opcode.
    Match(usize),
    /// Copy this many literals, then read a match opcode.
    TrailingLiterals(usize),
}

enum MatchEnd {
    Continue,
    EndMarker,
}

struct Decoder<'a> {
    src: &'a [u8],
    ip: usize,
    out: Vec<u8>,
    limit: usize,
}

impl Decoder<'_> {
    fn run(&mut self) -> Result<()> {
        let mut step = Step::Instruction;
        if let Some(&first) = self.src.first()
            && first > 17
        {
            self.ip = 1;
            let t = usize::from(first - 17);
            if t < 4 {
                step = Step::TrailingLiterals(t);
            } else {
                self.literals(t)?;
                step = Step::AfterLiteralRun;
            }
        }

        loop {
            step = match step {
                Step::Instruction => {
                    let t = self.byte()?;
                    if t >= 16 {
                        Step::Match(t)
                    } else {
                        let run = if t == 0 { self.extended(15)? } else { t };
                        self.literals(run + 3)?;
                        Step::AfterLiteralRun
                    }
                }
                Step::AfterLiteralRun => {
                    let t = self.byte()?;
                    if t >= 16 {
                        Step::Match(t)
                    } else {
                        let back = 1 + M2_MAX_OFFSET + (t >> 2) + (self.byte()? << 2);
                        self.back_copy(back, 3)?;
                        self.after_match()?
                    }
                }
                Step::Match(t) => match self.copy_match(t)? {
                    MatchEnd::EndMarker => return Ok(()),
                    MatchEnd::Continue => self.after_match()?,
                },
                Step::TrailingLiterals(n) => {
                    self.literals(n)?;
                    Step::Match(self.byte()?)
                }
            };
        }
    }

    fn copy_match(&mut self, t: usize) -> Result<MatchEnd> {
        if t >= 64 {
            let back = 1 + ((t >> 2) & 7) + (self.byte()? << 3);
            self.back_copy(back, (t >> 5) + 1)?;
        } else if t >= 32 {
            let len = match t & 31 {
                0 => self.extended(31)?,
                n => n,
            };
            let back = 1 + (self.le16()? >> 2);
            self.back_copy(back, len + 2)?;
        } else if t >= 16 {
            let high = (t & 8) << 11;
            let len = match t & 7 {
                0 => self.extended(7)?,
                n => n,
            };
            let back = high + (self.le16()? >> 2);
            if back == 0 {
                if len != 1 {
                    return Err(corrupted("malformed end marker"));
                }
                return Ok(MatchEnd::EndMarker);
            }
            self.back_copy(back + 0x4000, len + 2)?;
        } else {
            let back = 1 + (t >> 2) + (self.byte()? << 2);
            self.back_copy(back, 2)?;
        }
        Ok(MatchEnd::Continue)
    }

    /// Literal count carried in the low bits of the last match's offset byte.
    fn after_match(&self) -> Result<Step> {
        let state = self
            .ip
            .checked_sub(2)
            .and_then(|i| self.src.get(i))
            .ok_or_else(|| corrupted("match without offset bytes"))?
            & 3;
        Ok(match state {
            0 => Step::Instruction,
            n => Step::TrailingLiterals(usize::from(n)),
        })
    }

    fn byte(&mut self) -> Result<usize> {
        let b = self
            .src
            .get(self.ip)
            .ok_or_else(|| corrupted("input overrun"))?;
        self.ip += 1;
        Ok(usize::from(*b))
    }

    fn le16(&mut self) -> Result<usize> {
        let lo = self.byte()?;
        let hi = self.byte()?;
        Ok(lo | (hi << 8))
    }

    fn extended(&mut self, base: usize) -> Result<usize> {
        let mut len = base;
        loop {
            match self.byte()? {
                0 => {
                    len += 255;
                    if len > self.limit {
                        return Err(corrupted("run length exceeds the declared output"));
                    }
                }
                b => return Ok(len + b),
            }
        }
    }

    fn reserve(&self, n: usize) -> Result<()> {
        if self.limit - self.out.len() < n {
            return Err(corrupted("output overrun"));
        }
        Ok(())
    }

    fn literals(&mut self, n: usize) -> Result<()> {
        self.reserve(n)?;
        let run = self
            .ip
            .checked_add(n)
            .and_then(|end| self.src.get(self.ip..end))
            .ok_or_else(|| corrupted("input overrun"))?;
        self.out.extend_from_slice(run);
        self.ip += n;
        Ok(())
    }

    fn back_copy(&mut self, back: usize, n: usize) -> Result<()> {
        let start = self
            .out
            .len()
            .checked_sub(back)
            .ok_or_else(|| corrupted("lookbehind overrun"))?;
        self.reserve(n)?;
        if back >= n {
            self.out.extend_from_within(start..start + n);
        } else {
            // Overlapping copy repeats the last `back` bytes.
            for i in start..start + n {
                let b = self.out[i];
                self.out.push(b);
            }
        }
        Ok(())
    }
}
