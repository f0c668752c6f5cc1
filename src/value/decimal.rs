//! 96-bit scaled decimal.
//!
//! The value is `(-1)^negative * mantissa / 10^scale` with a 96-bit mantissa
//! and a scale of 0..=28. On the wire it is four 32-bit words: the low, middle
//! and high mantissa words, then a flags word holding the scale in bits 16-23
//! and the sign in bit 31.

use crate::error::{GraphwireError, Result};
use std::fmt;
use std::str::FromStr;

const MAX_SCALE: u8 = 28;
const MANTISSA_LIMIT: u128 = 1 << 96;
const SCALE_MASK: u32 = 0x00FF_0000;
const SIGN_MASK: u32 = 0x8000_0000;

/// Scaled decimal. Equality is numeric, so `1.0 == 1.00`.
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    mantissa: u128,
    scale: u8,
    negative: bool,
}

impl Decimal {
    /// Zero.
    pub const ZERO: Decimal = Decimal {
        mantissa: 0,
        scale: 0,
        negative: false,
    };

    /// Builds `mantissa / 10^scale`. Fails if the mantissa needs more than 96
    /// bits or the scale exceeds 28.
    pub fn new(mantissa: i128, scale: u8) -> Option<Self> {
        let magnitude = mantissa.unsigned_abs();
        (magnitude < MANTISSA_LIMIT && scale <= MAX_SCALE).then_some(Self {
            mantissa: magnitude,
            scale,
            negative: mantissa < 0,
        })
    }

    /// Exact integer conversion.
    pub fn from_i128(v: i128) -> Option<Self> {
        Self::new(v, 0)
    }

    /// Converts a finite float through its shortest round-trip decimal text.
    pub fn from_f64(v: f64) -> Option<Self> {
        if !v.is_finite() {
            return None;
        }
        format!("{v}").parse().ok()
    }

    /// Rebuilds a decimal from its four wire words.
    pub fn from_words(lo: i32, mid: i32, hi: i32, flags: i32) -> Result<Self> {
        let flags = flags as u32;
        if flags & !(SCALE_MASK | SIGN_MASK) != 0 {
            return Err(GraphwireError::CorruptedStream(format!(
                "invalid decimal flags {flags:#010x}"
            )));
        }
        let scale = ((flags & SCALE_MASK) >> 16) as u8;
        if scale > MAX_SCALE {
            return Err(GraphwireError::CorruptedStream(format!(
                "decimal scale {scale} out of range"
            )));
        }
        Ok(Self {
            mantissa: u128::from(lo as u32)
                | (u128::from(mid as u32) << 32)
                | (u128::from(hi as u32) << 64),
            scale,
            negative: flags & SIGN_MASK != 0,
        })
    }

    /// The four wire words: lo, mid, hi, flags.
    pub fn to_words(&self) -> [i32; 4] {
        let mut flags = u32::from(self.scale) << 16;
        if self.negative {
            flags |= SIGN_MASK;
        }
        [
            self.mantissa as u32 as i32,
            (self.mantissa >> 32) as u32 as i32,
            (self.mantissa >> 64) as u32 as i32,
            flags as i32,
        ]
    }

    /// Number of fractional digits.
    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// True for any representation of zero.
    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    /// Same value with trailing fractional zeros removed.
    pub fn normalized(&self) -> Self {
        let mut out = *self;
        while out.scale > 0 && out.mantissa % 10 == 0 {
            out.mantissa /= 10;
            out.scale -= 1;
        }
        if out.mantissa == 0 {
            out.negative = false;
        }
        out
    }

    /// Integer value if there is no fractional part.
    pub fn to_i128(&self) -> Option<i128> {
        let n = self.normalized();
        if n.scale != 0 {
            return None;
        }
        let magnitude = i128::try_from(n.mantissa).ok()?;
        Some(if n.negative { -magnitude } else { magnitude })
    }

    /// Nearest binary float.
    pub fn to_f64(&self) -> f64 {
        let magnitude = self.mantissa as f64 / 10f64.powi(i32::from(self.scale));
        if self.negative { -magnitude } else { magnitude }
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.normalized(), other.normalized());
        a.mantissa == b.mantissa && a.scale == b.scale && a.negative == b.negative
    }
}

impl Default for Decimal {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.to_string();
        let scale = usize::from(self.scale);
        let sign = if self.negative && self.mantissa != 0 { "-" } else { "" };
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

impl FromStr for Decimal {
    type Err = GraphwireError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || GraphwireError::Cast(format!("'{s}' is not a valid decimal"));
        let text = s.trim();
        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let scale = u8::try_from(frac_part.len())
            .ok()
            .filter(|s| *s <= MAX_SCALE)
            .ok_or_else(invalid)?;
        let mut mantissa: u128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(u128::from(b - b'0')))
                .filter(|m| *m < MANTISSA_LIMIT)
                .ok_or_else(invalid)?;
        }
        Ok(Self {
            mantissa,
            scale,
            negative,
        })
    }
}
