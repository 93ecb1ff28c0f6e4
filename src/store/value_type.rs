//! On-disk value encodings and the typed buffers that hold them.
//!
//! Every encoding round-trips through a win percentage in `[0, 100]`:
//!
//! | Type | Width | Stored as | Resolution |
//! |------|-------|-----------|------------|
//! | `U8` | 1 | `round(p / 100 * u8::MAX)` | ~0.39 |
//! | `U16` | 2 | `round(p / 100 * u16::MAX)` | ~0.0015 |
//! | `U32` | 4 | `round(p / 100 * u32::MAX)` | ~2.3e-8 |
//! | `U64` | 8 | `p / 100 * u64::MAX`, limited by `f64` | ~1e-14 |
//! | `F32` | 4 | `p` as `f32` | ~7.6e-6 near 100 |
//! | `Percent16` | 2 | hundredths of a percent, `0..=10000` | 0.01 |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    U8,
    U16,
    U32,
    U64,
    F32,
    Percent16,
}

impl ValueType {
    pub const ALL: [ValueType; 6] = [
        ValueType::U8,
        ValueType::U16,
        ValueType::U32,
        ValueType::U64,
        ValueType::F32,
        ValueType::Percent16,
    ];

    /// Bytes per stored value.
    pub fn width(self) -> usize {
        match self {
            ValueType::U8 => 1,
            ValueType::U16 | ValueType::Percent16 => 2,
            ValueType::U32 | ValueType::F32 => 4,
            ValueType::U64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::U8 => "u8",
            ValueType::U16 => "u16",
            ValueType::U32 => "u32",
            ValueType::U64 => "u64",
            ValueType::F32 => "f32",
            ValueType::Percent16 => "percent16",
        }
    }

    /// Whether raw integer access is meaningful for this encoding.
    pub fn is_integer(self) -> bool {
        !matches!(self, ValueType::F32)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ValueType::ALL
            .into_iter()
            .find(|vt| vt.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::config(format!("unknown value type '{s}'")))
    }
}

#[inline(always)]
fn clamp_percent(percent: f64) -> f64 {
    percent.clamp(0.0, 100.0)
}

#[inline(always)]
fn scale_to(percent: f64, max: f64) -> f64 {
    (clamp_percent(percent) / 100.0 * max).round()
}

/// Values of one chunk, stored in the chunk's encoding.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    Percent16(Vec<u16>),
}

impl ValueBuffer {
    pub fn new(value_type: ValueType) -> Self {
        Self::with_capacity(value_type, 0)
    }

    pub fn with_capacity(value_type: ValueType, capacity: usize) -> Self {
        match value_type {
            ValueType::U8 => ValueBuffer::U8(Vec::with_capacity(capacity)),
            ValueType::U16 => ValueBuffer::U16(Vec::with_capacity(capacity)),
            ValueType::U32 => ValueBuffer::U32(Vec::with_capacity(capacity)),
            ValueType::U64 => ValueBuffer::U64(Vec::with_capacity(capacity)),
            ValueType::F32 => ValueBuffer::F32(Vec::with_capacity(capacity)),
            ValueType::Percent16 => ValueBuffer::Percent16(Vec::with_capacity(capacity)),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            ValueBuffer::U8(_) => ValueType::U8,
            ValueBuffer::U16(_) => ValueType::U16,
            ValueBuffer::U32(_) => ValueType::U32,
            ValueBuffer::U64(_) => ValueType::U64,
            ValueBuffer::F32(_) => ValueType::F32,
            ValueBuffer::Percent16(_) => ValueType::Percent16,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ValueBuffer::U8(v) => v.len(),
            ValueBuffer::U16(v) | ValueBuffer::Percent16(v) => v.len(),
            ValueBuffer::U32(v) => v.len(),
            ValueBuffer::U64(v) => v.len(),
            ValueBuffer::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Win percentage at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> f64 {
        match self {
            ValueBuffer::U8(v) => v[index] as f64 / u8::MAX as f64 * 100.0,
            ValueBuffer::U16(v) => v[index] as f64 / u16::MAX as f64 * 100.0,
            ValueBuffer::U32(v) => v[index] as f64 / u32::MAX as f64 * 100.0,
            ValueBuffer::U64(v) => v[index] as f64 / u64::MAX as f64 * 100.0,
            ValueBuffer::F32(v) => v[index] as f64,
            ValueBuffer::Percent16(v) => v[index] as f64 / 100.0,
        }
    }

    /// Store a win percentage at `index`; values outside `[0, 100]` are clamped.
    #[inline]
    pub fn set(&mut self, index: usize, percent: f64) {
        match self {
            ValueBuffer::U8(v) => v[index] = scale_to(percent, u8::MAX as f64) as u8,
            ValueBuffer::U16(v) => v[index] = scale_to(percent, u16::MAX as f64) as u16,
            ValueBuffer::U32(v) => v[index] = scale_to(percent, u32::MAX as f64) as u32,
            ValueBuffer::U64(v) => v[index] = (clamp_percent(percent) / 100.0 * u64::MAX as f64) as u64,
            ValueBuffer::F32(v) => v[index] = clamp_percent(percent) as f32,
            ValueBuffer::Percent16(v) => v[index] = (clamp_percent(percent) * 100.0).round() as u16,
        }
    }

    pub fn push(&mut self, percent: f64) {
        match self {
            ValueBuffer::U8(v) => v.push(0),
            ValueBuffer::U16(v) | ValueBuffer::Percent16(v) => v.push(0),
            ValueBuffer::U32(v) => v.push(0),
            ValueBuffer::U64(v) => v.push(0),
            ValueBuffer::F32(v) => v.push(0.0),
        }
        let last = self.len() - 1;
        self.set(last, percent);
    }

    /// Raw stored integer at `index`. Not defined for `F32`.
    pub fn get_raw(&self, index: usize) -> Result<u64> {
        match self {
            ValueBuffer::U8(v) => Ok(v[index] as u64),
            ValueBuffer::U16(v) | ValueBuffer::Percent16(v) => Ok(v[index] as u64),
            ValueBuffer::U32(v) => Ok(v[index] as u64),
            ValueBuffer::U64(v) => Ok(v[index]),
            ValueBuffer::F32(_) => Err(Error::RawAccess {
                value_type: ValueType::F32,
            }),
        }
    }

    /// Append a raw integer, truncated to the encoding's width.
    pub fn push_raw(&mut self, raw: u64) -> Result<()> {
        match self {
            ValueBuffer::U8(v) => v.push(raw as u8),
            ValueBuffer::U16(v) | ValueBuffer::Percent16(v) => v.push(raw as u16),
            ValueBuffer::U32(v) => v.push(raw as u32),
            ValueBuffer::U64(v) => v.push(raw),
            ValueBuffer::F32(_) => {
                return Err(Error::RawAccess {
                    value_type: ValueType::F32,
                })
            }
        }
        Ok(())
    }

    /// Reorder values so that position `i` receives the value at `order[i]`.
    pub fn permute(&mut self, order: &[u32]) {
        fn apply<T: Copy>(values: &mut Vec<T>, order: &[u32]) {
            let permuted: Vec<T> = order.iter().map(|&i| values[i as usize]).collect();
            *values = permuted;
        }
        match self {
            ValueBuffer::U8(v) => apply(v, order),
            ValueBuffer::U16(v) | ValueBuffer::Percent16(v) => apply(v, order),
            ValueBuffer::U32(v) => apply(v, order),
            ValueBuffer::U64(v) => apply(v, order),
            ValueBuffer::F32(v) => apply(v, order),
        }
    }

    /// Copy every value into a buffer of another encoding.
    pub fn convert(&self, value_type: ValueType) -> ValueBuffer {
        let mut out = ValueBuffer::with_capacity(value_type, self.len());
        for i in 0..self.len() {
            out.push(self.get(i));
        }
        out
    }
}
