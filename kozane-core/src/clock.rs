//! # Vector Clocks
//!
//! The versioning primitive surfaced by stores built on top of the array
//! engine. A [`Clock`] is either the distinguished smallest clock
//! [`Clock::Zero`] or a vector of per-source `u64` sequence values.
//! Comparison is structural; there is no identity-based fast path.

use std::fmt;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Outcome of comparing two clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurred {
    /// Every component equal
    Equal,
    /// Strictly or weakly dominated by the other clock
    Before,
    /// Strictly or weakly dominates the other clock
    After,
    /// Components ordered in both directions
    Concurrent,
}

/// A vector clock of `u64` values
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Clock {
    /// The smallest clock, ordered before every non-zero clock
    Zero,
    /// Per-source sequence values
    Vector(Vec<u64>),
}

impl Clock {
    /// Build a clock from sequence values. An empty slice yields `Zero`.
    pub fn from_values(values: &[u64]) -> Self {
        if values.is_empty() {
            Clock::Zero
        } else {
            Clock::Vector(values.to_vec())
        }
    }

    /// The sequence values of this clock; empty for `Zero`
    pub fn values(&self) -> &[u64] {
        match self {
            Clock::Zero => &[],
            Clock::Vector(values) => values,
        }
    }

    /// Parse a clock from its colon-separated string form, e.g.
    /// `16335:16912:15999`
    pub fn parse_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Clock::Zero);
        }
        let mut values = Vec::new();
        for part in s.split(':') {
            let v = part.parse::<u64>().map_err(|e| Error::Configuration {
                message: format!("invalid clock component {:?}: {}", part, e),
            })?;
            values.push(v);
        }
        Ok(Clock::Vector(values))
    }

    /// Parse a clock from packed big-endian u64s. Fewer than 8 bytes
    /// parses as `Zero`; trailing bytes short of a full component are
    /// ignored.
    pub fn from_bytes(mut raw: &[u8]) -> Self {
        if raw.len() < 8 {
            return Clock::Zero;
        }
        let count = raw.len() / 8;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(raw.get_u64());
        }
        Clock::Vector(values)
    }

    /// Packed big-endian byte form; empty for `Zero`
    pub fn to_bytes(&self) -> Vec<u8> {
        let values = self.values();
        let mut buf = Vec::with_capacity(values.len() * 8);
        for &v in values {
            buf.put_u64(v);
        }
        buf
    }

    /// Compare this clock with `other` for ordering.
    ///
    /// Component counts decide the outcome: all components equal is
    /// `Equal`; all less-or-equal is `Before`; all greater-or-equal is
    /// `After`; a mix in both directions is `Concurrent`. Vectors of
    /// unequal length are incomparable.
    pub fn compare(&self, other: &Clock) -> Result<Occurred> {
        match (self, other) {
            (Clock::Zero, Clock::Zero) => Ok(Occurred::Equal),
            (Clock::Zero, Clock::Vector(_)) => Ok(Occurred::Before),
            (Clock::Vector(_), Clock::Zero) => Ok(Occurred::After),
            (Clock::Vector(lhs), Clock::Vector(rhs)) => {
                if lhs.len() != rhs.len() {
                    return Err(Error::IncomparableClocks {
                        left: self.to_string(),
                        right: other.to_string(),
                    });
                }

                let len = lhs.len();
                let mut neg = 0;
                let mut pos = 0;
                let mut eq = 0;
                for i in 0..len {
                    if lhs[i] < rhs[i] {
                        neg += 1;
                    } else if lhs[i] > rhs[i] {
                        pos += 1;
                    } else {
                        eq += 1;
                    }
                }

                if eq == len {
                    Ok(Occurred::Equal)
                } else if neg == len || neg + eq == len {
                    Ok(Occurred::Before)
                } else if pos == len || pos + eq == len {
                    Ok(Occurred::After)
                } else {
                    Ok(Occurred::Concurrent)
                }
            }
        }
    }

    /// `true` if this clock occurred strictly before `other`
    pub fn before(&self, other: &Clock) -> Result<bool> {
        Ok(self.compare(other)? == Occurred::Before)
    }

    /// `true` if this clock occurred strictly after `other`
    pub fn after(&self, other: &Clock) -> Result<bool> {
        Ok(self.compare(other)? == Occurred::After)
    }

    /// `true` if this clock is equal to or occurred before `other`
    pub fn before_eq(&self, other: &Clock) -> Result<bool> {
        let o = self.compare(other)?;
        Ok(o == Occurred::Before || o == Occurred::Equal)
    }

    /// `true` if this clock is equal to or occurred after `other`
    pub fn after_eq(&self, other: &Clock) -> Result<bool> {
        let o = self.compare(other)?;
        Ok(o == Occurred::After || o == Occurred::Equal)
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values();
        if let Some((first, rest)) = values.split_first() {
            write!(f, "{}", first)?;
            for v in rest {
                write!(f, ":{}", v)?;
            }
        }
        Ok(())
    }
}
