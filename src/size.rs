//! Capacity Size Parser
//!
//! Converts human-readable capacity strings such as `10Gi` or `2Ti` into the
//! MiB count expected by `bdev_lvol_create`.
//!
//! The accepted grammar is a leading run of ASCII digits followed by a unit
//! from a fixed table:
//!
//! | Unit | Exponent | `1<unit>` in MiB |
//! |------|----------|------------------|
//! | `Gi` | 1        | 1024             |
//! | `Ti` | 2        | 1048576          |
//!
//! Fractions, signs, whitespace and SI units are rejected.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};

/// Supported binary size units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SizeUnit {
    Gi,
    Ti,
}

impl SizeUnit {
    /// Power of 1024 applied to the magnitude.
    pub fn exponent(&self) -> u32 {
        match self {
            SizeUnit::Gi => 1,
            SizeUnit::Ti => 2,
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "Gi" => Some(SizeUnit::Gi),
            "Ti" => Some(SizeUnit::Ti),
            _ => None,
        }
    }
}

impl fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeUnit::Gi => write!(f, "Gi"),
            SizeUnit::Ti => write!(f, "Ti"),
        }
    }
}

/// A parsed capacity.
///
/// `mebibytes == magnitude * 1024^unit.exponent()` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapacitySize {
    pub magnitude: u64,
    pub unit: SizeUnit,
    pub mebibytes: u64,
}

impl CapacitySize {
    /// Parse a size string.
    pub fn parse(input: &str) -> Result<Self> {
        let digits_end = input
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(input.len());
        let (digits, suffix) = input.split_at(digits_end);

        if digits.is_empty() {
            return Err(malformed(input, "missing numeric magnitude"));
        }
        if suffix.is_empty() {
            return Err(malformed(input, "missing unit suffix"));
        }
        if !suffix.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(malformed(input, "unit must be alphabetic and trail the magnitude"));
        }

        let unit = SizeUnit::from_suffix(suffix).ok_or_else(|| Error::UnsupportedUnit {
            input: input.to_string(),
            unit: suffix.to_string(),
        })?;

        let magnitude: u64 = digits
            .parse()
            .map_err(|_| malformed(input, "magnitude does not fit in 64 bits"))?;

        let mebibytes = 1024u64
            .checked_pow(unit.exponent())
            .and_then(|scale| magnitude.checked_mul(scale))
            .ok_or_else(|| malformed(input, "size overflows 64 bits"))?;

        Ok(Self {
            magnitude,
            unit,
            mebibytes,
        })
    }

    /// Size in bytes, or `None` when it does not fit in 64 bits.
    pub fn bytes(&self) -> Option<u64> {
        self.mebibytes.checked_mul(1024 * 1024)
    }
}

impl FromStr for CapacitySize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CapacitySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.unit)
    }
}

/// Parse a size string into its MiB count.
pub fn parse(input: &str) -> Result<u64> {
    CapacitySize::parse(input).map(|size| size.mebibytes)
}

fn malformed(input: &str, reason: &str) -> Error {
    Error::MalformedSize {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}
