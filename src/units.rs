//! Display units for transfer sizes.
//!
//! All multipliers are decimal: `B = 1`, `KB = 1000`, `MB = 1_000_000`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit used when reporting a transfer size.
///
/// # Examples
///
/// ```
/// use simpleperf::SizeUnit;
///
/// assert_eq!(SizeUnit::KB.to_unit(2500), 2.5);
/// assert_eq!("mb".parse::<SizeUnit>().unwrap(), SizeUnit::MB);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeUnit {
    /// Bytes
    B,
    /// Kilobytes (1000 bytes)
    KB,
    /// Megabytes (1_000_000 bytes)
    #[default]
    MB,
}

impl SizeUnit {
    /// Number of bytes in one unit.
    pub fn multiplier(self) -> u64 {
        match self {
            SizeUnit::B => 1,
            SizeUnit::KB => 1_000,
            SizeUnit::MB => 1_000_000,
        }
    }

    /// Converts a byte count into this unit.
    pub fn to_unit(self, bytes: u64) -> f64 {
        bytes as f64 / self.multiplier() as f64
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SizeUnit::B => "B",
            SizeUnit::KB => "KB",
            SizeUnit::MB => "MB",
        }
    }
}

impl fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SizeUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "B" => Ok(SizeUnit::B),
            "KB" => Ok(SizeUnit::KB),
            "MB" => Ok(SizeUnit::MB),
            _ => Err(Error::UnknownUnit(s.to_string())),
        }
    }
}

/// Parses a size token such as `500KB` or `10b` into a byte count.
///
/// The token must be one or more ASCII digits followed by one or two ASCII
/// letters. A malformed token (or a value that overflows `u64`) yields
/// [`Error::InvalidSizeFormat`]; a well-formed token with a suffix other than
/// `B`, `KB` or `MB` yields [`Error::UnknownUnit`].
///
/// # Examples
///
/// ```
/// use simpleperf::units::parse_sized;
///
/// assert_eq!(parse_sized("500KB").unwrap(), 500_000);
/// assert_eq!(parse_sized("10B").unwrap(), 10);
/// assert!(parse_sized("abc").is_err());
/// ```
pub fn parse_sized(token: &str) -> Result<u64> {
    let split = token
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(token.len());
    let (digits, suffix) = token.split_at(split);

    let well_formed = !digits.is_empty()
        && (1..=2).contains(&suffix.len())
        && suffix.chars().all(|c| c.is_ascii_alphabetic());
    if !well_formed {
        return Err(Error::InvalidSizeFormat(token.to_string()));
    }

    let unit: SizeUnit = suffix.parse()?;
    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(unit.multiplier()))
        .ok_or_else(|| Error::InvalidSizeFormat(token.to_string()))
}
