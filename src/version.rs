// Firmware version parsing and comparison

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("invalid version format: {0:?} (expected MAJOR.MINOR.PATCH)")]
pub struct InvalidVersionFormat(pub String);

/// A firmware release number. Ordering is numeric per field, so
/// 1.1.10 sorts after 1.1.9 even though it sorts before as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FirmwareVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Parse a MAJOR.MINOR.PATCH string. A single leading `v` or `V` is
    /// tolerated, as is surrounding whitespace; anything else is rejected.
    pub fn parse(raw: &str) -> Result<Self, InvalidVersionFormat> {
        let s = raw.trim();
        let s = s
            .strip_prefix('v')
            .or_else(|| s.strip_prefix('V'))
            .unwrap_or(s);

        let fields: Vec<&str> = s.split('.').collect();
        if fields.len() != 3 {
            return Err(InvalidVersionFormat(raw.to_string()));
        }

        let mut parts = [0u32; 3];
        for (slot, field) in parts.iter_mut().zip(&fields) {
            *slot = field
                .parse::<u32>()
                .map_err(|_| InvalidVersionFormat(raw.to_string()))?;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }

    /// True when `self` is strictly newer than `other`.
    /// Equal versions are not newer; downgrades are never newer.
    pub fn is_newer_than(&self, other: &FirmwareVersion) -> bool {
        self > other
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for FirmwareVersion {
    type Err = InvalidVersionFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
