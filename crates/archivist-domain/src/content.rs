use std::fmt;

use flate2::Crc;
use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use crate::distribution::DistributionCode;

/// CRC-32 (IEEE) of a file's raw bytes.
///
/// This is the deduplication key of the content store. It is not
/// collision-resistant; two files with equal checksums are treated as the same
/// content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(u32);

impl Checksum {
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let mut crc = Crc::new();
        crc.update(bytes);
        Self(crc.sum())
    }

    #[must_use]
    pub const fn from_value(value: u32) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row identifier of a stored content blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(pub i64);

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Binds one logical path of one distribution at one patch to a blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Membership {
    pub distribution: DistributionCode,
    pub patch: u16,
    pub path: String,
    pub date: Option<PrimitiveDateTime>,
    pub fileid: BlobId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_the_standard_crc32_check_value() {
        assert_eq!(Checksum::of(b"123456789").value(), 0xCBF4_3926);
        assert_eq!(Checksum::of(b"").value(), 0);
    }

    #[test]
    fn displays_as_decimal() {
        assert_eq!(Checksum::from_value(0xCBF4_3926).to_string(), "3421780262");
    }
}
