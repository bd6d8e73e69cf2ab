use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Short code naming a regional distribution, such as `us`, `de` or `cn`.
///
/// Codes are stored lower-cased and restricted to ASCII alphanumerics so they
/// can be used verbatim as index keys.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistributionCode(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid distribution code '{0}' (expected ASCII letters or digits)")]
pub struct InvalidDistributionCode(pub String);

impl DistributionCode {
    pub fn new(code: impl AsRef<str>) -> Result<Self, InvalidDistributionCode> {
        let raw = code.as_ref().trim();
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(InvalidDistributionCode(code.as_ref().to_string()));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DistributionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DistributionCode {
    type Err = InvalidDistributionCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DistributionCode {
    type Error = InvalidDistributionCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DistributionCode> for String {
    fn from(value: DistributionCode) -> Self {
        value.0
    }
}

impl AsRef<str> for DistributionCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How a distribution's directory tree is organised on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientLayout {
    /// Inflated incremental patches, one `ps####-d-m-yyyy` directory each.
    #[default]
    Patches,
    /// One or more complete client snapshots under `ep<episode>` directories.
    FullClient,
}

impl ClientLayout {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Patches => "patches",
            Self::FullClient => "full-client",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_normalized_to_lowercase() {
        let code = DistributionCode::new(" US ").expect("valid code");
        assert_eq!(code.as_str(), "us");
        assert_eq!(code.to_string(), "us");
    }

    #[test]
    fn rejects_codes_with_separators() {
        assert!(DistributionCode::new("shaiya-us").is_err());
        assert!(DistributionCode::new("").is_err());
    }
}
