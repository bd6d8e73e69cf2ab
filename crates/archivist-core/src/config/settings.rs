use std::collections::{BTreeSet, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use archivist_domain::{ClientLayout, DistributionCode, EntryFilter, DEFAULT_RETAINED_EXTENSIONS};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::store::BackendKind;

const BUILTIN_CONFIG: &str = include_str!("default_config.toml");

pub const ENV_ROOT: &str = "ARCHIVIST_ROOT";
pub const ENV_DATABASE: &str = "ARCHIVIST_DATABASE";
pub const ENV_BACKEND: &str = "ARCHIVIST_BACKEND";

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration {origin}: {message}")]
    Parse { origin: String, message: String },
    #[error("unknown storage backend '{0}' (expected 'embedded' or 'external')")]
    UnknownBackend(String),
    #[error("distribution '{0}' is configured more than once")]
    DuplicateDistribution(DistributionCode),
    #[error("{context} names distribution '{code}', which is not configured")]
    UnknownDistribution {
        context: &'static str,
        code: DistributionCode,
    },
}

#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    #[must_use]
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    #[must_use]
    pub fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// The shared base client, loaded once as patch 0 and fanned out to every
/// distribution descending from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OriginalConfig {
    pub path: PathBuf,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub distributions: Vec<DistributionCode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistributionConfig {
    pub code: DistributionCode,
    pub path: PathBuf,
    #[serde(default)]
    pub layout: ClientLayout,
}

/// Projects `from`'s state at `through` (or its latest patch) as `to`'s
/// patch 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarryForwardConfig {
    pub from: DistributionCode,
    pub to: DistributionCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub through: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_retained_extensions")]
    pub retained_extensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<OriginalConfig>,
    #[serde(default, rename = "distribution")]
    pub distributions: Vec<DistributionConfig>,
    #[serde(default)]
    pub carry_forward: Vec<CarryForwardConfig>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_database() -> PathBuf {
    PathBuf::from("archive.sqlite")
}

fn default_retained_extensions() -> Vec<String> {
    DEFAULT_RETAINED_EXTENSIONS
        .iter()
        .map(|ext| format!(".{ext}"))
        .collect()
}

impl ArchiveConfig {
    /// The layout of the historical archive, used when no file is given.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_CONFIG, "<builtin>")
    }

    pub fn from_toml(contents: &str, origin: &str) -> Result<Self> {
        let config: Self = toml_edit::de::from_str(contents).map_err(|err| ConfigError::Parse {
            origin: origin.to_string(),
            message: err.to_string(),
        })?;
        Ok(config)
    }

    /// Reads the configuration file (or the built-in layout), applies
    /// environment overrides, and validates the result.
    pub fn load(path: Option<&Path>, snapshot: &EnvSnapshot) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                Self::from_toml(&contents, &path.display().to_string())?
            }
            None => Self::builtin()?,
        };
        config.apply_env(snapshot)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, snapshot: &EnvSnapshot) -> Result<()> {
        if let Some(root) = snapshot.var(ENV_ROOT) {
            self.root = PathBuf::from(root);
        }
        if let Some(database) = snapshot.var(ENV_DATABASE) {
            self.database = PathBuf::from(database);
        }
        if let Some(backend) = snapshot.var(ENV_BACKEND) {
            self.backend = backend
                .parse::<BackendKind>()
                .map_err(|_| ConfigError::UnknownBackend(backend.to_string()))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let mut configured = BTreeSet::new();
        for dist in &self.distributions {
            if !configured.insert(dist.code.clone()) {
                return Err(ConfigError::DuplicateDistribution(dist.code.clone()).into());
            }
        }

        let mut known = configured;
        if let Some(original) = &self.original {
            known.extend(original.distributions.iter().cloned());
        }
        for carry in &self.carry_forward {
            for code in [&carry.from, &carry.to] {
                if !known.contains(code) {
                    return Err(ConfigError::UnknownDistribution {
                        context: "carry_forward",
                        code: code.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Resolves a configured path against the archive root.
    #[must_use]
    pub fn archive_path(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    #[must_use]
    pub fn entry_filter(&self) -> EntryFilter {
        EntryFilter::new(&self.retained_extensions)
    }

    #[must_use]
    pub fn distribution(&self, code: &DistributionCode) -> Option<&DistributionConfig> {
        self.distributions.iter().find(|dist| &dist.code == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn code(value: &str) -> DistributionCode {
        DistributionCode::new(value).expect("valid code")
    }

    #[test]
    fn builtin_layout_matches_the_historical_archive() -> Result<()> {
        let config = ArchiveConfig::builtin()?;
        config.validate()?;

        let original = config.original.as_ref().expect("original baseline");
        assert_eq!(original.date, date!(2007 - 12 - 18));
        assert_eq!(
            original.distributions,
            ["us", "de", "pt", "ga", "es"].map(code).to_vec()
        );
        assert_eq!(config.distributions.len(), 10);
        let cn = config.distribution(&code("cn")).expect("cn configured");
        assert_eq!(cn.layout, ClientLayout::FullClient);
        let us = config.distribution(&code("us")).expect("us configured");
        assert_eq!(us.layout, ClientLayout::Patches);
        assert_eq!(
            config.carry_forward,
            vec![CarryForwardConfig {
                from: code("us"),
                to: code("ga"),
                through: None,
            }]
        );
        assert_eq!(config.backend, BackendKind::Embedded);
        Ok(())
    }

    #[test]
    fn omitted_keys_fall_back_to_defaults() -> Result<()> {
        let config = ArchiveConfig::from_toml("", "<test>")?;
        assert_eq!(config.root, PathBuf::from("."));
        assert_eq!(config.database, PathBuf::from("archive.sqlite"));
        assert_eq!(
            config.retained_extensions,
            vec![".ini", ".cfg", ".dll", ".txt", ".exe"]
        );
        assert!(config.original.is_none());
        assert!(config.distributions.is_empty());
        Ok(())
    }

    #[test]
    fn environment_overrides_file_values() -> Result<()> {
        let mut config = ArchiveConfig::from_toml("root = \"/srv/archive\"", "<test>")?;
        let snapshot = EnvSnapshot::testing(&[
            (ENV_ROOT, "/mnt/mirror"),
            (ENV_DATABASE, "/tmp/index.sqlite"),
            (ENV_BACKEND, "external"),
        ]);
        config.apply_env(&snapshot)?;
        assert_eq!(config.root, PathBuf::from("/mnt/mirror"));
        assert_eq!(config.database, PathBuf::from("/tmp/index.sqlite"));
        assert_eq!(config.backend, BackendKind::External);
        Ok(())
    }

    #[test]
    fn rejects_unknown_backend_in_environment() -> Result<()> {
        let mut config = ArchiveConfig::from_toml("", "<test>")?;
        let snapshot = EnvSnapshot::testing(&[(ENV_BACKEND, "s3")]);
        let err = config.apply_env(&snapshot).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::UnknownBackend("s3".to_string()))
        );
        Ok(())
    }

    #[test]
    fn rejects_duplicate_distributions() -> Result<()> {
        let config = ArchiveConfig::from_toml(
            r#"
            [[distribution]]
            code = "us"
            path = "a"

            [[distribution]]
            code = "US"
            path = "b"
            "#,
            "<test>",
        )?;
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::DuplicateDistribution(code("us")))
        );
        Ok(())
    }

    #[test]
    fn carry_forward_must_name_known_distributions() -> Result<()> {
        let config = ArchiveConfig::from_toml(
            r#"
            [[distribution]]
            code = "us"
            path = "us"

            [[carry_forward]]
            from = "us"
            to = "xx"
            "#,
            "<test>",
        )?;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::UnknownDistribution { code: c, .. }) if c.as_str() == "xx"
        ));
        Ok(())
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let err = ArchiveConfig::from_toml("roots = \"typo\"", "<test>").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Parse { .. })
        ));
    }
}
