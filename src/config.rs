// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of gitplane's configuration file to simplify the
//! process of serialization and deserialization. Apart from
//! [`Settings::load`], file I/O is left to the caller to figure out.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Namespace that repository credentials and root descriptors live in.
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "argocd";

/// Namespace that profiles, bundles, and cluster specifications live in.
pub const DEFAULT_RECORDS_NAMESPACE: &str = "arlon";

/// Branch published to when none is configured.
pub const DEFAULT_BRANCH: &str = "main";

/// Gitplane settings layout.
///
/// # General Layout
///
/// ```toml
/// store = "$XDG_DATA_HOME/gitplane-store"
/// artifacts = "/path/to/chart"
///
/// [namespaces]
/// controller = "argocd"
/// records = "arlon"
///
/// [repository]
/// url = "https://git.example.com/fleet.git"
/// branch = "main"
/// base_path = "clusters"
/// ```
///
/// Every field is optional. Paths are shell expanded when parsed.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Root directory of the record store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<PathBuf>,

    /// Directory that replaces the embedded base artifact set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<PathBuf>,

    /// Namespaces to look up records in.
    #[serde(default)]
    pub namespaces: Namespaces,

    /// Default repository coordinates for publishing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositorySettings>,
}

impl Settings {
    /// Load settings from file at `path`.
    ///
    /// A missing file is not an error, default settings are used instead.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if the file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if the file is not valid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("no settings at {:?}, using defaults", path.display());
            return Ok(Self::default());
        }

        read_to_string(path)
            .map_err(|err| ConfigError::Read {
                source: err,
                path: path.to_path_buf(),
            })?
            .parse()
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        settings.store = settings.store.map(expand_path).transpose()?;
        settings.artifacts = settings.artifacts.map(expand_path).transpose()?;

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Namespaces holding the records gitplane reads.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Namespaces {
    /// Namespace of the reconciliation controller.
    ///
    /// Repository credentials are listed here, and root descriptors are
    /// placed here.
    #[serde(default = "default_controller_namespace")]
    pub controller: String,

    /// Namespace of profiles, bundles, and cluster specifications.
    #[serde(default = "default_records_namespace")]
    pub records: String,
}

impl Default for Namespaces {
    fn default() -> Self {
        Self {
            controller: default_controller_namespace(),
            records: default_records_namespace(),
        }
    }
}

fn default_controller_namespace() -> String {
    DEFAULT_CONTROLLER_NAMESPACE.into()
}

fn default_records_namespace() -> String {
    DEFAULT_RECORDS_NAMESPACE.into()
}

/// Default coordinates of the repository to publish into.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct RepositorySettings {
    /// Remote URL, matched exactly against registered credentials.
    pub url: Option<String>,

    /// Branch to clone and push.
    pub branch: Option<String>,

    /// Directory inside the repository that holds per-cluster trees.
    pub base_path: Option<String>,
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read settings at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("BLAH", "/home/blah")])]
    fn deserialize_settings() -> anyhow::Result<()> {
        let result: Settings = r#"
            store = "$BLAH/store"
            artifacts = "$BLAH/chart"

            [namespaces]
            controller = "gitops"

            [repository]
            url = "https://blah.org/fleet.git"
            branch = "trunk"
            base_path = "clusters"
        "#
        .parse()?;

        let expect = Settings {
            store: Some("/home/blah/store".into()),
            artifacts: Some("/home/blah/chart".into()),
            namespaces: Namespaces {
                controller: "gitops".into(),
                records: "arlon".into(),
            },
            repository: Some(RepositorySettings {
                url: Some("https://blah.org/fleet.git".into()),
                branch: Some("trunk".into()),
                base_path: Some("clusters".into()),
            }),
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn empty_settings_use_defaults() -> anyhow::Result<()> {
        let result: Settings = "".parse()?;
        assert_eq!(result, Settings::default());
        assert_eq!(result.namespaces.controller, "argocd");
        assert_eq!(result.namespaces.records, "arlon");

        Ok(())
    }

    #[test]
    fn serialize_settings() -> anyhow::Result<()> {
        let settings = Settings {
            store: Some("/srv/store".into()),
            artifacts: None,
            namespaces: Namespaces::default(),
            repository: Some(RepositorySettings {
                url: Some("https://blah.org/fleet.git".into()),
                branch: None,
                base_path: Some("clusters".into()),
            }),
        };

        let result = settings.to_string();
        assert!(result.contains("store = \"/srv/store\""));
        assert!(result.contains("[namespaces]"));
        assert!(!result.contains("artifacts"));
        assert_eq!(result.parse::<Settings>()?, settings);

        Ok(())
    }

    #[sealed_test]
    fn missing_settings_file_is_default() -> anyhow::Result<()> {
        let result = Settings::load("does/not/exist.toml")?;
        assert_eq!(result, Settings::default());

        Ok(())
    }
}
