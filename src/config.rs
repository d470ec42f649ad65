// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the two JSON documents exb-dev consumes: the
//! __applications config__ that maps application names to repository URLs,
//! and the __version catalog__ that maps Experience Builder versions to
//! download URLs.
//!
//! # Applications Config
//!
//! ```json
//! {
//!     "Applications": { "app1": "https://host/app1.git" },
//!     "Core_Widgets": "https://host/widgets.git"
//! }
//! ```
//!
//! Both keys are optional. Looking up an identifier against an absent key is
//! reported exactly like looking up an unknown identifier.

use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// Reserved identifier that selects the shared widgets repository.
pub const CORE_WIDGETS: &str = "core-widgets";

/// Applications config layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize)]
pub struct ApplicationsConfig {
    /// Application name to repository URL.
    #[serde(rename = "Applications", default)]
    pub applications: BTreeMap<String, String>,

    /// Repository URL of the shared widgets.
    #[serde(rename = "Core_Widgets", default)]
    pub core_widgets: Option<String>,
}

impl ApplicationsConfig {
    /// Load applications config from file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Missing`] if no file exists at `path`.
    /// - Return [`ConfigError::Read`] if the file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if the file is not valid JSON.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = read_document(path.as_ref())?;
        debug!("loaded applications config {:?}", path.as_ref().display());
        data.parse()
    }

    /// Resolve application identifier to its repository source.
    ///
    /// The reserved [`CORE_WIDGETS`] identifier always selects the shared
    /// widgets entry, even if an application happens to share that name.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::IdentifierNotFound`] if no entry matches.
    pub fn resolve(&self, identifier: impl AsRef<str>) -> Result<RepoSource> {
        let identifier = identifier.as_ref();
        let found = if identifier == CORE_WIDGETS {
            self.core_widgets
                .as_ref()
                .map(|url| RepoSource::new(url, RepoKind::CoreWidgets))
        } else {
            self.applications
                .get(identifier)
                .map(|url| RepoSource::new(url, RepoKind::Application))
        };

        found.ok_or_else(|| ConfigError::IdentifierNotFound {
            identifier: identifier.into(),
        })
    }
}

impl FromStr for ApplicationsConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(data).map_err(ConfigError::Deserialize)
    }
}

/// Kind of repository an identifier resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoKind {
    /// Shared widget collection.
    CoreWidgets,

    /// Regular application.
    Application,
}

impl RepoKind {
    /// Type tag of repository kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoreWidgets => CORE_WIDGETS,
            Self::Application => "application",
        }
    }
}

impl Display for RepoKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Resolved repository URL with its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSource {
    pub url: String,
    pub kind: RepoKind,
}

impl RepoSource {
    pub fn new(url: impl Into<String>, kind: RepoKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }
}

/// Version catalog layout.
///
/// Maps each downloadable Experience Builder version to its archive URL.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize)]
pub struct VersionCatalog {
    #[serde(rename = "Experience_Builder", default)]
    pub experience_builder: BTreeMap<String, String>,
}

impl VersionCatalog {
    /// Load version catalog from file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Missing`] if no file exists at `path`.
    /// - Return [`ConfigError::Read`] if the file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if the file is not valid JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_document(path.as_ref())?.parse()
    }

    /// Download URL of target version.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::IdentifierNotFound`] for unknown versions.
    pub fn download_url(&self, version: impl AsRef<str>) -> Result<&str> {
        self.experience_builder
            .get(version.as_ref())
            .map(String::as_str)
            .ok_or_else(|| ConfigError::IdentifierNotFound {
                identifier: version.as_ref().into(),
            })
    }
}

impl FromStr for VersionCatalog {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(data).map_err(ConfigError::Deserialize)
    }
}

fn read_document(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(ConfigError::Missing { path: path.into() });
    }

    read_to_string(path).map_err(|source| ConfigError::Read {
        source,
        path: path.into(),
    })
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file does not exist.
    #[error("config file not found: {:?}", path.display())]
    Missing { path: PathBuf },

    /// Configuration file cannot be read.
    #[error("failed to read config file {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] serde_json::Error),

    /// Identifier has no entry in configuration.
    #[error("'{identifier}' not found in the configuration file")]
    IdentifierNotFound { identifier: String },
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    const CONFIG: &str = indoc! {r#"
        {
            "Applications": { "app1": "https://x/app1.git" },
            "Core_Widgets": "https://x/widgets.git"
        }
    "#};

    #[test_case("app1", "https://x/app1.git", RepoKind::Application; "application")]
    #[test_case("core-widgets", "https://x/widgets.git", RepoKind::CoreWidgets; "core widgets")]
    #[test]
    fn resolve_known_identifier(identifier: &str, url: &str, kind: RepoKind) {
        let config: ApplicationsConfig = CONFIG.parse().unwrap();
        assert_eq!(config.resolve(identifier).unwrap(), RepoSource::new(url, kind));
    }

    #[test_case("nope"; "unknown name")]
    #[test_case("Core_Widgets"; "config key is not the reserved identifier")]
    #[test_case(""; "empty")]
    #[test]
    fn resolve_unknown_identifier(identifier: &str) {
        let config: ApplicationsConfig = CONFIG.parse().unwrap();
        let result = config.resolve(identifier);
        assert!(matches!(
            result,
            Err(ConfigError::IdentifierNotFound { identifier: ref id }) if id == identifier
        ));
    }

    #[test]
    fn resolve_against_absent_keys() -> anyhow::Result<()> {
        let config: ApplicationsConfig = "{}".parse()?;
        assert!(matches!(
            config.resolve(CORE_WIDGETS),
            Err(ConfigError::IdentifierNotFound { .. })
        ));
        assert!(matches!(
            config.resolve("app1"),
            Err(ConfigError::IdentifierNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn identifier_not_found_names_identifier() -> anyhow::Result<()> {
        let config: ApplicationsConfig = CONFIG.parse()?;
        let message = config.resolve("nope").unwrap_err().to_string();
        assert!(message.contains("nope"), "unexpected message: {message}");
        Ok(())
    }

    #[sealed_test]
    fn load_missing_config() {
        let result = ApplicationsConfig::load("applications.json");
        assert!(matches!(
            result,
            Err(ConfigError::Missing { ref path }) if path == Path::new("applications.json")
        ));
    }

    #[sealed_test]
    fn load_config_from_file() -> anyhow::Result<()> {
        std::fs::write("applications.json", CONFIG)?;
        let config = ApplicationsConfig::load("applications.json")?;
        let expect = ApplicationsConfig {
            applications: BTreeMap::from([("app1".into(), "https://x/app1.git".into())]),
            core_widgets: Some("https://x/widgets.git".into()),
        };
        assert_eq!(config, expect);
        Ok(())
    }

    #[test]
    fn malformed_config() {
        let result: Result<ApplicationsConfig> = r#"{ "Applications": [ }"#.parse();
        assert!(matches!(result, Err(ConfigError::Deserialize(_))));
    }

    #[test]
    fn version_catalog_lookup() -> anyhow::Result<()> {
        let catalog: VersionCatalog = indoc! {r#"
            {
                "Experience_Builder": {
                    "1.16": "https://downloads.example.com/exb-1.16.zip"
                }
            }
        "#}
        .parse()?;

        assert_eq!(
            catalog.download_url("1.16")?,
            "https://downloads.example.com/exb-1.16.zip"
        );
        assert!(matches!(
            catalog.download_url("9.9"),
            Err(ConfigError::IdentifierNotFound { ref identifier }) if identifier == "9.9"
        ));
        Ok(())
    }
}
