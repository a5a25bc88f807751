//! Layered configuration.
//!
//! Settings come from an optional configuration file (TOML, YAML or JSON,
//! picked by extension) overlaid by `ABS_*` environment variables; the
//! binary applies its command line flags on top before resolving.
//!
//! | Key            | Environment        | Required |
//! |----------------|--------------------|----------|
//! | `account_name` | `ABS_ACCOUNT_NAME` | yes      |
//! | `account_key`  | `ABS_ACCOUNT_KEY`  | yes      |
//! | `endpoint`     | `ABS_ENDPOINT`     | no       |
//! | `container`    | `ABS_CONTAINER`    | no       |
//! | `commit`       | `ABS_COMMIT`       | no       |

pub mod error;

use crate::error::{ErrorKind, Result};
use absync_sync::CommitPolicy;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "ABS_";
pub const ACCOUNT_NAME_VAR: &str = "ABS_ACCOUNT_NAME";
pub const ACCOUNT_KEY_VAR: &str = "ABS_ACCOUNT_KEY";
/// Container used when none is configured.
pub const DEFAULT_CONTAINER: &str = "default";

/// Raw configuration, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub endpoint: Option<String>,
    pub container: Option<String>,
    pub commit: Option<CommitPolicy>,
}

impl Config {
    /// Load the configuration file (if any) and the environment.
    ///
    /// An explicitly given file must exist.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::figment(file)?.extract().or_raise(|| ErrorKind::Load)
    }

    fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::new();
        if let Some(path) = file {
            if !path.is_file() {
                exn::bail!(ErrorKind::MissingFile(path.to_path_buf()));
            }
            tracing::debug!(path = %path.display(), "Loading configuration file");
            let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_lowercase);
            figment = match extension.as_deref() {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Replace configured values with the ones given on the command line.
    pub fn with_overrides(mut self, container: Option<String>, commit: Option<CommitPolicy>) -> Self {
        if container.is_some() {
            self.container = container;
        }
        if commit.is_some() {
            self.commit = commit;
        }
        self
    }

    /// Validate credentials and fill in defaults.
    pub fn resolve(self) -> Result<Settings> {
        let account_name = required(self.account_name, ACCOUNT_NAME_VAR)?;
        let account_key = required(self.account_key, ACCOUNT_KEY_VAR)?;
        STANDARD.decode(account_key.trim()).or_raise(|| ErrorKind::InvalidCredential(ACCOUNT_KEY_VAR))?;
        Ok(Settings {
            credentials: Credentials { account_name, account_key },
            endpoint: self.endpoint.filter(|endpoint| !endpoint.trim().is_empty()),
            container: self.container.filter(|c| !c.is_empty()).unwrap_or_else(|| DEFAULT_CONTAINER.to_string()),
            commit: self.commit.unwrap_or_default(),
        })
    }
}

fn required(value: Option<String>, var: &'static str) -> Result<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => exn::bail!(ErrorKind::MissingCredential(var)),
    }
}

/// Configuration file to load: the explicit one, else `config.toml` in the
/// platform configuration directory if it exists.
pub fn locate(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        directories::ProjectDirs::from("", "", "absync")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .filter(|path| path.is_file())
    })
}

/// Storage account credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account_name: String,
    pub account_key: String,
}
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .finish()
    }
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub credentials: Credentials,
    pub endpoint: Option<String>,
    pub container: String,
    pub commit: CommitPolicy,
}
