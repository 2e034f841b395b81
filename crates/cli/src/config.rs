//! `coldchain.toml` configuration.
//!
//! Every section is optional. Environment variables override the file:
//! `COLDCHAIN_OWNER`, `COLDCHAIN_PORT`, `COLDCHAIN_LOG`, `COLDCHAIN_API_KEY`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use coldchain_core::{ChainPolicy, Identity};
use coldchain_ledger::{IngredientClassifier, LabelRules};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Config file read when `--config` is not given. Absence is not an error.
pub(crate) const DEFAULT_CONFIG_PATH: &str = "coldchain.toml";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("cannot read config '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid owner identity '{value}': must not be blank")]
    InvalidOwner { value: String },

    #[error("invalid value for {name}: '{value}'")]
    InvalidEnv { name: &'static str, value: String },
}

fn default_owner() -> String {
    "0xowner".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Identity allowed to register participants and add cold drinks.
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub policy: ChainPolicy,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            owner: default_owner(),
            server: ServerConfig::default(),
            policy: ChainPolicy::default(),
            classifier: ClassifierConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret for `serve`; no authentication when unset.
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_port(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct ClassifierConfig {
    #[serde(default = "default_banned")]
    pub banned: Vec<String>,
    #[serde(default = "default_thresholds")]
    pub thresholds: BTreeMap<String, Decimal>,
    /// `process-ingredients` endpoint; local rules are used when unset.
    #[serde(default)]
    pub remote_url: Option<String>,
}

fn default_banned() -> Vec<String> {
    LabelRules::default().banned
}

fn default_thresholds() -> BTreeMap<String, Decimal> {
    LabelRules::default().thresholds
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            banned: default_banned(),
            thresholds: default_thresholds(),
            remote_url: None,
        }
    }
}

impl ClassifierConfig {
    pub fn label_rules(&self) -> LabelRules {
        LabelRules::new(self.banned.clone(), self.thresholds.clone())
    }

    /// The classifier consulted when admitting a cold drink.
    pub fn build(&self) -> Box<dyn IngredientClassifier> {
        #[cfg(feature = "remote")]
        if let Some(url) = &self.remote_url {
            return Box::new(coldchain_ledger::HttpClassifier::new(url.clone()));
        }
        #[cfg(not(feature = "remote"))]
        if self.remote_url.is_some() {
            tracing::warn!("remote_url ignored: built without the `remote` feature");
        }
        Box::new(self.label_rules())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info,coldchain_ledger=debug`.
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: default_filter(),
            json: false,
        }
    }
}

impl Config {
    /// Load from `path`, or from [`DEFAULT_CONFIG_PATH`] if present, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Config::from_file(default)?
                } else {
                    Config::default()
                }
            }
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.owner_identity()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Config::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `COLDCHAIN_*` overrides; `lookup` reads one variable.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(owner) = lookup("COLDCHAIN_OWNER") {
            self.owner = owner;
        }
        if let Some(port) = lookup("COLDCHAIN_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "COLDCHAIN_PORT",
                value: port,
            })?;
        }
        if let Some(filter) = lookup("COLDCHAIN_LOG") {
            self.log.filter = filter;
        }
        if let Some(key) = lookup("COLDCHAIN_API_KEY") {
            self.server.api_key = Some(key);
        }
        self.server.api_key = self.server.api_key.take().filter(|k| !k.is_empty());
        Ok(())
    }

    pub fn owner_identity(&self) -> Result<Identity, ConfigError> {
        Identity::new(self.owner.clone()).map_err(|_| ConfigError::InvalidOwner {
            value: self.owner.clone(),
        })
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
