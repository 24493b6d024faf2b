//! Host configuration.
//!
//! Layered with figment, lowest precedence first:
//! 1. built-in defaults;
//! 2. the YAML file given with `--config` (if any);
//! 3. environment variables prefixed with `PLUGIN_HOST__`, nested keys separated by `__`
//!    (`PLUGIN_HOST__LOGGING__LEVEL=debug`);
//! 4. command-line overrides ([`CliOverrides`]).

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "PLUGIN_HOST__";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file does not exist: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("invalid configuration: {0}")]
    Invalid(#[source] Box<figment::Error>),

    #[error("cannot render configuration")]
    Render(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub logging: LoggingConfig,
    pub plugins: PluginsConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `plugkit=debug,warn`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Plain,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directory searched for module paths that are relative and don't exist as given.
    pub search_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Print the plugin's debug fields after `run`.
    pub dump_fields: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self { dump_fields: true }
    }
}

/// Values taken from the command line that override every other layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliOverrides {
    /// `-v` count: 1 = info, 2 = debug, 3+ = trace.
    pub verbose: u8,
    pub no_dump: bool,
}

impl HostConfig {
    /// Load defaults, then `path` (if given), then the environment.
    ///
    /// # Errors
    /// [`ConfigError::FileNotFound`] if `path` is given but is not a file,
    /// [`ConfigError::Invalid`] if a layer does not fit the schema.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment
            .extract()
            .map_err(|e| ConfigError::Invalid(Box::new(e)))
    }

    pub fn apply_cli_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(level) = verbosity_level(overrides.verbose) {
            level.clone_into(&mut self.logging.level);
        }
        if overrides.no_dump {
            self.diagnostics.dump_fields = false;
        }
    }

    /// # Errors
    /// [`ConfigError::Render`] if serialization fails.
    pub fn to_pretty_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Filter directive selected by `-v` flags; `None` when no flag was given.
#[must_use]
pub fn verbosity_level(verbose: u8) -> Option<&'static str> {
    match verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    }
}
