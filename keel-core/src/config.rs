// Application configuration for ambient behaviour (logging, dispatch defaults)

use crate::logging::{LogConfig, LogFormat, LogLevel, debug};
use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;

/// Environment variable overriding `logging.level`
pub const ENV_LOG_LEVEL: &str = "KEEL_LOG_LEVEL";
/// Environment variable overriding `logging.format`
pub const ENV_LOG_FORMAT: &str = "KEEL_LOG_FORMAT";
/// Environment variable overriding `http.controller_namespace`
pub const ENV_CONTROLLER_NAMESPACE: &str = "KEEL_CONTROLLER_NAMESPACE";

/// Top-level configuration.
///
/// Every field has a default, so an empty document is valid:
///
/// ```
/// use keel_core::config::KeelConfig;
///
/// let config = KeelConfig::from_toml_str(r#"
///     [logging]
///     level = "debug"
///
///     [http]
///     controller_namespace = "App/Controllers/Http"
///     global_middleware = ["cors"]
/// "#).unwrap();
///
/// assert_eq!(config.http.global_middleware, ["cors"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KeelConfig {
    pub logging: LoggingConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Prefix for `Controller.action` handlers outside a namespaced group
    pub controller_namespace: Option<String>,
    /// Middleware identifiers run before every route's middleware
    pub global_middleware: Vec<String>,
}

impl KeelConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loading configuration file");
        Self::from_toml_str(&source)
    }

    /// Defaults plus overrides from the process environment and `.env`.
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `KEEL_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = LogLevel::parse(&level)
                .ok_or_else(|| Error::Config(format!("{}: unknown log level '{}'", ENV_LOG_LEVEL, level)))?;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = LogFormat::parse(&format)
                .ok_or_else(|| Error::Config(format!("{}: unknown log format '{}'", ENV_LOG_FORMAT, format)))?;
        }
        if let Some(namespace) = lookup(ENV_CONTROLLER_NAMESPACE).filter(|ns| !ns.is_empty()) {
            self.http.controller_namespace = Some(namespace);
        }
        Ok(())
    }

    /// Logging builder preset from the `[logging]` section.
    pub fn log_config(&self) -> LogConfig {
        LogConfig::new()
            .level(self.logging.level)
            .format(self.logging.format)
    }
}
