//! Configuration types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tessera_middleware::options::CALL_DONE_ON_END;
use tessera_middleware::{ChainConfig, Options};
use tessera_telemetry::{create_env_filter, LogConfig, LogFormat};

use crate::ConfigError;

/// Root configuration.
///
/// Every section has defaults, so an empty file is a valid configuration.
///
/// # Example
///
/// ```
/// use tessera_config::EngineConfig;
///
/// let config: EngineConfig = toml::from_str(r#"
///     [engine]
///     call_done_on_end = false
///
///     [engine.options]
///     tenant = "acme"
/// "#).unwrap();
///
/// let options = config.options();
/// assert!(!options.call_done_on_end());
/// assert_eq!(options.get_as::<String>("tenant").as_deref(), Some("acme"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Engine behaviour and caller-defined options.
    pub engine: EngineSection,
    /// Logging setup.
    pub logging: LoggingSection,
}

/// The `[engine]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    /// Whether finalizing the response aborts the running chain.
    pub call_done_on_end: bool,
    /// Free-form options handed to middleware through the context.
    pub options: Map<String, Value>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            call_done_on_end: true,
            options: Map::new(),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Whether logging is installed at all.
    pub enabled: bool,
    /// `EnvFilter` directives.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Whether to log span open/close events.
    pub span_events: bool,
    /// Whether to include file and line.
    pub file_line_info: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
            span_events: false,
            file_line_info: false,
        }
    }
}

impl EngineConfig {
    /// Preset for local development: debug level, pretty output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            engine: EngineSection::default(),
            logging: LoggingSection {
                level: "debug".to_string(),
                format: LogFormat::Pretty,
                span_events: true,
                file_line_info: true,
                ..LoggingSection::default()
            },
        }
    }

    /// Preset for production: info level, JSON output.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Checks values serde cannot check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.options.contains_key(CALL_DONE_ON_END) {
            return Err(ConfigError::invalid_value(
                "engine.options",
                format!("'{CALL_DONE_ON_END}' belongs in [engine], not in [engine.options]"),
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value("logging.level", "must not be empty"));
        }
        create_env_filter(&self.logging.level)
            .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;

        Ok(())
    }

    /// Returns the engine options.
    #[must_use]
    pub fn options(&self) -> Options {
        Options::from(&self.engine)
    }

    /// Returns a [`ChainConfig`] carrying these options and no middleware.
    #[must_use]
    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig::new().with_options(self.options())
    }

    /// Returns the logging setup for `tessera_telemetry::init_logging`.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            enabled: self.logging.enabled,
            level: self.logging.level.clone(),
            format: self.logging.format,
            span_events: self.logging.span_events,
            file_line_info: self.logging.file_line_info,
            ..LogConfig::production()
        }
    }
}

impl From<&EngineSection> for Options {
    fn from(section: &EngineSection) -> Self {
        let mut options = Options::new().with_call_done_on_end(section.call_done_on_end);
        for (key, value) in &section.options {
            options.insert(key.clone(), value.clone());
        }
        options
    }
}
