//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, strings, `.env` files and environment
//! variables.

use std::env;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tessera_telemetry::LogFormat;

use crate::{ConfigError, EngineConfig};

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration files and strings (TOML or JSON), in the order added
/// 3. Environment variables (optionally seeded from a `.env` file)
///
/// File layers are merged key by key: a later file only replaces the keys
/// it sets. `[engine.options]` tables merge the same way.
///
/// # Example
///
/// ```no_run
/// use tessera_config::ConfigLoader;
///
/// # fn main() -> Result<(), tessera_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("tessera.toml")?
///     .with_dotenv()?
///     .with_env_prefix("TESSERA")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    base: EngineConfig,
    layers: Vec<Value>,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: EngineConfig::default(),
            layers: Vec::new(),
            env_prefix: None,
        }
    }

    /// Start with default configuration values.
    ///
    /// This is what `new()` does, but can be chained for clarity.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.base = EngineConfig::default();
        self
    }

    /// Start with the development preset.
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.base = EngineConfig::development();
        self
    }

    /// Start with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.base = EngineConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML (.toml) and JSON (.json) formats, picked by extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file does not exist, cannot be read, or
    /// is not valid TOML/JSON.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        let layer = match extension.as_deref() {
            Some(format @ ("toml" | "json")) => parse_layer(&content, format)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };

        self.layers.push(layer);
        Ok(self)
    }

    /// Load configuration from an optional file.
    ///
    /// If the file exists, loads it. If not, silently continues.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string.
    ///
    /// `format` is `"toml"` or `"json"`.
    ///
    /// # Example
    ///
    /// ```
    /// use tessera_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[engine]\ncall_done_on_end = false", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert!(!config.engine.call_done_on_end);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer = parse_layer(content, &format.to_lowercase())?;
        self.layers.push(layer);
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`.
    /// For example, with prefix "TESSERA":
    /// - `TESSERA__ENGINE__CALL_DONE_ON_END=false`
    /// - `TESSERA__ENGINE__OPTIONS__TENANT=acme`
    /// - `TESSERA__LOGGING__LEVEL=debug`
    /// - `TESSERA__LOGGING__FORMAT=pretty`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file from the current directory or its parents.
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Dotenv` if the file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::Dotenv(e.to_string())),
        }
    }

    /// Load a specific `.env` file.
    ///
    /// Variables already set in the process environment are kept.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Dotenv` if the file is missing or malformed.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref()).map_err(|e| ConfigError::Dotenv(e.to_string()))?;
        Ok(self)
    }

    /// Finalize and return the loaded configuration.
    ///
    /// Merges file layers, applies environment variable overrides (if a
    /// prefix was set) and validates the result.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the merged layers do not fit the schema, an
    /// environment variable cannot be parsed, or validation fails.
    pub fn load(self) -> Result<EngineConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Finalize without validation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the merged layers do not fit the schema or an
    /// environment variable cannot be parsed.
    pub fn load_unvalidated(self) -> Result<EngineConfig, ConfigError> {
        let mut merged = serde_json::to_value(&self.base)?;
        for layer in self.layers {
            merge_value(&mut merged, layer);
        }
        let mut config: EngineConfig = serde_json::from_value(merged)?;

        if let Some(prefix) = &self.env_prefix {
            apply_env_overrides(&mut config, prefix)?;
        }

        Ok(config)
    }
}

fn parse_layer(content: &str, format: &str) -> Result<Value, ConfigError> {
    let layer: Value = match format {
        "toml" => toml::from_str(content)?,
        "json" => serde_json::from_str(content)?,
        other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
    };

    if layer.is_object() {
        Ok(layer)
    } else {
        Err(ConfigError::invalid_value(
            "<root>",
            "configuration must be a table/object",
        ))
    }
}

// Deep-merges objects; any other value in `overlay` replaces `base`.
fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_env_overrides(config: &mut EngineConfig, prefix: &str) -> Result<(), ConfigError> {
    let scope = format!("{prefix}__");
    let mut vars: Vec<(String, String)> = env::vars()
        .filter(|(k, _)| k.starts_with(&scope))
        .collect();
    vars.sort();

    for (key, value) in vars {
        apply_env_var(config, &key, &value, prefix)?;
    }

    Ok(())
}

fn apply_env_var(
    config: &mut EngineConfig,
    key: &str,
    value: &str,
    prefix: &str,
) -> Result<(), ConfigError> {
    let key_without_prefix = key
        .strip_prefix(prefix)
        .and_then(|k| k.strip_prefix("__"))
        .ok_or_else(|| ConfigError::env_parse_error(key, "invalid key format"))?;

    let parts: Vec<&str> = key_without_prefix.split("__").collect();

    match parts.as_slice() {
        // Engine section
        ["ENGINE", "CALL_DONE_ON_END"] => {
            config.engine.call_done_on_end = parse_bool(value)
                .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
        }
        ["ENGINE", "OPTIONS", name] if !name.is_empty() => {
            config
                .engine
                .options
                .insert(name.to_lowercase(), parse_option_value(value));
        }

        // Logging section
        ["LOGGING", "ENABLED"] => {
            config.logging.enabled = parse_bool(value)
                .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
        }
        ["LOGGING", "LEVEL"] => {
            config.logging.level = value.to_string();
        }
        ["LOGGING", "FORMAT"] => {
            config.logging.format = value.parse::<LogFormat>().map_err(|_| {
                ConfigError::env_parse_error(key, "expected 'json', 'pretty' or 'compact'")
            })?;
        }
        ["LOGGING", "SPAN_EVENTS"] => {
            config.logging.span_events = parse_bool(value)
                .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
        }
        ["LOGGING", "FILE_LINE_INFO"] => {
            config.logging.file_line_info = parse_bool(value)
                .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
        }

        // Unknown key - ignore
        _ => {}
    }

    Ok(())
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

// JSON scalars and documents are kept typed; anything else is a string.
fn parse_option_value(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string()))
}
