//! Layered configuration for Tessera engines.
//!
//! - TOML and JSON configuration files or strings
//! - Environment variable overrides, optionally seeded from `.env`
//! - Strict schema (unknown fields are rejected)
//! - Layered configuration (defaults → files → env)
//!
//! The loaded [`EngineConfig`] feeds both sides of a service: its
//! [`options`](EngineConfig::options) go into the engine, its
//! [`log_config`](EngineConfig::log_config) into `tessera_telemetry`.
//!
//! # Example
//!
//! ```no_run
//! use tessera_config::ConfigLoader;
//! use tessera_middleware::Engine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("tessera.toml")?
//!     .with_env_prefix("TESSERA")
//!     .load()?;
//!
//! tessera_telemetry::init_logging(&config.log_config())?;
//! let engine = Engine::without_handler(config.chain_config());
//! # let _ = engine;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [engine]
//! call_done_on_end = true
//!
//! [engine.options]
//! tenant = "acme"
//! max_items = 25
//!
//! [logging]
//! enabled = true
//! level = "info,tessera_middleware=debug"
//! format = "json"
//! span_events = false
//! file_line_info = false
//! ```

#![doc(html_root_url = "https://docs.rs/tessera-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::{EngineConfig, EngineSection, LoggingSection};
pub use error::ConfigError;
pub use loader::ConfigLoader;
