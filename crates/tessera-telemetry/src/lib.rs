//! Structured logging for Tessera.
//!
//! The engine and the built-in stages report through `tracing`. This crate
//! installs a `tracing-subscriber` registry for them:
//!
//! - **JSON** output for production log pipelines
//! - **Pretty** or **compact** output for development
//! - `EnvFilter` directives (`info`, `tessera_middleware=debug,warn`, ...)
//!
//! # Example
//!
//! ```rust,ignore
//! use tessera_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(request_id = %id, "Processing request");
//! ```

#![doc(html_root_url = "https://docs.rs/tessera-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, fields, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
