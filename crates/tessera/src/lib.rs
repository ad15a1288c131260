//! # Tessera
//!
//! Composable async middleware engine with explicit chain control and a
//! separate error pipeline.
//!
//! ## Quick Start
//!
//! ```
//! use http::StatusCode;
//! use tessera::prelude::*;
//!
//! let engine = Engine::builder()
//!     .use_middleware(RequestIdMiddleware::new())
//!     .use_middleware(RequestLogger::new())
//!     .handler(handler_fn(|_req, res| {
//!         Box::pin(async move {
//!             res.send_json(StatusCode::OK, &serde_json::json!({"status": "ok"}))?;
//!             Ok(())
//!         })
//!     }))
//!     .use_on_error(ErrorMapper::new())
//!     .build();
//!
//! assert_eq!(engine.stage_names(), vec![Some("request_id"), Some("request_logger")]);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Request → [primary chain] → Handler → (response still open?) → 501
//!                 │               │
//!                 └──── error ────┴──► [error chain] → (still open?) → Err
//! ```
//!
//! | Crate | Purpose |
//! |-------|---------|
//! | [`core`] | Errors, request ID, response with finalize hooks, handler trait |
//! | [`middleware`] | Context, chain runner, engine, factory, built-in stages |
//! | [`config`] | Layered TOML/JSON/env configuration |
//! | [`telemetry`] | `tracing` subscriber setup |

#![doc(html_root_url = "https://docs.rs/tessera/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use tessera_core as core;

// Re-export middleware types
pub use tessera_middleware as middleware;

// Re-export configuration types
pub use tessera_config as config;

// Re-export logging setup
pub use tessera_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use tessera::prelude::*;
///
/// let options = Options::new().with("tenant", "acme");
/// assert!(options.call_done_on_end());
/// ```
pub mod prelude {
    pub use tessera_core::{
        handler_fn, BoxFuture, ErrorKind, Handler, Request, RequestId, Response, TesseraError,
        TesseraResult,
    };

    pub use tessera_middleware::{
        from_fn, Chain, ChainConfig, Context, Engine, EngineBuilder, EngineFactory, Middleware,
        Next, Options,
    };

    // Re-export built-in stages
    pub use tessera_middleware::stages::{
        BodyLimit, ErrorMapper, RequestIdMiddleware, RequestLogger,
    };

    pub use tessera_config::{ConfigLoader, EngineConfig};
    pub use tessera_telemetry::{init_logging, LogConfig, LogFormat};
}
