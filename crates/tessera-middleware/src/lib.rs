//! # Tessera Middleware
//!
//! Middleware chain runner and request engine for Tessera.
//!
//! An [`Engine`] processes a request in four steps:
//!
//! ```text
//! Request → [primary chain] → Handler → (response still open?) → 501
//!                 │               │
//!                 └──── error ────┴──► [error chain] → (still open?) → Err
//! ```
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`chain`] | Runs one ordered list of middleware with `next`/`done` control |
//! | [`engine`] | Handler invocation, `501` fallback and the error pipeline |
//! | [`factory`] | Builds engines from shared defaults plus call-site overrides |
//! | [`stages`] | Built-in leaf middleware |
//!
//! ## Chain control
//!
//! Middleware get a mutable [`Context`] shared by both chains of a request.
//! Returning normally continues the chain; `ctx.next().run(..)` continues it
//! inside the current turn; `ctx.done()` aborts it. With the default options,
//! finalizing the response aborts the chain as well.
//!
//! ## Example
//!
//! ```
//! use http::StatusCode;
//! use tessera_core::Response;
//! use tessera_middleware::stages::{ErrorMapper, RequestIdMiddleware};
//! use tessera_middleware::{from_fn, Engine};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let engine = Engine::builder()
//!     .use_middleware(RequestIdMiddleware::new())
//!     .use_middleware(from_fn("not_found", |_req, res, _ctx| {
//!         Box::pin(async move {
//!             res.send_text(StatusCode::NOT_FOUND, "missing");
//!             Ok(())
//!         })
//!     }))
//!     .use_on_error(ErrorMapper::new())
//!     .build();
//!
//! let mut request = http::Request::builder().uri("/x").body(bytes::Bytes::new()).unwrap();
//! let mut response = Response::new();
//! engine.handle(&mut request, &mut response).await.unwrap();
//!
//! assert_eq!(response.status(), StatusCode::NOT_FOUND);
//! assert!(response.headers().contains_key("x-request-id"));
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/tessera-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod context;
pub mod engine;
pub mod factory;
pub mod middleware;
pub mod options;
pub mod stages;

// Re-export main types at crate root
pub use chain::{Chain, ChainLabel};
pub use context::{Context, Runtime};
pub use engine::{Engine, EngineBuilder, NOT_IMPLEMENTED_BODY};
pub use factory::{ChainConfig, EngineFactory};
pub use middleware::{from_fn, BoxedMiddleware, FnMiddleware, Middleware, Next};
pub use options::Options;
