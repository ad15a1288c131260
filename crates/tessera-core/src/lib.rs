//! # Tessera Core
//!
//! Core types shared by every Tessera crate:
//!
//! - [`TesseraError`] / [`ErrorKind`] - Tagged, cloneable error type
//! - [`Request`] / [`RequestId`] - Buffered HTTP request and UUID v7 identifier
//! - [`Response`] - Response with a one-shot finalize operation and hooks
//! - [`Handler`] - Terminal endpoint trait

#![doc(html_root_url = "https://docs.rs/tessera-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod handler;
mod request;
mod response;

pub use error::{ErrorKind, SharedSource, TesseraError, TesseraResult};
pub use handler::{handler_fn, BoxFuture, BoxedHandler, FnHandler, Handler};
pub use request::{Request, RequestId};
pub use response::{FinalizeHook, Response};
