//! Error types for Tessera.
//!
//! [`TesseraError`] is what middleware and handlers return when they fail.
//! The engine stashes it on the request context before running the error
//! chain and returns it to the host when nothing recovers, so the type is
//! cheap to clone: the optional underlying cause is shared behind an `Arc`.
//!
//! Every error carries an [`ErrorKind`] tag. Leaf middleware that turn
//! errors into responses match on the kind instead of downcasting.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Result type alias using [`TesseraError`].
pub type TesseraResult<T> = Result<T, TesseraError>;

/// Shared, type-erased cause attached to a [`TesseraError`].
pub type SharedSource = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of a [`TesseraError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request was malformed or failed validation.
    BadRequest,
    /// Missing or invalid credentials.
    Unauthorized,
    /// The caller is authenticated but not allowed.
    Forbidden,
    /// The addressed resource does not exist.
    NotFound,
    /// The request body exceeds the configured limit.
    PayloadTooLarge,
    /// The caller exceeded its request budget.
    RateLimited,
    /// A downstream dependency is unavailable.
    Unavailable,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Returns the default HTTP status code for this kind.
    #[must_use]
    pub const fn default_status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the stable machine-readable code used in error envelopes.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::RateLimited => "RATE_LIMITED",
            Self::Unavailable => "SERVICE_UNAVAILABLE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned by middleware, handlers and the engine.
///
/// `Display` renders the bare message, so `err.to_string()` is exactly what
/// the failing middleware reported.
///
/// # Example
///
/// ```
/// use tessera_core::{ErrorKind, TesseraError};
///
/// let err = TesseraError::not_found("no such user");
/// assert_eq!(err.kind(), ErrorKind::NotFound);
/// assert_eq!(err.message(), "no such user");
/// assert_eq!(err.status().as_u16(), 404);
/// ```
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct TesseraError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<SharedSource>,
}

impl TesseraError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a bad-request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    /// Creates a forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Creates a payload-too-large error.
    #[must_use]
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PayloadTooLarge, message)
    }

    /// Creates a rate-limited error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Wraps an arbitrary error as an internal error, keeping it as the source.
    #[must_use]
    pub fn internal_from<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind: ErrorKind::Internal,
            message: source.to_string(),
            source: Some(Arc::new(source)),
        }
    }

    /// Attaches an underlying cause.
    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message the error was created with.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the default HTTP status for this error's kind.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.kind.default_status()
    }

    /// Returns `true` if this error has the given kind.
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl From<serde_json::Error> for TesseraError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal_from(err)
    }
}

impl From<http::Error> for TesseraError {
    fn from(err: http::Error) -> Self {
        Self::internal_from(err)
    }
}
