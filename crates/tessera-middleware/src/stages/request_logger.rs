//! Access logging.
//!
//! [`RequestLogger`] does no work during its turn besides registering a
//! finalize hook on the response. When the response is finalized, the hook
//! emits one `tracing` event and, if configured, hands a [`LogEntry`] to a
//! sink. The chain is never held up waiting for the log write.
//!
//! Because finalize hooks run once, a response finalized twice still
//! produces a single entry.

use std::sync::Arc;
use std::time::Duration;

use http::{Method, StatusCode};
use tessera_core::{BoxFuture, Request, RequestId, Response, TesseraResult};
use tracing::info;

use crate::context::Context;
use crate::middleware::Middleware;

/// One access-log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// The request ID at the time the logger ran.
    pub request_id: RequestId,
    /// Request method.
    pub method: Method,
    /// Request path, without the query string.
    pub path: String,
    /// Final response status.
    pub status: StatusCode,
    /// Time from request entry to finalization.
    pub duration: Duration,
}

type Sink = Arc<dyn Fn(LogEntry) + Send + Sync>;

/// Middleware that logs every finalized response.
#[derive(Clone, Default)]
pub struct RequestLogger {
    sink: Option<Sink>,
}

impl RequestLogger {
    /// Creates a logger that only emits `tracing` events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also passes every entry to `sink`, e.g. to persist it.
    ///
    /// The sink runs inside the finalize hook and must not block.
    #[must_use]
    pub fn with_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(LogEntry) + Send + Sync + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }
}

impl std::fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLogger")
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

impl Middleware for RequestLogger {
    fn name(&self) -> &'static str {
        "request_logger"
    }

    fn call<'a>(
        &'a self,
        request: &'a mut Request,
        response: &'a mut Response,
        ctx: &'a mut Context,
    ) -> BoxFuture<'a, TesseraResult<()>> {
        Box::pin(async move {
            let method = request.method().clone();
            let path = request.uri().path().to_owned();
            let request_id = ctx.request_id();
            let started_at = ctx.started_at();
            let sink = self.sink.clone();

            response.on_finalize(move |res| {
                let entry = LogEntry {
                    request_id,
                    method,
                    path,
                    status: res.status(),
                    duration: started_at.elapsed(),
                };

                info!(
                    request_id = %entry.request_id,
                    http.method = %entry.method,
                    http.path = %entry.path,
                    http.status_code = entry.status.as_u16(),
                    duration_ms = u64::try_from(entry.duration.as_millis()).unwrap_or(u64::MAX),
                    "request completed"
                );

                if let Some(sink) = sink {
                    sink(entry);
                }
            });
            Ok(())
        })
    }
}
