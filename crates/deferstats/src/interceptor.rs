// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use deferclient::{panic_message, DeferPanicClient};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, StatusCode};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::StatsConfig;
use crate::latency::{LatencyRegistry, RequestOutcome, StatusCodeCounter};
use crate::response_tracer::{ResponseTracer, ResponseWriter};
use crate::span::{header_snapshot, SpanContext};

/// Request handler wrapped by the interceptor.
///
/// Implemented for any `Fn(&Request<Bytes>, &mut dyn ResponseWriter)`.
pub trait Handler: Send + Sync {
    fn serve(&self, req: &Request<Bytes>, w: &mut dyn ResponseWriter);
}

impl<F> Handler for F
where
    F: Fn(&Request<Bytes>, &mut dyn ResponseWriter) + Send + Sync,
{
    fn serve(&self, req: &Request<Bytes>, w: &mut dyn ResponseWriter) {
        self(req, w)
    }
}

/// Writes the response of a request whose handler panicked. Receives the
/// panic message.
pub type PanicResponder = Arc<dyn Fn(&mut dyn ResponseWriter, &Request<Bytes>, &str) + Send + Sync>;

/// Answers 500 with the panic message as a plain text body.
pub fn default_panic_responder() -> PanicResponder {
    Arc::new(|w: &mut dyn ResponseWriter, _req: &Request<Bytes>, message: &str| {
        w.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        w.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        if let Err(e) = w.write(message.as_bytes()) {
            debug!("Failed to write panic response: {e}");
        }
    })
}

/// Times requests, records the slow and failed ones and turns handler panics
/// into reports plus a fallback response.
#[derive(Clone)]
pub struct RequestInterceptor {
    client: DeferPanicClient,
    latencies: Arc<LatencyRegistry>,
    status_codes: Arc<StatusCodeCounter>,
    threshold_ms: u64,
    on_panic: PanicResponder,
}

impl RequestInterceptor {
    pub fn new(client: DeferPanicClient, config: &StatsConfig) -> Self {
        Self {
            client,
            latencies: Arc::new(LatencyRegistry::new()),
            status_codes: Arc::new(StatusCodeCounter::new()),
            threshold_ms: config.latency_threshold_ms,
            on_panic: default_panic_responder(),
        }
    }

    pub fn with_panic_responder(mut self, on_panic: PanicResponder) -> Self {
        self.on_panic = on_panic;
        self
    }

    pub fn client(&self) -> &DeferPanicClient {
        &self.client
    }

    pub fn latencies(&self) -> Arc<LatencyRegistry> {
        Arc::clone(&self.latencies)
    }

    pub fn status_codes(&self) -> Arc<StatusCodeCounter> {
        Arc::clone(&self.status_codes)
    }

    /// Runs `handler` for `req`, writing to `w`.
    ///
    /// The request's [`SpanContext`] is available to the handler through the
    /// request extensions. A panic raised by the handler never escapes.
    pub fn intercept<H>(&self, handler: &H, mut req: Request<Bytes>, w: &mut dyn ResponseWriter)
    where
        H: Handler + ?Sized,
    {
        let start = Instant::now();
        let span = SpanContext::from_headers(req.headers());
        let headers = header_snapshot(req.headers());
        req.extensions_mut().insert(span);

        let result = {
            let mut tracer = ResponseTracer::new(&mut *w);
            panic::catch_unwind(AssertUnwindSafe(|| handler.serve(&req, &mut tracer)))
                .map(|()| tracer.status())
        };

        match result {
            Ok(status) => {
                self.after_request(&req, status, start.elapsed(), span, headers, false);
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                warn!(
                    "Recovered panic in handler for {} {}: {message}",
                    req.method(),
                    req.uri().path()
                );
                self.client.report(&*payload, span.span_id);
                self.after_request(
                    &req,
                    StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                    start.elapsed(),
                    span,
                    headers,
                    true,
                );
                (self.on_panic)(w, &req, &message);
            }
        }
    }

    fn after_request(
        &self,
        req: &Request<Bytes>,
        status: u16,
        elapsed: Duration,
        span: SpanContext,
        headers: HashMap<String, String>,
        is_problem: bool,
    ) {
        self.status_codes.inc(status);

        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if is_problem || elapsed_ms > self.threshold_ms {
            debug!(
                "Recording {} {} ({status}) after {elapsed_ms} ms",
                req.method(),
                req.uri().path()
            );
            self.latencies.add(RequestOutcome {
                path: req.uri().path().to_string(),
                method: req.method().to_string(),
                status_code: status,
                elapsed_ms,
                span_id: span.span_id,
                parent_span_id: span.parent_span_id,
                is_problem,
                headers,
            });
        }
    }
}
