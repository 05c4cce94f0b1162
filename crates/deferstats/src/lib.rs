// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP request instrumentation for the deferpanic collector.
//!
//! Records slow and failing requests, recovers handler panics and uploads
//! the collected stats on a schedule.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod flusher;
pub mod interceptor;
pub mod latency;
pub mod response_tracer;
pub mod service;
pub mod span;

mod test_support;

pub use config::StatsConfig;
pub use flusher::{StatsFlusher, StatsUpload};
pub use interceptor::{default_panic_responder, Handler, PanicResponder, RequestInterceptor};
pub use latency::{LatencyRegistry, RequestOutcome, StatusCodeCounter};
pub use response_tracer::{BufferedResponse, ResponseTracer, ResponseWriter};
pub use service::InstrumentedService;
pub use span::{header_snapshot, new_span_id, parent_span_id, SpanContext, PARENT_SPAN_HEADER};
