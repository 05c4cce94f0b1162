// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use hyper::{HeaderMap, Request};
use rand::Rng;
use std::collections::HashMap;

/// Inbound header carrying the caller's span id as a base-10 integer
pub const PARENT_SPAN_HEADER: &str = "x-dpparentspanid";

/// Identity of one traced request.
///
/// The interceptor inserts it into the request extensions, so handlers can
/// read it with [`SpanContext::of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanContext {
    pub span_id: i64,
    /// 0 unless propagated by the caller
    pub parent_span_id: i64,
}

impl SpanContext {
    pub fn new(parent_span_id: i64) -> Self {
        Self {
            span_id: new_span_id(),
            parent_span_id,
        }
    }

    /// Fresh span whose parent is taken from the propagation header.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::new(parent_span_id(headers))
    }

    /// Span of a request that went through the interceptor
    pub fn of<B>(req: &Request<B>) -> Option<SpanContext> {
        req.extensions().get::<SpanContext>().copied()
    }

    pub fn span_id_string(&self) -> String {
        self.span_id.to_string()
    }
}

/// Random positive 63-bit span id
pub fn new_span_id() -> i64 {
    rand::thread_rng().gen_range(1..=i64::MAX)
}

/// Parent span id from the propagation header, 0 if absent or not a number.
pub fn parent_span_id(headers: &HeaderMap) -> i64 {
    headers
        .get(PARENT_SPAN_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i64>().ok())
        .unwrap_or(0)
}

/// Flat copy of the request headers, keyed by canonical header name, with
/// repeated headers joined by commas.
pub fn header_snapshot(headers: &HeaderMap) -> HashMap<String, String> {
    let mut snapshot = HashMap::with_capacity(headers.keys_len());
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .collect::<Vec<String>>()
            .join(",");
        snapshot.insert(canonical_header_key(name.as_str()), joined);
    }
    snapshot
}

/// `x-dpparentspanid` -> `X-Dpparentspanid`
pub fn canonical_header_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            key.extend(c.to_uppercase());
        } else {
            key.extend(c.to_lowercase());
        }
        upper = c == '-';
    }
    key
}
