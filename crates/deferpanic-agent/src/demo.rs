// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Handler served by the agent: one fast, one slow and one panicking route.

use bytes::Bytes;
use deferstats::{ResponseWriter, SpanContext};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, StatusCode};
use std::thread;
use std::time::Duration;
use tracing::debug;

const SLOW_DELAY: Duration = Duration::from_millis(750);

pub fn handle(req: &Request<Bytes>, w: &mut dyn ResponseWriter) {
    let span_id = SpanContext::of(req)
        .map(|span| span.span_id)
        .unwrap_or_default();

    match req.uri().path() {
        "/" => respond(w, StatusCode::OK, &format!("ok span={span_id}\n")),
        "/slow" => {
            thread::sleep(SLOW_DELAY);
            respond(w, StatusCode::OK, &format!("slow span={span_id}\n"));
        }
        "/panic" => fail(span_id),
        _ => respond(w, StatusCode::NOT_FOUND, "not found\n"),
    }
}

#[allow(clippy::panic)]
fn fail(span_id: i64) {
    panic!("panic requested by span {span_id}");
}

fn respond(w: &mut dyn ResponseWriter, status: StatusCode, body: &str) {
    w.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    w.write_header(status);
    if let Err(e) = w.write(body.as_bytes()) {
        debug!("Failed to write response: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deferstats::BufferedResponse;
    use std::panic::{self, AssertUnwindSafe};

    fn request(path: &str) -> Request<Bytes> {
        let mut req = Request::get(path).body(Bytes::new()).unwrap();
        req.extensions_mut().insert(SpanContext::new(0));
        req
    }

    #[test]
    fn test_root_reports_span() {
        let req = request("/");
        let span_id = SpanContext::of(&req).unwrap().span_id;
        let mut response = BufferedResponse::new();

        handle(&req, &mut response);

        assert_eq!(response.status(), Some(StatusCode::OK));
        assert_eq!(response.body(), format!("ok span={span_id}\n").as_bytes());
    }

    #[test]
    fn test_unknown_route() {
        let mut response = BufferedResponse::new();
        handle(&request("/nope"), &mut response);
        assert_eq!(response.status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_panic_route_panics() {
        let mut response = BufferedResponse::new();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            handle(&request("/panic"), &mut response);
        }));
        assert!(result.is_err());
        assert_eq!(response.status(), None);
    }
}
