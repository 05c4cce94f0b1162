// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use deferclient::{ClientConfig, DeferPanicClient};
use deferstats::{
    InstrumentedService, RequestInterceptor, ResponseWriter, StatsConfig, StatsFlusher,
    PARENT_SPAN_HEADER,
};
use http_body_util::{BodyExt, Full};
use hyper::service::Service;
use hyper::{Request, StatusCode};
use mockito::{Matcher, Server};
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn config_for(server: &Server) -> ClientConfig {
    ClientConfig {
        api_base: format!("{}/v1.17", server.url()),
        agent_name: "web-1".to_string(),
        timeout: Duration::from_secs(5),
        ..ClientConfig::with_token("mock-token")
    }
}

fn demo_handler(req: &Request<Bytes>, w: &mut dyn ResponseWriter) {
    match req.uri().path() {
        "/slow" => {
            std::thread::sleep(Duration::from_millis(30));
            w.write(b"finally").unwrap();
        }
        "/panic" => panic!("demo panic"),
        _ => {
            w.write(b"ok").unwrap();
        }
    }
}

fn get(path: &str) -> Request<Full<Bytes>> {
    Request::get(path)
        .header(PARENT_SPAN_HEADER, "7")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn instrumented_requests_are_reported_and_flushed() {
    let mut server = Server::new_async().await;
    let panic_report = server
        .mock("POST", "/v1.17/panics/create")
        .match_header("X-deferid", "mock-token")
        .match_body(Matcher::PartialJsonString(
            r#"{"ErrorName": "demo panic"}"#.to_string(),
        ))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let stats = server
        .mock("POST", "/v1.17/uploads/stats/create")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJsonString(r#"{"RPMs": {"200": 2, "500": 1}}"#.to_string()),
            Matcher::Regex(r#""Path":"/slow""#.to_string()),
            Matcher::Regex(r#""Path":"/panic""#.to_string()),
            Matcher::Regex(r#""ParentSpanId":7"#.to_string()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"AgentID": {"Name": "web-1"}, "Commands": [{"id": 5, "type": "trace", "requested": true, "executed": false}]}"#,
        )
        .expect(1)
        .create_async()
        .await;
    let trace_upload = server
        .mock("POST", "/v1.17/uploads/trace/create")
        .match_body(Matcher::PartialJsonString(
            r#"{"CommandId": 5, "Ignored": true}"#.to_string(),
        ))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let client = DeferPanicClient::new(config_for(&server)).expect("client should build");
    let config = StatsConfig {
        latency_threshold_ms: 20,
        ..Default::default()
    };
    let interceptor = RequestInterceptor::new(client, &config);
    let flusher = StatsFlusher::for_interceptor(&interceptor, config.flush_interval());
    let service = InstrumentedService::new(interceptor, demo_handler);

    let fast = service.call(get("/")).await.unwrap();
    assert_eq!(fast.status(), StatusCode::OK);

    let slow = service.call(get("/slow")).await.unwrap();
    assert_eq!(slow.status(), StatusCode::OK);
    let body = slow.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, Bytes::from_static(b"finally"));

    let failed = service.call(get("/panic")).await.unwrap();
    assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);

    assert_eq!(service.interceptor().latencies().len(), 2);

    let wait = async {
        while !panic_report.matched_async().await {
            sleep(Duration::from_millis(20)).await;
        }
    };
    timeout(Duration::from_secs(2), wait)
        .await
        .expect("timed out waiting for the panic report");

    assert!(flusher.flush().await);
    assert!(service.interceptor().latencies().is_empty());

    let wait = async {
        while !trace_upload.matched_async().await {
            sleep(Duration::from_millis(20)).await;
        }
    };
    timeout(Duration::from_secs(2), wait)
        .await
        .expect("timed out waiting for the trace upload");

    panic_report.assert_async().await;
    stats.assert_async().await;
    trace_upload.assert_async().await;
    assert!(service.interceptor().client().commands().is_running(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nothing_is_uploaded_without_traffic() {
    let mut server = Server::new_async().await;
    let stats = server
        .mock("POST", "/v1.17/uploads/stats/create")
        .expect(0)
        .create_async()
        .await;

    let client = DeferPanicClient::new(config_for(&server)).expect("client should build");
    let interceptor = RequestInterceptor::new(client, &StatsConfig::default());
    let flusher = StatsFlusher::for_interceptor(&interceptor, Duration::from_secs(60));

    assert!(!flusher.flush().await);
    stats.assert_async().await;
}
