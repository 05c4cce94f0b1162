// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector double shared by the unit tests.

#![cfg(test)]

use async_trait::async_trait;
use bytes::Bytes;
use deferclient::{ClientConfig, DeferPanicClient, Transport, TransportError, TransportResponse};
use hyper::{HeaderMap, StatusCode};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub url: String,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body should be json")
    }
}

/// Records every request and answers 200 with an empty reply.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    requests: Mutex<Vec<RecordedRequest>>,
}

impl RecordingTransport {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post(
        &self,
        url: &str,
        _headers: HeaderMap,
        body: Bytes,
    ) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            body,
        });
        Ok(TransportResponse {
            status: StatusCode::OK,
            body: Bytes::from_static(b"{\"AgentID\": {\"Name\": \"web-1\"}}"),
        })
    }
}

/// Client posting into a fresh [`RecordingTransport`]. Needs a tokio runtime.
pub(crate) fn recording_client() -> (DeferPanicClient, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let config = ClientConfig {
        api_base: "http://collector/v1.17".to_string(),
        ..ClientConfig::with_token("token")
    };
    let client = DeferPanicClient::with_transport(config, transport.clone()).unwrap();
    (client, transport)
}

/// Polls `condition` until it holds or a second has passed.
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
