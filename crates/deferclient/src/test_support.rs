// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transport and profiler doubles shared by the unit tests.

#![cfg(test)]

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::command::{Agent, CollectorResponse, Command};
use crate::error::{CaptureError, TransportError};
use crate::profiler::Profiler;
use crate::transport::{Transport, TransportResponse};

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body should be json")
    }
}

/// Records every request and answers with a fixed reply.
pub(crate) struct RecordingTransport {
    requests: Mutex<Vec<RecordedRequest>>,
    status: StatusCode,
    reply: Bytes,
    delay: Duration,
    fail: bool,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::replying(StatusCode::OK, "")
    }
}

impl RecordingTransport {
    pub fn replying(status: StatusCode, reply: &str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            status,
            reply: Bytes::copy_from_slice(reply.as_bytes()),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Sleeps before recording the request and answering.
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, suffix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.ends_with(suffix))
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post(
        &self,
        url: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<TransportResponse, TransportError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(TransportError::Send {
                url: url.to_string(),
                message: "connection refused".to_string(),
            });
        }
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            headers,
            body,
        });
        Ok(TransportResponse {
            status: self.status,
            body: self.reply.clone(),
        })
    }
}

/// Profiler returning fixed bytes and counting captures.
#[derive(Default)]
pub(crate) struct CountingProfiler {
    pub captures: AtomicUsize,
}

impl CountingProfiler {
    pub fn count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Profiler for CountingProfiler {
    async fn trace(&self) -> Result<Vec<u8>, CaptureError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(b"trace".to_vec())
    }

    async fn cpu_profile(&self) -> Result<Vec<u8>, CaptureError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(b"cpu".to_vec())
    }

    async fn mem_profile(&self) -> Result<Vec<u8>, CaptureError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Err(CaptureError::Failed {
            kind: "mem-profile",
            message: "heap walk failed".to_string(),
        })
    }

    async fn trace_package(&self) -> Option<Vec<u8>> {
        Some(b"pkg".to_vec())
    }
}

pub(crate) fn collector_reply(commands: &[Command]) -> String {
    serde_json::to_string(&CollectorResponse {
        agent: Agent::new("web-1"),
        commands: commands.to_vec(),
    })
    .unwrap()
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
