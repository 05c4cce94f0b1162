// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use deferclient::config::STATS_PATH;
use deferclient::DeferPanicClient;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};

use crate::interceptor::RequestInterceptor;
use crate::latency::{LatencyRegistry, RequestOutcome, StatusCodeCounter};

/// Body of a stats upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsUpload {
    #[serde(rename = "HTTPs")]
    pub requests: Vec<RequestOutcome>,
    /// Completed requests per status code since the previous upload
    #[serde(rename = "RPMs")]
    pub status_codes: HashMap<u16, u64>,
}

/// Periodically uploads the recorded request stats.
///
/// The upload asks the collector for pending commands, so this is also what
/// polls for remote captures.
#[derive(Clone)]
pub struct StatsFlusher {
    client: DeferPanicClient,
    latencies: Arc<LatencyRegistry>,
    status_codes: Arc<StatusCodeCounter>,
    interval: Duration,
}

impl StatsFlusher {
    pub fn new(
        client: DeferPanicClient,
        latencies: Arc<LatencyRegistry>,
        status_codes: Arc<StatusCodeCounter>,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            latencies,
            status_codes,
            interval,
        }
    }

    /// Flusher sharing the buffers of `interceptor`
    pub fn for_interceptor(interceptor: &RequestInterceptor, interval: Duration) -> Self {
        Self::new(
            interceptor.client().clone(),
            interceptor.latencies(),
            interceptor.status_codes(),
            interval,
        )
    }

    /// Flushes every interval, forever.
    pub async fn start(&self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.flush().await;
        }
    }

    /// Drains the buffers and uploads them. Returns whether anything was sent.
    pub async fn flush(&self) -> bool {
        let upload = StatsUpload {
            requests: self.latencies.drain(),
            status_codes: self.status_codes.drain(),
        };
        if upload.requests.is_empty() && upload.status_codes.is_empty() {
            return false;
        }
        debug!(
            "Flushing {} recorded requests and {} status codes",
            upload.requests.len(),
            upload.status_codes.len()
        );

        let body = match serde_json::to_vec(&upload) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to serialize stats upload: {e}");
                return false;
            }
        };
        self.client
            .postit(
                Bytes::from(body),
                &self.client.config().url(STATS_PATH),
                true,
            )
            .await;
        true
    }
}
