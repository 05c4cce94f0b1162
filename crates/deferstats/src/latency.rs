// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::mem;
use std::sync::{Mutex, PoisonError, RwLock};

/// One request worth reporting, either slow or failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOutcome {
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Method")]
    pub method: String,
    #[serde(rename = "StatusCode")]
    pub status_code: u16,
    /// Elapsed time in milliseconds
    #[serde(rename = "Time")]
    pub elapsed_ms: u64,
    #[serde(rename = "SpanId")]
    pub span_id: i64,
    #[serde(rename = "ParentSpanId")]
    pub parent_span_id: i64,
    #[serde(rename = "IsProblem")]
    pub is_problem: bool,
    #[serde(rename = "Headers")]
    pub headers: HashMap<String, String>,
}

/// Recorded request outcomes, kept until the next reset.
///
/// There is no eviction: the owner is expected to drain it periodically.
#[derive(Debug, Default)]
pub struct LatencyRegistry {
    outcomes: RwLock<Vec<RequestOutcome>>,
}

impl LatencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, outcome: RequestOutcome) {
        self.outcomes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(outcome);
    }

    /// Copy of the recorded outcomes
    pub fn list(&self) -> Vec<RequestOutcome> {
        self.outcomes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reset(&self) {
        *self.outcomes.write().unwrap_or_else(PoisonError::into_inner) = Vec::new();
    }

    /// Takes every recorded outcome and resets, in one critical section.
    pub fn drain(&self) -> Vec<RequestOutcome> {
        mem::take(&mut *self.outcomes.write().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.outcomes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Number of completed requests per response status
#[derive(Debug, Default)]
pub struct StatusCodeCounter {
    counts: Mutex<HashMap<u16, u64>>,
}

impl StatusCodeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, status: u16) {
        *self
            .counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(status)
            .or_insert(0) += 1;
    }

    pub fn get(&self, status: u16) -> u64 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&status)
            .copied()
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<u16, u64> {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn drain(&self) -> HashMap<u16, u64> {
        mem::take(&mut *self.counts.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
