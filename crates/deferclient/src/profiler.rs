// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::error::CaptureError;

/// Produces the diagnostic captures requested by the collector.
#[async_trait]
pub trait Profiler: Send + Sync {
    /// Execution trace of the running process
    async fn trace(&self) -> Result<Vec<u8>, CaptureError>;
    async fn cpu_profile(&self) -> Result<Vec<u8>, CaptureError>;
    async fn mem_profile(&self) -> Result<Vec<u8>, CaptureError>;

    /// Bytes of the traced executable, uploaded alongside a trace so the
    /// collector can symbolize it.
    async fn trace_package(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Profiler for processes that have no capture backend wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedProfiler;

#[async_trait]
impl Profiler for UnsupportedProfiler {
    async fn trace(&self) -> Result<Vec<u8>, CaptureError> {
        Err(CaptureError::Unsupported("trace"))
    }

    async fn cpu_profile(&self) -> Result<Vec<u8>, CaptureError> {
        Err(CaptureError::Unsupported("cpu-profile"))
    }

    async fn mem_profile(&self) -> Result<Vec<u8>, CaptureError> {
        Err(CaptureError::Unsupported("mem-profile"))
    }
}
