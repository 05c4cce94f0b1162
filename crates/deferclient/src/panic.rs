// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::oneshot;
use tokio::task::{self, JoinHandle};
use tracing::{error, warn};

use crate::backtrace::take_backtrace;
use crate::client::DeferPanicClient;
use crate::config::ERRORS_PATH;

/// Body POSTed to the collector for each recovered panic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanicReport {
    #[serde(rename = "ErrorName")]
    pub message: String,
    #[serde(rename = "Body")]
    pub body: String,
    #[serde(rename = "SpanId", default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<i64>,
}

impl PanicReport {
    /// Builds a report from a raw backtrace; a non-positive span id is omitted.
    pub fn new(message: &str, backtrace: &str, span_id: i64) -> Self {
        Self {
            message: message.to_string(),
            body: clean_trace(backtrace),
            span_id: (span_id > 0).then_some(span_id),
        }
    }
}

/// Text carried by a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    // This pattern of String vs &str comes from
    // https://doc.rust-lang.org/std/panic/struct.PanicHookInfo.html#method.payload
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// Panic message escaped onto a single printable line, without quotes.
pub fn report_message(payload: &(dyn Any + Send)) -> String {
    format!("{:?}", panic_message(payload)).replace('"', "")
}

/// Makes a backtrace safe to ship as a single JSON string line.
pub fn clean_trace(body: &str) -> String {
    body.replace('\n', "\\n")
        .replace('\t', "\\t")
        .replace('\0', " ")
        .trim()
        .to_string()
}

impl DeferPanicClient {
    /// Reports a recovered panic without waiting for the send.
    ///
    /// The returned handle can be dropped; the report still runs to completion.
    pub fn report(&self, payload: &(dyn Any + Send), span_id: i64) -> JoinHandle<()> {
        let (backtrace, message) = self.prepare(payload);
        let client = self.clone();
        self.spawn(async move {
            client.ship_trace(&backtrace, &message, span_id).await;
        })
    }

    /// Starts reporting a recovered panic and returns a future that resolves
    /// once the send attempt has finished, successfully or not.
    pub fn report_and_wait(
        &self,
        payload: &(dyn Any + Send),
        span_id: i64,
    ) -> impl Future<Output = ()> + Send + 'static {
        let done = self.report_with_signal(payload, span_id);
        async move {
            if done.await.is_err() {
                error!("Panic report task ended before completing");
            }
        }
    }

    /// Blocking flavour of [`Self::report_and_wait`].
    ///
    /// Waits in place on a multi-thread runtime worker. A current-thread
    /// runtime cannot be blocked, so there the report is sent in the
    /// background and this returns immediately.
    pub fn report_blocking(&self, payload: &(dyn Any + Send), span_id: i64) {
        let done = self.report_with_signal(payload, span_id);
        let outcome = match Handle::try_current() {
            Err(_) => done.blocking_recv(),
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                task::block_in_place(|| done.blocking_recv())
            }
            Ok(_) => {
                warn!("Cannot wait for the panic report on a current-thread runtime");
                return;
            }
        };
        if outcome.is_err() {
            error!("Panic report task ended before completing");
        }
    }

    fn report_with_signal(
        &self,
        payload: &(dyn Any + Send),
        span_id: i64,
    ) -> oneshot::Receiver<()> {
        let (backtrace, message) = self.prepare(payload);
        let (done_tx, done_rx) = oneshot::channel();
        let client = self.clone();
        self.spawn(async move {
            client.ship_trace(&backtrace, &message, span_id).await;
            let _ = done_tx.send(());
        });
        done_rx
    }

    fn prepare(&self, payload: &(dyn Any + Send)) -> (String, String) {
        let message = report_message(payload);
        let backtrace = take_backtrace(&panic_message(payload));
        if self.config().print_panics {
            error!("panic: {message}\n{backtrace}");
        }
        (backtrace, message)
    }

    /// Runs `f`, reporting any panic it raises. Returns `None` when it panicked.
    pub fn persist<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce() -> R,
    {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => Some(value),
            Err(payload) => {
                self.report(&*payload, 0);
                None
            }
        }
    }

    /// Runs `f`; if it panics, reports it and resumes the original panic.
    ///
    /// Waiting for the send follows [`Self::report_blocking`].
    pub fn persist_repanic<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => value,
            Err(payload) => {
                self.report_blocking(&*payload, 0);
                panic::resume_unwind(payload)
            }
        }
    }

    /// POSTs a panic report to the collector. A zero span id is omitted.
    pub async fn ship_trace(&self, backtrace: &str, message: &str, span_id: i64) {
        if self.config().no_post {
            return;
        }

        let report = PanicReport::new(message, backtrace, span_id);
        let body = match serde_json::to_vec(&report) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to serialize panic report: {e}");
                return;
            }
        };

        self.postit(Bytes::from(body), &self.config().url(ERRORS_PATH), false)
            .await;
    }
}
