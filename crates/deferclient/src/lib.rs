// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client for the deferpanic collector.
//!
//! Ships recovered panics, uploads diagnostic captures and executes the
//! commands the collector sends back in its replies.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod backtrace;
pub mod client;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod panic;
pub mod profiler;
pub mod transport;

mod test_support;

pub use backtrace::install_panic_hook;
pub use client::DeferPanicClient;
pub use command::{Agent, CollectorResponse, Command, CommandKind, CommandRegistry};
pub use config::ClientConfig;
pub use dispatch::{CaptureUpload, RemoteCommandDispatcher};
pub use error::{CaptureError, ClientError, ConfigError, TransportError};
pub use panic::{clean_trace, panic_message, PanicReport};
pub use profiler::{Profiler, UnsupportedProfiler};
pub use transport::{ReqwestTransport, Transport, TransportResponse};
