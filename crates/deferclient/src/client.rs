// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use reqwest::StatusCode;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::command::{Agent, CollectorResponse, CommandRegistry};
use crate::config::ClientConfig;
use crate::dispatch::RemoteCommandDispatcher;
use crate::error::ClientError;
use crate::profiler::{Profiler, UnsupportedProfiler};
use crate::transport::{ReqwestTransport, Transport};

const TOKEN_HEADER: HeaderName = HeaderName::from_static("x-deferid");
const ENVIRONMENT_HEADER: HeaderName = HeaderName::from_static("x-dpenv");
const APP_GROUP_HEADER: HeaderName = HeaderName::from_static("x-dpgroup");
const AGENT_ID_HEADER: HeaderName = HeaderName::from_static("x-dpagentid");

/// Client for the deferpanic collector.
///
/// Cloning is cheap and every clone shares the transport, the agent record and
/// the registry of dispatched commands.
#[derive(Clone)]
pub struct DeferPanicClient {
    config: Arc<ClientConfig>,
    agent: Arc<Agent>,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<RemoteCommandDispatcher>,
    runtime: Handle,
}

impl DeferPanicClient {
    /// Builds a client sending through `reqwest`. Must be called from within a tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(config.https_proxy.as_deref(), config.timeout)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Builds a client around the given transport. Must be called from within a tokio runtime.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;
        let agent = Agent::new(&config.agent_name);

        Ok(Self {
            config: Arc::new(config),
            agent: Arc::new(agent),
            transport,
            dispatcher: Arc::new(RemoteCommandDispatcher::new(Arc::new(UnsupportedProfiler))),
            runtime,
        })
    }

    /// Replaces the profiler used for remotely requested captures.
    ///
    /// The command registry is kept, so ids already dispatched stay dispatched.
    pub fn with_profiler(mut self, profiler: Arc<dyn Profiler>) -> Self {
        self.dispatcher = Arc::new(self.dispatcher.with_profiler(profiler));
        self
    }

    /// Runs background reports and captures on `runtime` instead of the one
    /// the client was built on.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn commands(&self) -> &CommandRegistry {
        self.dispatcher.registry()
    }

    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(future)
    }

    fn request_headers(&self) -> Result<HeaderMap, InvalidHeaderValue> {
        let mut headers = HeaderMap::with_capacity(6);
        headers.insert(TOKEN_HEADER, HeaderValue::from_str(&self.config.token)?);
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_str(&self.config.user_agent)?,
        );
        headers.insert(
            ENVIRONMENT_HEADER,
            HeaderValue::from_str(&self.config.environment)?,
        );
        headers.insert(
            APP_GROUP_HEADER,
            HeaderValue::from_str(&self.config.app_group)?,
        );
        headers.insert(AGENT_ID_HEADER, HeaderValue::from_str(&self.agent.name)?);
        Ok(headers)
    }

    /// POSTs `body` to `url` with the collector headers.
    ///
    /// When `analyse_response` is set the reply is decoded and any new command
    /// it carries is dispatched. Failures are logged, never returned.
    pub async fn postit(&self, body: Bytes, url: &str, analyse_response: bool) {
        if self.config.no_post {
            return;
        }

        let headers = match self.request_headers() {
            Ok(headers) => headers,
            Err(e) => {
                error!("Invalid collector header value, request to {url} dropped: {e}");
                return;
            }
        };

        let response = match self.transport.post(url, headers, body).await {
            Ok(response) => response,
            Err(e) => {
                error!("{e}");
                return;
            }
        };

        match response.status {
            StatusCode::UNAUTHORIZED => error!("wrong or invalid API token"),
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("too many requests - you are being rate limited")
            }
            StatusCode::SERVICE_UNAVAILABLE => error!("service not available"),
            status => debug!("Collector answered {status} for {url}"),
        }

        if analyse_response {
            self.analyse_response(&response.body);
        }
    }

    /// Decodes a collector reply and dispatches its commands. Returns how many
    /// capture tasks were launched.
    pub fn analyse_response(&self, body: &[u8]) -> usize {
        match serde_json::from_slice::<CollectorResponse>(body) {
            Ok(response) => self.dispatcher.dispatch(self, response),
            Err(e) => {
                error!("Failed to decode collector response: {e}");
                0
            }
        }
    }
}
