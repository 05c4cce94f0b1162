// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use bytes::Bytes;
use core::time::Duration;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::TransportError;

/// What the collector answered to a POST
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Sends bytes to the collector and hands back the status code and body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by a `reqwest` client
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(proxy_url: Option<&str>, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(proxy_url, timeout)?,
        })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(
        &self,
        url: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<TransportResponse, TransportError> {
        let time = std::time::Instant::now();
        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Send {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;
        debug!(
            "Collector answered {status} in {} ms for {url}",
            time.elapsed().as_millis()
        );

        Ok(TransportResponse { status, body })
    }
}

/// Builds a reqwest client with optional proxy configuration and timeout.
pub fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, TransportError> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(proxy) = proxy_url {
        let proxy = reqwest::Proxy::https(proxy)
            .map_err(|e| TransportError::Build(e.to_string()))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| TransportError::Build(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_post_returns_status_and_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/panics/create")
            .match_header("X-deferid", "token")
            .match_body("{}")
            .with_status(201)
            .with_body("created")
            .create_async()
            .await;

        let transport =
            ReqwestTransport::new(None, Duration::from_secs(5)).expect("client should build");
        let mut headers = HeaderMap::new();
        headers.insert("x-deferid", "token".parse().unwrap());

        let response = transport
            .post(
                &format!("{}/panics/create", server.url()),
                headers,
                Bytes::from_static(b"{}"),
            )
            .await
            .expect("request should succeed");

        mock.assert_async().await;
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.body, Bytes::from_static(b"created"));
    }

    #[tokio::test]
    async fn test_from_client_keeps_caller_settings() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/uploads/stats/create")
            .match_header("x-dpenv", "production")
            .with_status(200)
            .create_async()
            .await;

        let mut defaults = HeaderMap::new();
        defaults.insert("x-dpenv", "production".parse().unwrap());
        let client = reqwest::Client::builder()
            .default_headers(defaults)
            .build()
            .unwrap();
        let transport = ReqwestTransport::from_client(client);

        let response = transport
            .post(
                &format!("{}/uploads/stats/create", server.url()),
                HeaderMap::new(),
                Bytes::new(),
            )
            .await
            .expect("request should succeed");

        mock.assert_async().await;
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_post_to_unreachable_host_is_send_error() {
        let transport =
            ReqwestTransport::new(None, Duration::from_secs(1)).expect("client should build");
        let result = transport
            .post(
                "http://127.0.0.1:1/panics/create",
                HeaderMap::new(),
                Bytes::new(),
            )
            .await;
        assert!(matches!(result, Err(TransportError::Send { .. })));
    }

    #[test]
    fn test_build_client_rejects_invalid_proxy() {
        let result = build_client(Some("http://[::1"), Duration::from_secs(1));
        assert!(matches!(result, Err(TransportError::Build(_))));
    }
}
