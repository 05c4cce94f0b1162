// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use http_body_util::Full;
use std::io;
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Accepts connections on `listener` and serves each one with `service` until
/// `cancel` fires. Fails when the listener breaks or the stats flusher dies.
pub async fn serve_tcp<S>(
    listener: TcpListener,
    service: S,
    mut flusher_handle: JoinHandle<()>,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: hyper::service::Service<
            hyper::Request<hyper::body::Incoming>,
            Response = hyper::Response<Full<Bytes>>,
        > + Clone
        + Send
        + 'static,
    S::Future: Send,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let server = hyper::server::conn::http1::Builder::new();
    let mut joinset = JoinSet::new();

    loop {
        let conn = tokio::select! {
            con_res = listener.accept() => match con_res {
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    error!("Server error: {e}");
                    return Err(e.into());
                }
                Ok((conn, peer)) => {
                    debug!("Accepted connection from {peer}");
                    conn
                }
            },
            finished = async {
                match joinset.join_next().await {
                    Some(finished) => finished,
                    None => std::future::pending().await,
                }
            } => match finished {
                Err(e) if e.is_panic() => {
                    error!("Connection handler panicked: {:?}", e);
                    continue;
                },
                Ok(()) | Err(_) => continue,
            },
            result = &mut flusher_handle => {
                error!("Stats flusher task died: {:?}", result);
                return Err("Stats flusher task terminated unexpectedly".into());
            },
            () = cancel.cancelled() => {
                info!("Shutting down, closing {} open connections", joinset.len());
                joinset.shutdown().await;
                flusher_handle.abort();
                return Ok(());
            },
        };
        let conn = hyper_util::rt::TokioIo::new(conn);
        let server = server.clone();
        let service = service.clone();
        joinset.spawn(async move {
            if let Err(e) = server.serve_connection(conn, service).await {
                error!("Connection error: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use deferclient::{ClientConfig, DeferPanicClient};
    use deferstats::{InstrumentedService, RequestInterceptor, StatsConfig};
    use http_body_util::{BodyExt, Empty};
    use hyper::{Request, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn get(addr: SocketAddr, path: &str) -> (StatusCode, Bytes) {
        let stream = timeout(Duration::from_secs(2), tokio::net::TcpStream::connect(addr))
            .await
            .unwrap()
            .unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let request = Request::get(path)
            .header("host", addr.to_string())
            .body(Empty::<Bytes>::new())
            .unwrap();
        let response = timeout(Duration::from_secs(2), sender.send_request(request))
            .await
            .unwrap()
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_serves_instrumented_handler_until_cancelled() {
        let config = ClientConfig {
            no_post: true,
            ..Default::default()
        };
        let client = DeferPanicClient::new(config).unwrap();
        let interceptor = RequestInterceptor::new(client, &StatsConfig::default());
        let latencies = interceptor.latencies();
        let status_codes = interceptor.status_codes();
        let service = InstrumentedService::new(interceptor, demo::handle);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let flusher_handle = tokio::spawn(std::future::pending::<()>());
        let server = tokio::spawn(serve_tcp(listener, service, flusher_handle, cancel.clone()));

        let (status, body) = get(addr, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with(b"ok span="));

        let (status, body) = get(addr, "/panic").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.starts_with(b"panic requested by span "));

        let (status, _) = get(addr, "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        assert_eq!(latencies.len(), 1);
        assert!(latencies.list()[0].is_problem);
        assert_eq!(status_codes.get(200), 1);
        assert_eq!(status_codes.get(404), 1);

        cancel.cancel();
        let result = timeout(Duration::from_secs(2), server).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
