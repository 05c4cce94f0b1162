// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::error;

use crate::interceptor::{Handler, RequestInterceptor};
use crate::response_tracer::BufferedResponse;

/// hyper [`Service`] running every request through a [`RequestInterceptor`].
///
/// The body is collected first, then the handler runs on a blocking worker.
pub struct InstrumentedService<H> {
    interceptor: RequestInterceptor,
    handler: Arc<H>,
}

impl<H> Clone for InstrumentedService<H> {
    fn clone(&self) -> Self {
        Self {
            interceptor: self.interceptor.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H> InstrumentedService<H>
where
    H: Handler + 'static,
{
    pub fn new(interceptor: RequestInterceptor, handler: H) -> Self {
        Self {
            interceptor,
            handler: Arc::new(handler),
        }
    }

    pub fn interceptor(&self) -> &RequestInterceptor {
        &self.interceptor
    }
}

impl<H, B> Service<Request<B>> for InstrumentedService<H>
where
    H: Handler + 'static,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Display,
{
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let interceptor = self.interceptor.clone();
        let handler = Arc::clone(&self.handler);

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    error!("Failed to read request body: {e}");
                    return Ok(plain_response(
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read request body: {e}"),
                    ));
                }
            };
            let req = Request::from_parts(parts, body);

            let handled = tokio::task::spawn_blocking(move || {
                let mut response = BufferedResponse::new();
                interceptor.intercept(&*handler, req, &mut response);
                response
            })
            .await;

            match handled {
                Ok(response) => Ok(response.into_response()),
                Err(e) => {
                    error!("Request worker failed: {e}");
                    Ok(plain_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal server error".to_string(),
                    ))
                }
            }
        })
    }
}

fn plain_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}
