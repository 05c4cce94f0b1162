// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::{Bytes, BytesMut};
use http_body_util::Full;
use hyper::{HeaderMap, Response, StatusCode};
use std::io;
use tracing::debug;

/// Where a handler writes its response.
pub trait ResponseWriter {
    fn headers_mut(&mut self) -> &mut HeaderMap;
    /// Writes body bytes, implying a 200 status if none was set.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn write_header(&mut self, status: StatusCode);
}

/// Wraps a [`ResponseWriter`] and observes the status and byte count that go
/// through it.
pub struct ResponseTracer<'a> {
    inner: &'a mut dyn ResponseWriter,
    status: u16,
    size: usize,
}

impl<'a> ResponseTracer<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        Self {
            inner,
            status: 0,
            size: 0,
        }
    }

    /// Last status written, 0 if nothing was written yet
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Body bytes written so far
    pub fn size(&self) -> usize {
        self.size
    }
}

impl ResponseWriter for ResponseTracer<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status == 0 {
            self.status = StatusCode::OK.as_u16();
        }
        let written = self.inner.write(buf)?;
        self.size += written;
        Ok(written)
    }

    fn write_header(&mut self, status: StatusCode) {
        self.inner.write_header(status);
        self.status = status.as_u16();
    }
}

/// In-memory [`ResponseWriter`] that becomes a hyper response.
///
/// The first status written wins, like on a real connection.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_response(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body.freeze()));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseWriter for BufferedResponse {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn write_header(&mut self, status: StatusCode) {
        match self.status {
            None => self.status = Some(status),
            Some(current) => debug!("Superfluous write_header({status}), status already {current}"),
        }
    }
}
