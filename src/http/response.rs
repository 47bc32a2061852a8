//! Response model.
//!
//! # Design Decisions
//! - Bodies are fully materialized by dispatch; `Content-Length` is always
//!   known
//! - Failure responses carry a short plain-text message

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

/// Outcome of one dispatch.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ServiceResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Plain-text failure response.
    pub fn fail(status: StatusCode, message: &str) -> Self {
        let mut response = Self::new(status);
        response.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response.set_body(Bytes::copy_from_slice(message.as_bytes()));
        response
    }

    /// Replace the body and its `Content-Length`.
    pub fn set_body(&mut self, body: Bytes) {
        self.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        self.body = body;
    }

    /// Drop the body but keep the `Content-Length` it would have had.
    pub fn strip_body(&mut self) {
        self.headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        self.body = Bytes::new();
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl IntoResponse for ServiceResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
