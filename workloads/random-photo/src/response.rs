//! Platform-neutral response model.

use edge_sdk::edge_data::ResponseBody;
use http::StatusCode;
use serde::Serialize;

use crate::error::{ErrorBody, ServeError};

/// Headers attached to every response.
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, HEAD, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type, Authorization"),
];

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Response body.
#[derive(Debug)]
pub enum Body {
    Empty,
    Bytes(Vec<u8>),
    /// Streamed from upstream; dropping it abandons the transfer.
    Stream(ResponseBody),
}

/// A response ready to be written by the runtime glue.
#[derive(Debug)]
pub struct EdgeResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Body,
}

impl EdgeResponse {
    /// A response with the CORS headers and no body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: CORS_HEADERS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: Body::Empty,
        }
    }

    /// Preflight answer.
    pub fn preflight() -> Self {
        Self::new(StatusCode::NO_CONTENT)
    }

    /// A JSON body.
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Self, ServeError> {
        let bytes = serde_json::to_vec(value).map_err(|e| ServeError::Internal(e.to_string()))?;
        Ok(Self::new(status)
            .header("Content-Type", JSON_CONTENT_TYPE)
            .with_body(Body::Bytes(bytes)))
    }

    /// The JSON error envelope for `error`.
    pub fn error(error: &ServeError) -> Self {
        let body = error.body();
        let bytes = serde_json::to_vec(&body).unwrap_or_else(|_| fallback_error_bytes(&body));

        let mut response = Self::new(error.status_code())
            .header("Content-Type", JSON_CONTENT_TYPE)
            .header("Cache-Control", "no-store")
            .with_body(Body::Bytes(bytes));
        if matches!(error, ServeError::MethodNotAllowed) {
            response = response.header("Allow", "GET, HEAD, OPTIONS");
        }
        response
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Drop the body, keeping every header (HEAD).
    pub fn without_body(self) -> Self {
        self.with_body(Body::Empty)
    }

    /// Get a header value by name (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Buffered body bytes, empty for streams.
    pub fn body_bytes(&self) -> &[u8] {
        match &self.body {
            Body::Bytes(bytes) => bytes.as_slice(),
            Body::Empty | Body::Stream(_) => &[],
        }
    }
}

fn fallback_error_bytes(body: &ErrorBody) -> Vec<u8> {
    serde_json::json!({ "error": body.error }).to_string().into_bytes()
}
