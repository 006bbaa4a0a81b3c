//! Spin outbound HTTP transport.

use async_trait::async_trait;
use futures::StreamExt;
use spin_sdk::http::{IncomingResponse, Method as SpinMethod, Request};

use crate::client::{FetchError, HttpClient};
use crate::message::{InboundResponse, OutboundRequest, ResponseBody};

/// Transport over Spin's outbound HTTP.
///
/// The body is streamed; dropping it before the end abandons the upstream
/// transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpinHttpClient;

#[async_trait(?Send)]
impl HttpClient for SpinHttpClient {
    async fn send(&self, request: OutboundRequest) -> Result<InboundResponse, FetchError> {
        let mut builder = Request::builder();
        builder
            .method(to_spin_method(&request.method))
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder.header(name.as_str(), value.as_str());
        }

        let response: IncomingResponse = spin_sdk::http::send(builder.build())
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        let headers = response
            .headers()
            .entries()
            .into_iter()
            .map(|(name, value)| (name, String::from_utf8_lossy(&value).into_owned()))
            .collect();

        // The response handle must outlive its body stream.
        let chunks = Box::pin(response.take_body_stream());
        let body = futures::stream::unfold((response, chunks), |(response, mut chunks)| async move {
            let chunk = chunks.next().await?;
            let chunk = chunk.map_err(|e| FetchError::Body(format!("{:?}", e)));
            Some((chunk, (response, chunks)))
        });

        Ok(InboundResponse::new(status, headers, ResponseBody::from_stream(body)))
    }
}

fn to_spin_method(method: &http::Method) -> SpinMethod {
    match method.as_str() {
        "GET" => SpinMethod::Get,
        "HEAD" => SpinMethod::Head,
        "POST" => SpinMethod::Post,
        "PUT" => SpinMethod::Put,
        "DELETE" => SpinMethod::Delete,
        "PATCH" => SpinMethod::Patch,
        "OPTIONS" => SpinMethod::Options,
        "TRACE" => SpinMethod::Trace,
        "CONNECT" => SpinMethod::Connect,
        other => SpinMethod::Other(other.to_string()),
    }
}
