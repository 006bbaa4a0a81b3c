//! Spin HTTP component entry point.

use std::rc::Rc;

use anyhow::anyhow;
use edge_sdk::edge_cache::{SharedBackend, SpinKvBackend};
use edge_sdk::edge_core::{Method, RequestContext};
use edge_sdk::edge_data::SpinHttpClient;
use edge_sdk::edge_observability::StructuredLogger;
use edge_sdk::edge_streaming::{StreamError, StreamingSink};
use spin_sdk::http::{Fields, IncomingRequest, Method as SpinMethod, OutgoingResponse, ResponseOutparam};
use spin_sdk::http_component;

use crate::config::{Config, LogSettings, SpinVariables};
use crate::error::ServeError;
use crate::handler::{fetch_client, Handled, Handler};
use crate::response::{Body, EdgeResponse};
use crate::WORKLOAD;

/// Main HTTP handler.
#[http_component]
async fn handle(req: IncomingRequest, response_out: ResponseOutparam) {
    let method = to_http_method(req.method());
    let path_with_query = req.path_with_query().unwrap_or_default();
    let headers = req
        .headers()
        .entries()
        .into_iter()
        .map(|(name, value)| (name, String::from_utf8_lossy(&value).into_owned()));

    let variables = SpinVariables;
    let log_settings = LogSettings::load(&variables);

    let Some(method) = method else {
        let logger = StructuredLogger::new(edge_sdk::edge_core::RequestId::generate())
            .with_workload(WORKLOAD)
            .with_min_level(log_settings.level)
            .with_format(log_settings.format);
        logger.warn("unrecognised request method");
        let ctx = RequestContext::from_path_with_query(Method::GET, &path_with_query);
        let response = EdgeResponse::error(&ServeError::MethodNotAllowed);
        if let Err(e) = write_response(response, response_out, &ctx, &logger).await {
            logger.error_builder("response write failed").field_display("error", e).emit();
        }
        return;
    };

    let ctx = RequestContext::from_path_with_query(method, &path_with_query).with_headers(headers);
    let logger = StructuredLogger::new(ctx.request_id.clone())
        .with_workload(WORKLOAD)
        .with_route(&ctx.path)
        .with_min_level(log_settings.level)
        .with_format(log_settings.format);

    // No key-value binding means no cache layer, not an error.
    let store: Option<SharedBackend> = match SpinKvBackend::open_default() {
        Ok(store) => Some(Rc::new(store)),
        Err(e) => {
            logger
                .warn_builder("key-value store unavailable")
                .field_display("error", e)
                .emit();
            None
        }
    };

    let config = Config::load(&variables);
    let client = fetch_client(SpinHttpClient, store.clone());
    let handler = Handler::new(&config, &client, store, &logger);

    let Handled {
        response,
        pending_write,
    } = handler.handle(&ctx, &mut rand::thread_rng()).await;

    if let Err(e) = write_response(response, response_out, &ctx, &logger).await {
        logger
            .error_builder("response write failed")
            .field_display("error", e)
            .emit();
    }

    // Issued after the response so the client never waits on it.
    if let Some(write) = pending_write {
        let key = write.key().as_str().to_string();
        match write.commit().await {
            Ok(()) => logger.debug_builder("collection cached").field("key", key).emit(),
            Err(e) => logger
                .warn_builder("collection cache write failed")
                .field("key", key)
                .field_display("error", e)
                .emit(),
        }
    }
}

/// Send head and body. A client that disconnects mid-stream ends the upstream
/// transfer as well.
async fn write_response(
    response: EdgeResponse,
    response_out: ResponseOutparam,
    ctx: &RequestContext,
    logger: &StructuredLogger,
) -> anyhow::Result<()> {
    let header_list: Vec<(String, Vec<u8>)> = response
        .headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.clone().into_bytes()))
        .collect();
    let headers = Fields::from_list(&header_list).map_err(|e| anyhow!("invalid headers: {:?}", e))?;

    let outgoing = OutgoingResponse::new(headers);
    outgoing
        .set_status_code(response.status.as_u16())
        .map_err(|_| anyhow!("invalid status {}", response.status))?;

    let body = outgoing.take_body();
    response_out.set(outgoing);

    let mut sink = StreamingSink::new(body, ctx.timing.clone());

    match response.body {
        Body::Empty => {}
        Body::Bytes(bytes) => sink.send_chunk(bytes).await?,
        Body::Stream(stream) => match sink.forward(stream).await {
            Ok(bytes) => {
                let mut entry = logger
                    .debug_builder("image streamed")
                    .field_u64("bytes", bytes)
                    .field_u64("chunks", sink.chunks_sent());
                if let Some(first_byte) = sink.timing().since_start("first_byte") {
                    entry = entry.duration_ms("first_byte_ms", first_byte);
                }
                entry.emit();
            }
            Err(StreamError::ClientGone(reason)) => {
                logger
                    .warn_builder("client disconnected")
                    .field("reason", reason)
                    .field_u64("bytes", sink.bytes_sent())
                    .emit();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        },
    }

    sink.complete().await?;
    Ok(())
}

fn to_http_method(method: SpinMethod) -> Option<Method> {
    let method = match method {
        SpinMethod::Get => Method::GET,
        SpinMethod::Head => Method::HEAD,
        SpinMethod::Post => Method::POST,
        SpinMethod::Put => Method::PUT,
        SpinMethod::Delete => Method::DELETE,
        SpinMethod::Connect => Method::CONNECT,
        SpinMethod::Options => Method::OPTIONS,
        SpinMethod::Trace => Method::TRACE,
        SpinMethod::Patch => Method::PATCH,
        SpinMethod::Other(other) => return Method::from_bytes(other.as_bytes()).ok(),
    };
    Some(method)
}
