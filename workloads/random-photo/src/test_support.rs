//! Shared fixtures for unit tests.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use edge_sdk::edge_core::RequestId;
use edge_sdk::edge_data::{FetchError, HttpClient, InboundResponse, OutboundRequest, ResponseBody};
use edge_sdk::edge_observability::{LogFormat, LogLevel, LogOutput, StructuredLogger};

use crate::config::Config;
use crate::media::{MediaId, MediaItem};

pub const API_BASE: &str = "https://api.test";
pub const COLLECTION_ID: &str = "abc123";

pub fn collection_url(per_page: u32) -> String {
    format!("{}/v1/collections/{}?per_page={}", API_BASE, COLLECTION_ID, per_page)
}

enum Reply {
    Canned {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
    Fail(String),
}

/// Transport that records every request and answers by URL prefix.
///
/// Body chunks are recorded as they are pulled, so tests can tell a body
/// that was dropped unread from one that was streamed.
#[derive(Default)]
pub struct StubTransport {
    routes: Vec<(String, Reply)>,
    requests: RefCell<Vec<OutboundRequest>>,
    pulls: Rc<RefCell<Vec<String>>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url_prefix: &str, status: u16, headers: &[(&str, &str)], body: &[u8]) -> Self {
        self.routes.push((
            url_prefix.to_string(),
            Reply::Canned {
                status,
                headers: headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                body: body.to_vec(),
            },
        ));
        self
    }

    pub fn fail(mut self, url_prefix: &str, reason: &str) -> Self {
        self.routes
            .push((url_prefix.to_string(), Reply::Fail(reason.to_string())));
        self
    }

    pub fn requests(&self) -> Ref<'_, Vec<OutboundRequest>> {
        self.requests.borrow()
    }

    /// Number of requests whose URL starts with `prefix`.
    pub fn calls_to(&self, prefix: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.url.starts_with(prefix))
            .count()
    }

    /// Number of body chunks read from responses whose URL starts with `prefix`.
    pub fn chunks_pulled_from(&self, prefix: &str) -> usize {
        self.pulls
            .borrow()
            .iter()
            .filter(|url| url.starts_with(prefix))
            .count()
    }

    fn body(&self, url: &str, bytes: &[u8]) -> ResponseBody {
        let chunks = if bytes.is_empty() {
            Vec::new()
        } else {
            vec![Ok(bytes.to_vec())]
        };
        let pulls = self.pulls.clone();
        let url = url.to_string();
        ResponseBody::from_stream(
            stream::iter(chunks).inspect(move |_| pulls.borrow_mut().push(url.clone())),
        )
    }
}

#[async_trait(?Send)]
impl HttpClient for StubTransport {
    async fn send(&self, request: OutboundRequest) -> Result<InboundResponse, FetchError> {
        let url = request.url.clone();
        self.requests.borrow_mut().push(request);

        match self.routes.iter().find(|(prefix, _)| url.starts_with(prefix.as_str())) {
            Some((_, Reply::Canned { status, headers, body })) => Ok(InboundResponse::new(
                *status,
                headers.clone(),
                self.body(&url, body),
            )),
            Some((_, Reply::Fail(reason))) => Err(FetchError::Request(reason.clone())),
            None => Err(FetchError::Request(format!("no route for {}", url))),
        }
    }
}

pub fn photo(id: u64, tiers: &[&str]) -> MediaItem {
    media(id, "Photo", tiers)
}

pub fn video(id: u64) -> MediaItem {
    media(id, "Video", &[])
}

fn media(id: u64, kind: &str, tiers: &[&str]) -> MediaItem {
    MediaItem {
        id: MediaId::Number(id),
        kind: Some(kind.to_string()),
        src: tiers
            .iter()
            .map(|t| (t.to_string(), image_url(id, t)))
            .collect(),
        extra: Default::default(),
    }
}

pub fn image_url(id: u64, tier: &str) -> String {
    format!("https://images.test/{}/{}.jpeg", id, tier)
}

/// Upstream collection payload.
pub fn collection_body(items: &[MediaItem]) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": COLLECTION_ID,
        "page": 1,
        "per_page": items.len(),
        "total_results": items.len(),
        "media": items,
    }))
    .unwrap()
}

pub fn vars(extra: &[(&str, &str)]) -> HashMap<String, String> {
    let mut vars: HashMap<String, String> = [
        ("PEXELS_API_KEY", "test-key"),
        ("PEXELS_COLLECTION_ID", COLLECTION_ID),
        ("PEXELS_API_BASE", API_BASE),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    vars
}

pub fn config(extra: &[(&str, &str)]) -> Config {
    Config::load(&vars(extra)).unwrap()
}

/// A debug-level logger writing into memory.
pub fn logger() -> (StructuredLogger, Rc<RefCell<Vec<String>>>) {
    let (output, lines) = LogOutput::capture();
    let logger = StructuredLogger::new(RequestId::from_string("test-request"))
        .with_workload("random-photo")
        .with_min_level(LogLevel::Debug)
        .with_format(LogFormat::Json)
        .with_output(output);
    (logger, lines)
}

/// Whether any captured line has `message`.
pub fn logged(lines: &Rc<RefCell<Vec<String>>>, message: &str) -> bool {
    lines.borrow().iter().any(|line| {
        serde_json::from_str::<serde_json::Value>(line)
            .map(|v| v["message"] == message)
            .unwrap_or(false)
    })
}
