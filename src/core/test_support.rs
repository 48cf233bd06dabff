//! In-process HTTP origin for tests: HEAD, byte ranges, redirects, flaky
//! and slow routes, with per-path request counters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use sha1::{Digest, Sha1};

#[derive(Clone)]
pub struct Served {
    pub body: Bytes,
    /// Answer `Range` requests with 206.
    pub ranges: bool,
    /// Send `Content-Length` (otherwise the body is streamed chunked).
    pub content_length: bool,
    /// Pause between 1 KiB pieces of the body.
    pub delay: Option<Duration>,
    pub redirect_to: Option<String>,
}

impl Served {
    pub fn file(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ranges: true,
            content_length: true,
            delay: None,
            redirect_to: None,
        }
    }
}

#[derive(Default)]
struct OriginInner {
    routes: HashMap<String, Served>,
    head_failures: HashMap<String, u32>,
    body_gets: HashMap<String, u32>,
}

#[derive(Clone, Default)]
struct OriginState(Arc<Mutex<OriginInner>>);

pub struct TestOrigin {
    pub base: String,
    state: OriginState,
}

impl TestOrigin {
    pub async fn start() -> Self {
        let state = OriginState::default();
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            base: format!("http://{addr}"),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn serve(&self, path: &str, body: impl Into<Bytes>) {
        self.serve_with(path, Served::file(body));
    }

    pub fn serve_with(&self, path: &str, served: Served) {
        self.state
            .0
            .lock()
            .unwrap()
            .routes
            .insert(path.to_string(), served);
    }

    pub fn redirect(&self, from: &str, to: &str) {
        let mut served = Served::file(Bytes::new());
        served.redirect_to = Some(to.to_string());
        self.serve_with(from, served);
    }

    /// Answer the next `n` HEAD probes for `path` with 500.
    pub fn fail_next_probes(&self, path: &str, n: u32) {
        self.state
            .0
            .lock()
            .unwrap()
            .head_failures
            .insert(path.to_string(), n);
    }

    /// GET requests for `path`, excluding the one-byte range probe.
    pub fn body_gets(&self, path: &str) -> u32 {
        self.state
            .0
            .lock()
            .unwrap()
            .body_gets
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_body_gets(&self) -> u32 {
        self.state.0.lock().unwrap().body_gets.values().sum()
    }
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Deterministic, non-repeating-looking payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

fn parse_range(headers: &HeaderMap, total: u64) -> Option<(u64, u64)> {
    let raw = headers.get(header::RANGE)?.to_str().ok()?;
    let spec = raw.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end: u64 = if end.is_empty() {
        total.checked_sub(1)?
    } else {
        end.parse().ok()?
    };
    (start <= end && start < total).then(|| (start, end.min(total - 1)))
}

fn body_for(bytes: Bytes, delay: Option<Duration>, streamed: bool) -> Body {
    if delay.is_none() && !streamed {
        return Body::from(bytes);
    }
    let pieces: Vec<Bytes> = bytes.chunks(1024).map(Bytes::copy_from_slice).collect();
    let stream = futures_util::stream::unfold(pieces.into_iter(), move |mut rest| async move {
        let next = rest.next()?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Some((Ok::<_, std::io::Error>(next), rest))
    });
    Body::from_stream(stream)
}

async fn handle(
    State(state): State<OriginState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let path = uri.path().to_string();
    let served = {
        let mut inner = state.0.lock().unwrap();
        if method == Method::HEAD {
            if let Some(left) = inner.head_failures.get_mut(&path) {
                if *left > 0 {
                    *left -= 1;
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            }
        }
        let Some(served) = inner.routes.get(&path).cloned() else {
            return StatusCode::NOT_FOUND.into_response();
        };
        let is_probe = headers
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "bytes=0-0")
            .unwrap_or(false);
        if method == Method::GET && !is_probe && served.redirect_to.is_none() {
            *inner.body_gets.entry(path.clone()).or_insert(0) += 1;
        }
        served
    };

    if let Some(to) = served.redirect_to {
        return (StatusCode::FOUND, [(header::LOCATION, to)]).into_response();
    }

    let total = served.body.len() as u64;
    let range = if served.ranges {
        parse_range(&headers, total)
    } else {
        None
    };

    let (status, bytes, content_range) = match range {
        Some((start, end)) => (
            StatusCode::PARTIAL_CONTENT,
            served.body.slice(start as usize..=end as usize),
            Some(format!("bytes {start}-{end}/{total}")),
        ),
        None => (StatusCode::OK, served.body.clone(), None),
    };

    let mut builder = Response::builder().status(status);
    if served.ranges {
        builder = builder.header(header::ACCEPT_RANGES, "bytes");
    }
    if let Some(content_range) = content_range {
        builder = builder.header(header::CONTENT_RANGE, content_range);
    }
    if served.content_length {
        builder = builder.header(header::CONTENT_LENGTH, bytes.len());
    }

    // An exact empty body would make the router add `Content-Length: 0`.
    let body = if method == Method::HEAD {
        body_for(Bytes::new(), None, !served.content_length)
    } else {
        body_for(bytes, served.delay, !served.content_length)
    };
    builder.body(body).unwrap()
}
