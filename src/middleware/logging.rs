use std::fmt::Write as _;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body::{Body as HttpBody, Frame, SizeHint};
use percent_encoding::percent_decode_str;
use tracing::warn;

use super::tee::{tap_request, tap_response};
use crate::{
    context::{ErrorType, RequestScope},
    format::{compact_json, summary_line, DEBUG_PREFIX},
    sink::{LogSink, MemorySink, StdoutSink},
};

pub const MIME_JSON: &str = "application/json";
pub const MIME_MULTIPART_FORM: &str = "multipart/form-data";

const USER_AGENT_EXTRAS: [&str; 4] = ["App-Version", "OS-Version", "Device", "User-Timezone"];

/// Access logger state handed to [`access_log_middleware`].
///
/// ```ignore
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(from_fn_with_state(AccessLogger::new(true), access_log_middleware));
/// ```
#[derive(Clone)]
pub struct AccessLogger {
    debug: bool,
    sink: Arc<dyn LogSink>,
}

impl AccessLogger {
    /// Logger writing to stdout. With `debug` set, every entry also carries
    /// the request body, the response body and the debug annotations.
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            sink: Arc::new(StdoutSink),
        }
    }

    pub fn with_sink(mut self, sink: impl LogSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug
    }
}

pub async fn access_log_middleware(
    State(logger): State<AccessLogger>,
    mut request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();

    let path = decoded_path(request.uri().path());
    let method = request.method().to_string();
    let client_ip = client_ip(&request);
    let content_type = content_type(request.headers()).to_string();
    let user_agent = user_agent_info(request.headers());
    let scope = RequestScope::of(&mut request);

    let request_body = MemorySink::new();
    if logger.debug {
        request = tap_request(request, request_body.clone());
    }

    let response = next.run(request).await;

    let entry = PendingEntry {
        sink: logger.sink.clone(),
        client_ip,
        end: Utc::now(),
        latency: start.elapsed(),
        status: response.status().as_u16(),
        method,
        path,
        scope,
        debug: None,
    };

    if !logger.debug {
        entry.emit();
        return response;
    }

    // the response body streams after this returns; the entry is written
    // once it has finished, failed or been dropped
    let response_body = MemorySink::new();
    let entry = PendingEntry {
        debug: Some(DebugCapture {
            content_type,
            user_agent,
            request_body,
            response_body: response_body.clone(),
        }),
        ..entry
    };
    tap_response(response, response_body)
        .map(|body| Body::new(LoggedBody { inner: body, entry: Some(entry) }))
}

struct DebugCapture {
    content_type: String,
    user_agent: String,
    request_body: MemorySink,
    response_body: MemorySink,
}

/// Everything needed to write one access log entry.
struct PendingEntry {
    sink: Arc<dyn LogSink>,
    client_ip: String,
    end: DateTime<Utc>,
    latency: Duration,
    status: u16,
    method: String,
    path: String,
    scope: RequestScope,
    debug: Option<DebugCapture>,
}

impl PendingEntry {
    fn render(&self) -> String {
        let mut entry = summary_line(
            &self.client_ip,
            self.end,
            self.status,
            &self.method,
            &self.path,
            self.latency,
        );

        if let Some(debug) = &self.debug {
            let mut body = debug.request_body.bytes();
            if debug.content_type == MIME_JSON {
                if let Ok(compacted) = compact_json(&body) {
                    body = compacted;
                }
            }

            if !debug.content_type.contains(MIME_MULTIPART_FORM) {
                let _ = writeln!(
                    entry,
                    "{}[{}]\n {}{}",
                    DEBUG_PREFIX,
                    debug.user_agent,
                    self.scope.format_debug_values(),
                    String::from_utf8_lossy(&body)
                );
            }
            let _ = writeln!(
                entry,
                "{} RESPONSE: {}",
                DEBUG_PREFIX,
                String::from_utf8_lossy(&debug.response_body.bytes())
            );
        }

        entry.push_str(&self.scope.errors().by_type(ErrorType::Private).to_string());
        entry
    }

    fn emit(self) {
        if let Err(e) = self.sink.write_entry(&self.render()) {
            warn!(error = %e, path = %self.path, "Failed to write access log entry");
        }
    }
}

/// Response body that writes the pending entry when the stream ends, fails,
/// or is dropped before reaching the end.
struct LoggedBody {
    inner: Body,
    entry: Option<PendingEntry>,
}

impl LoggedBody {
    fn finish(&mut self) {
        if let Some(entry) = self.entry.take() {
            entry.emit();
        }
    }
}

impl HttpBody for LoggedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));

        if matches!(frame, None | Some(Err(_))) {
            this.finish();
        }

        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for LoggedBody {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Request path with percent-escapes decoded, e.g. `/a%20b` becomes `/a b`.
pub fn decoded_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// peer address of the connection.
pub fn client_ip(request: &Request) -> String {
    let headers = request.headers();

    let forwarded = header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    if let Some(ip) = header_str(headers, "x-real-ip").map(str::trim).filter(|v| !v.is_empty()) {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

/// Media type of the request without parameters.
pub fn content_type(headers: &HeaderMap) -> &str {
    let raw = header_str(headers, header::CONTENT_TYPE.as_str()).unwrap_or("");
    raw.split(|c| c == ';' || c == ' ').next().unwrap_or("")
}

/// `User-Agent` followed by whichever client detail headers are present,
/// e.g. `okhttp/4.9 App-Version: '2.1.0' Device: 'Pixel 7'`.
pub fn user_agent_info(headers: &HeaderMap) -> String {
    let mut info = header_str(headers, header::USER_AGENT.as_str())
        .unwrap_or("")
        .to_string();

    for name in USER_AGENT_EXTRAS {
        if let Some(value) = header_str(headers, name).filter(|v| !v.is_empty()) {
            let _ = write!(info, " {}: '{}'", name, value);
        }
    }

    info
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
