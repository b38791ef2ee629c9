use axum::{
    http::{header, HeaderMap},
    response::IntoResponse,
};
use bytes::Bytes;

use crate::context::RequestScope;

/// Returns the request body as is, tagging the log entry with its size and
/// media type.
pub async fn echo(scope: RequestScope, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    scope.add_debug_value(format!("bytes={}", body.len()));
    scope.add_debug_value(format!("type={}", content_type));

    ([(header::CONTENT_TYPE, content_type)], body)
}
