//! Response assembly
//!
//! Every reply is plain: gzipped JavaScript on success, a redirect to the
//! canonical version, an empty CORS preflight answer, or a one-line
//! text error.

use crate::error::{PackdError, PackdResult};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_MAX_AGE,
    CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LOCATION,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use sha2::{Digest, Sha256};

pub const JAVASCRIPT: &str = "application/javascript; charset=utf-8";
const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

/// Strong ETag over the served bytes: `"<len hex>-<digest prefix>"`
pub fn etag(body: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(body));
    format!("\"{:x}-{}\"", body.len(), &digest[..27])
}

/// 200 with a gzipped bundle. `extra` may override the defaults; the
/// ETag always describes the bytes actually sent.
pub fn bundle(zipped: Bytes, extra: &HeaderMap) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_LENGTH, HeaderValue::from(zipped.len()));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JAVASCRIPT));
    headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    for (name, value) in extra {
        headers.insert(name.clone(), value.clone());
    }
    if let Ok(tag) = HeaderValue::from_str(&etag(&zipped)) {
        headers.insert(ETAG, tag);
    }

    (StatusCode::OK, headers, zipped).into_response()
}

/// 302 to the canonical URL of a concrete version
pub fn redirect(location: &str) -> PackdResult<Response> {
    let value = HeaderValue::from_str(location)
        .map_err(|_| PackdError::parse(location, "not representable as a Location header"))?;
    Ok((StatusCode::FOUND, [(LOCATION, value)]).into_response())
}

/// 204 answer to a CORS preflight
pub fn preflight() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (ACCESS_CONTROL_ALLOW_METHODS, "GET"),
            (ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
            (ACCESS_CONTROL_MAX_AGE, "3600"),
        ],
    )
        .into_response()
}

/// Error status with the first line of the error as body
pub fn error(err: &PackdError) -> Response {
    let message = err.to_string();
    let line = message.lines().next().unwrap_or_default().to_string();
    (
        err.status_code(),
        [(CONTENT_TYPE, HeaderValue::from_static(PLAIN_TEXT))],
        line,
    )
        .into_response()
}
