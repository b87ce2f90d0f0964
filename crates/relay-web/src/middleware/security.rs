//! Access-key check for invocation routes
//!
//! When `ACCESS_KEY_HASH` is set, callers present the key in `x-access-key`
//! or as a bearer token; its lower-hex SHA-256 digest must match. Without a
//! configured hash every request passes.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use relay_core::InvocationId;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::SharedContext;

const ACCESS_KEY_HEADER: &str = "x-access-key";

fn extract_access_key(headers: &HeaderMap) -> Option<String> {
    if let Some(raw) = headers.get(ACCESS_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        let key = raw.trim();
        if !key.is_empty() {
            return Some(key.to_string());
        }
    }

    if let Some(raw) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        let trimmed = raw.trim();
        if let Some(bearer) = trimmed.strip_prefix("Bearer ") {
            let key = bearer.trim();
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }
    }

    None
}

/// Lower-hex SHA-256 of `key`
pub fn hash_access_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

/// Compare without short-circuiting on the first differing byte
fn digests_match(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

/// Reject requests without a valid access key (401, error envelope)
pub async fn require_access_key(
    State(ctx): State<SharedContext>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ref expected) = ctx.config.access_key_hash else {
        return next.run(request).await;
    };

    match extract_access_key(request.headers()) {
        Some(key) if digests_match(&hash_access_key(&key), expected) => {
            debug!("Access key accepted for {}", request.uri().path());
            next.run(request).await
        }
        presented => {
            warn!(
                "Rejected {} ({})",
                request.uri().path(),
                if presented.is_some() {
                    "invalid access key"
                } else {
                    "missing access key"
                }
            );
            ApiError::with_status(
                StatusCode::UNAUTHORIZED,
                InvocationId::new(),
                "Invalid or missing access key",
            )
            .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_hash_is_lower_hex_sha256() {
        assert_eq!(
            hash_access_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_extract_prefers_header_then_bearer() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_access_key(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer tok"));
        assert_eq!(extract_access_key(&headers).as_deref(), Some("tok"));

        headers.insert(ACCESS_KEY_HEADER, HeaderValue::from_static(" key "));
        assert_eq!(extract_access_key(&headers).as_deref(), Some("key"));
    }

    #[test]
    fn test_digests_match() {
        assert!(digests_match("abcd", "abcd"));
        assert!(!digests_match("abcd", "abce"));
        assert!(!digests_match("abc", "abcd"));
    }
}
