//! What the audit log keeps, and what gets forwarded.

use std::collections::BTreeMap;

use crate::domain::types::{BODY_CAPTURE_LIMIT, MASKED_VALUE, SIGNATURE_HEADER};

/// Never stored, never forwarded.
const DROPPED_HEADERS: &[&str] = &["cookie", SIGNATURE_HEADER];

/// Recomputed by the HTTP client for the outbound call.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "proxy-connection",
];

/// Headers as persisted: dropped headers removed, secure headers masked.
/// Repeated headers are joined with `, `.
pub fn capture_headers(
    headers: &[(String, String)],
    secure_headers: &[String],
) -> BTreeMap<String, String> {
    let mut captured: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        if DROPPED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        let value = if secure_headers.iter().any(|s| s.eq_ignore_ascii_case(&name)) {
            MASKED_VALUE.to_owned()
        } else {
            value.clone()
        };
        captured
            .entry(name)
            .and_modify(|existing| {
                if existing != MASKED_VALUE {
                    existing.push_str(", ");
                    existing.push_str(&value);
                }
            })
            .or_insert(value);
    }
    captured
}

/// Headers passed through to destinations, with real values.
pub fn forwardable_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.to_ascii_lowercase();
            !DROPPED_HEADERS.contains(&name.as_str())
                && !HOP_BY_HOP_HEADERS.contains(&name.as_str())
        })
        .cloned()
        .collect()
}

/// Text copy of a raw body for the audit log. Invalid UTF-8 is replaced,
/// and the result is cut like [`truncate_body`].
pub fn capture_body(body: &[u8]) -> String {
    truncate_body(&String::from_utf8_lossy(body))
}

/// Cut `body` to at most [`BODY_CAPTURE_LIMIT`] bytes on a char boundary.
pub fn truncate_body(body: &str) -> String {
    if body.len() <= BODY_CAPTURE_LIMIT {
        return body.to_owned();
    }
    let mut end = BODY_CAPTURE_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_owned()
}
