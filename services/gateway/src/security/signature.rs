//! `t=<unix-ms>,v1=<hex>` webhook signatures over `"{t}.{body}"`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default freshness window for inbound signatures.
pub const DEFAULT_MAX_AGE_MS: i64 = 5 * 60 * 1000;
/// How far ahead of our clock a sender's timestamp may be.
pub const MAX_CLOCK_SKEW_MS: i64 = 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,
    #[error("invalid signature format")]
    Malformed,
    #[error("signature expired")]
    Expired,
    #[error("invalid signature")]
    Mismatch,
}

#[derive(Debug, PartialEq, Eq)]
struct ParsedHeader<'a> {
    timestamp_ms: i64,
    digest_hex: &'a str,
}

fn mac_for(secret: &str, timestamp_ms: i64, body: &[u8]) -> HmacSha256 {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("hmac keys have no length limit"),
    };
    mac.update(timestamp_ms.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    mac
}

/// Hex HMAC-SHA256 of `"{timestamp_ms}.{body}"`.
pub fn sign(secret: &str, timestamp_ms: i64, body: &[u8]) -> String {
    hex::encode(mac_for(secret, timestamp_ms, body).finalize().into_bytes())
}

/// Full header value for an outbound call.
pub fn signature_header(secret: &str, timestamp_ms: i64, body: &[u8]) -> String {
    format!("t={timestamp_ms},v1={}", sign(secret, timestamp_ms, body))
}

fn parse(header: &str) -> Result<ParsedHeader<'_>, SignatureError> {
    let mut timestamp = None;
    let mut digest = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) if !v.is_empty() => digest = Some(v),
            _ => {}
        }
    }
    match (timestamp, digest) {
        (Some(timestamp_ms), Some(digest_hex)) => Ok(ParsedHeader {
            timestamp_ms,
            digest_hex,
        }),
        _ => Err(SignatureError::Malformed),
    }
}

/// Verify an inbound signature header against `body`.
///
/// Checks run in order: presence, format, freshness, then a constant-time
/// digest comparison. A signature is expired when `now_ms - t > max_age_ms`
/// or when `t` is more than [`MAX_CLOCK_SKEW_MS`] in the future.
pub fn verify(
    header: Option<&str>,
    body: &[u8],
    secret: &str,
    now_ms: i64,
    max_age_ms: i64,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;
    let parsed = parse(header)?;
    let age_ms = now_ms
        .checked_sub(parsed.timestamp_ms)
        .ok_or(SignatureError::Expired)?;
    if age_ms > max_age_ms || age_ms < -MAX_CLOCK_SKEW_MS {
        return Err(SignatureError::Expired);
    }
    let provided = hex::decode(parsed.digest_hex).map_err(|_| SignatureError::Mismatch)?;
    mac_for(secret, parsed.timestamp_ms, body)
        .verify_slice(&provided)
        .map_err(|_| SignatureError::Mismatch)
}
