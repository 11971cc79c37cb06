//! Signs requests the way a webhook provider would, independently of the
//! gateway's own verifier.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// `t=<ms>,v1=<hex hmac-sha256("{t}.{body}")>` for `secret`. The body may
/// be any bytes, text or not.
pub fn signature_header(secret: &str, timestamp_ms: i64, body: impl AsRef<[u8]>) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(format!("{timestamp_ms}.").as_bytes());
    mac.update(body.as_ref());
    let digest = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp_ms},v1={digest}")
}
