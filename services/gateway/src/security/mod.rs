//! Pure request-authentication helpers: HMAC signatures, IPv4 allow-lists and
//! destination URL screening.

pub mod allow_list;
pub mod signature;
pub mod ssrf;

/// New flow signing secret: 32 random bytes, hex encoded.
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}
