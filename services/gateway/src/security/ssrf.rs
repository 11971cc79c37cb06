//! Screening of destination URLs against private-network targets.

use std::net::{Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "metadata.google.internal",
    "metadata.goog",
    "metadata.aws",
    "instance-data",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlRejection {
    #[error("invalid url")]
    Invalid,
    #[error("only http and https urls are allowed")]
    Scheme,
    #[error("url has no host")]
    MissingHost,
    #[error("private or internal addresses are not allowed")]
    PrivateAddress,
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_v4(v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
}

/// Parse and screen a destination URL. Returns the parsed URL when allowed.
pub fn validate_destination_url(raw: &str) -> Result<Url, UrlRejection> {
    let url = Url::parse(raw).map_err(|_| UrlRejection::Invalid)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlRejection::Scheme);
    }
    let blocked = match url.host().ok_or(UrlRejection::MissingHost)? {
        Host::Ipv4(ip) => is_private_v4(ip),
        Host::Ipv6(ip) => is_private_v6(ip),
        Host::Domain(name) => {
            let name = name.trim_end_matches('.').to_ascii_lowercase();
            BLOCKED_HOSTNAMES.contains(&name.as_str()) || name.ends_with(".localhost")
        }
    };
    if blocked {
        return Err(UrlRejection::PrivateAddress);
    }
    Ok(url)
}

/// URL with credentials stripped, for logs.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.to_string()
        }
        Err(_) => "[invalid url]".to_owned(),
    }
}
