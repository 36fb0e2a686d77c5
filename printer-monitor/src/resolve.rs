use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("'{0}' is neither an IPv4 address nor a valid hostname")]
    InvalidAddress(String),
    #[error("could not resolve an address for hostname '{host}': {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("hostname '{0}' has no IPv4 address")]
    NoIpv4(String),
}

/// Dotted-quad literals are used as is, anything else goes through DNS.
pub async fn resolve_ipv4(address: &str) -> Result<Ipv4Addr, ResolveError> {
    let address = address.trim();
    if let Ok(ip) = address.parse::<Ipv4Addr>() {
        return Ok(ip);
    }
    if !is_hostname(address) {
        return Err(ResolveError::InvalidAddress(address.to_string()));
    }

    debug!(host = %address, "resolving hostname");
    let addrs = tokio::net::lookup_host((address, 0))
        .await
        .map_err(|source| ResolveError::Lookup {
            host: address.to_string(),
            source,
        })?;

    for addr in addrs {
        if let IpAddr::V4(ip) = addr.ip() {
            debug!(host = %address, %ip, "hostname resolved");
            return Ok(ip);
        }
    }
    Err(ResolveError::NoIpv4(address.to_string()))
}

/// RFC 1123 labels: alphanumerics and inner hyphens, dot separated.
fn is_hostname(host: &str) -> bool {
    !host.is_empty()
        && host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
                && !label.starts_with('-')
                && !label.ends_with('-')
        })
}
