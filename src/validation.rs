//! Endpoint URL validation and SSRF protection.
//!
//! Subscription URLs are operator-supplied and dialed from inside the
//! network, so they are checked against private/internal address ranges and
//! restricted hostnames before being accepted into the registry.

use std::net::IpAddr;

use crate::error::WebhookError;

/// Validate a subscription endpoint URL.
///
/// Requires HTTPS (HTTP only when `allow_http` is set for development) and a
/// host that is not a private or internal address.
pub fn validate_endpoint_url(url: &str, allow_http: bool) -> Result<(), WebhookError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| WebhookError::InvalidUrl(format!("Invalid URL format: {e}")))?;

    match parsed.scheme() {
        "https" => {}
        "http" if allow_http => {}
        "http" => {
            return Err(WebhookError::InvalidUrl(
                "Endpoint URLs must use HTTPS".to_string(),
            ));
        }
        scheme => {
            return Err(WebhookError::InvalidUrl(format!(
                "Unsupported URL scheme: {scheme}"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| WebhookError::InvalidUrl("URL must have a host".to_string()))?;

    validate_host_not_internal(host)
}

/// Reject hosts that resolve into private/internal space: loopback, RFC 1918
/// ranges, link-local (cloud metadata), CGNAT, and well-known internal names.
pub fn validate_host_not_internal(host: &str) -> Result<(), WebhookError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_internal_ip(&ip) {
            return Err(WebhookError::SsrfDetected(format!(
                "Destination host {host} is a private/internal address"
            )));
        }
    }

    let lower = host.to_ascii_lowercase();
    if lower == "localhost"
        || lower == "metadata.google.internal"
        || lower.ends_with(".internal")
        || lower.ends_with(".local")
    {
        return Err(WebhookError::SsrfDetected(format!(
            "Destination host {host} is a restricted internal hostname"
        )));
    }

    Ok(())
}

fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (CGNAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_https_url() {
        assert!(validate_endpoint_url("https://hooks.example.org/donations", false).is_ok());
        assert!(validate_endpoint_url("https://hooks.example.org:8443/cb", false).is_ok());
    }

    #[test]
    fn test_http_requires_dev_override() {
        assert!(validate_endpoint_url("http://hooks.example.org/cb", false).is_err());
        assert!(validate_endpoint_url("http://hooks.example.org/cb", true).is_ok());
    }

    #[test]
    fn test_rejects_malformed_and_other_schemes() {
        assert!(validate_endpoint_url("not-a-url", false).is_err());
        assert!(validate_endpoint_url("ftp://example.org/cb", false).is_err());
    }

    #[test]
    fn test_blocks_loopback_and_private_ranges() {
        for host in ["127.0.0.1", "10.1.2.3", "172.16.0.9", "192.168.1.1"] {
            assert!(validate_host_not_internal(host).is_err(), "{host}");
        }
    }

    #[test]
    fn test_blocks_link_local_metadata_endpoint() {
        assert!(validate_host_not_internal("169.254.169.254").is_err());
    }

    #[test]
    fn test_blocks_cgnat_range() {
        assert!(validate_host_not_internal("100.64.0.1").is_err());
        assert!(validate_host_not_internal("100.127.255.255").is_err());
    }

    #[test]
    fn test_blocks_ipv6_loopback_and_unspecified() {
        assert!(validate_host_not_internal("::1").is_err());
        assert!(validate_host_not_internal("::").is_err());
    }

    #[test]
    fn test_blocks_internal_hostnames() {
        for host in ["localhost", "LOCALHOST", "metadata.google.internal", "db.internal", "nas.local"] {
            assert!(validate_host_not_internal(host).is_err(), "{host}");
        }
    }

    #[test]
    fn test_allows_public_destinations() {
        assert!(validate_host_not_internal("8.8.8.8").is_ok());
        assert!(validate_host_not_internal("hooks.example.org").is_ok());
    }

    #[test]
    fn test_url_level_ssrf_classification() {
        let err = validate_endpoint_url("https://10.0.0.1/cb", false).unwrap_err();
        assert!(matches!(err, WebhookError::SsrfDetected(_)));
    }
}
