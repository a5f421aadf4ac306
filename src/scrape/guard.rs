use std::fmt;
use std::net::IpAddr;

use once_cell::sync::Lazy;
use regex::Regex;
use url::{Host, Url};

use crate::config::ScrapeConfig;
use crate::scrape::ScrapeError;

static SCHEME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[a-z][a-z0-9+.\-]*://").expect("Failed to compile scheme regex")
});

/// An absolute, validated URL whose host is not a loopback address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUrl(Url);

impl TargetUrl {
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// `<origin>/favicon.ico`
    pub fn favicon_url(&self) -> Url {
        let mut url = self.0.clone();
        url.set_path("/favicon.ico");
        url.set_query(None);
        url.set_fragment(None);
        url
    }
}

impl fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Normalizes a caller-supplied URL and rejects loopback hosts.
///
/// A missing scheme defaults to `http://`. Only literal hosts are checked here,
/// see [`check_policy`] for the resolving variant.
pub fn validate(raw: &str) -> Result<TargetUrl, ScrapeError> {
    let mut raw_url = raw.trim();

    if let Some(stripped) = raw_url.strip_suffix('/') {
        raw_url = stripped;
    }

    let raw_url = if SCHEME_REGEX.is_match(raw_url) {
        raw_url.to_string()
    } else {
        format!("http://{raw_url}")
    };

    let parsed = Url::parse(&raw_url).map_err(|e| ScrapeError::InvalidUrl(format!("{raw_url}: {e}")))?;

    if parsed.host().is_none() {
        return Err(ScrapeError::InvalidUrl(format!("{raw_url}: missing host")));
    }

    ensure_not_localhost(&parsed)?;

    Ok(TargetUrl(parsed))
}

pub fn ensure_not_localhost(url: &Url) -> Result<(), ScrapeError> {
    if url.host().as_ref().is_some_and(is_localhost) {
        log::warn!("{url}: access to localhost not allowed");
        return Err(ScrapeError::LocalhostBlocked);
    }

    Ok(())
}

fn is_localhost(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => domain.trim_end_matches('.').eq_ignore_ascii_case("localhost"),
        Host::Ipv4(v4) => v4.is_loopback(),
        Host::Ipv6(v6) => v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback()),
    }
}

fn is_ip_private(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
                || v6.to_ipv4_mapped().is_some_and(|v4| is_ip_private(&IpAddr::V4(v4)))
        }
    }
}

async fn resolves_to_private(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(v4)) => is_ip_private(&IpAddr::V4(v4)),
        Some(Host::Ipv6(v6)) => is_ip_private(&IpAddr::V6(v6)),
        Some(Host::Domain(domain)) => {
            let port = url.port_or_known_default().unwrap_or(80);
            match tokio::net::lookup_host((domain, port)).await {
                Ok(mut addrs) => addrs.any(|addr| is_ip_private(&addr.ip())),
                Err(err) => {
                    log::debug!("{domain}: lookup failed: {err}");
                    false
                }
            }
        }
        None => false,
    }
}

fn check_scheme_and_host(url: &Url, config: &ScrapeConfig) -> Result<(), ScrapeError> {
    let scheme = url.scheme();
    if !config.allowed_schemes.iter().any(|s| s == scheme) {
        log::warn!("URL scheme '{scheme}' not allowed");
        return Err(ScrapeError::InvalidUrl(format!("scheme '{scheme}' not allowed")));
    }

    let host = url.host_str().unwrap_or_default();
    if config.blocked_hosts.iter().any(|h| h == host) {
        log::warn!("Host '{host}' is blocked");
        return Err(ScrapeError::BlockedHost(host.to_string()));
    }

    Ok(())
}

/// Applies the configured scheme, host and private-address policy.
pub async fn check_policy(url: &Url, config: &ScrapeConfig) -> Result<(), ScrapeError> {
    check_scheme_and_host(url, config)?;

    if config.block_private_ips && resolves_to_private(url).await {
        let host = url.host_str().unwrap_or_default();
        log::warn!("Host '{host}' resolves to private IP (blocked by SSRF policy)");
        return Err(ScrapeError::BlockedHost(host.to_string()));
    }

    Ok(())
}

/// Policy for a redirect hop. Runs inside the HTTP client, so it cannot
/// resolve names; private addresses are only caught when literal.
pub fn check_redirect(url: &Url, config: &ScrapeConfig) -> Result<(), ScrapeError> {
    ensure_not_localhost(url)?;
    check_scheme_and_host(url, config)?;

    let literal = match url.host() {
        Some(Host::Ipv4(v4)) => Some(IpAddr::V4(v4)),
        Some(Host::Ipv6(v6)) => Some(IpAddr::V6(v6)),
        _ => None,
    };

    if config.block_private_ips && literal.is_some_and(|ip| is_ip_private(&ip)) {
        let host = url.host_str().unwrap_or_default();
        log::warn!("redirect to private IP '{host}' blocked");
        return Err(ScrapeError::BlockedHost(host.to_string()));
    }

    Ok(())
}
