use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use url::Url;

use crate::config::{Config, ScrapeConfig};
use crate::scrape::{guard, ScrapeError};

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

/// Outbound HTTP used by the scraper. Errors are transport failures only;
/// non-success statuses come back as responses.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> anyhow::Result<HttpResponse>;

    async fn head(&self, url: &Url) -> anyhow::Result<StatusCode>;
}

fn get_error(error: &reqwest::Error) -> String {
    use std::error::Error;

    match error.source() {
        Some(e) => match e.source() {
            Some(e) => e.to_string(),
            None => e.to_string(),
        },
        None => error.to_string(),
    }
}

/// Decides whether the client may follow a redirect to `next` after `hops` redirects.
fn follow_redirect(next: &Url, hops: usize, config: &ScrapeConfig) -> Result<(), ScrapeError> {
    if hops >= MAX_REDIRECTS {
        return Err(ScrapeError::Fetch {
            url: next.to_string(),
            reason: "too many redirects".to_string(),
        });
    }

    guard::check_redirect(next, config)
}

fn redirect_policy(config: ScrapeConfig) -> Policy {
    Policy::custom(move |attempt| {
        match follow_redirect(attempt.url(), attempt.previous().len(), &config) {
            Ok(()) => attempt.follow(),
            Err(err) => {
                log::warn!("{}: redirect refused: {err}", attempt.url());
                attempt.error(err)
            }
        }
    })
}

fn append_capped(body: &mut Vec<u8>, chunk: &[u8], limit: usize) -> anyhow::Result<()> {
    if body.len() + chunk.len() > limit {
        bail!("response body exceeds {limit} bytes");
    }
    body.extend_from_slice(chunk);
    Ok(())
}

pub struct ReqwestTransport {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl ReqwestTransport {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(config.scrape.accept_invalid_certs)
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(10))
            .redirect(redirect_policy(config.scrape.clone()))
            .build()?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url) -> anyhow::Result<HttpResponse> {
        log::debug!("{url}: requesting");

        let mut resp = self.client.get(url.clone()).send().await.map_err(|err| {
            log::debug!("{url}: {err}: {:#?}", get_error(&err));
            anyhow::anyhow!(get_error(&err))
        })?;

        let status = resp.status();
        if !status.is_success() {
            log::debug!("{url}: {}", status);
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if resp.content_length().is_some_and(|len| len > self.max_body_bytes as u64) {
            bail!("response body exceeds {} bytes", self.max_body_bytes);
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|err| anyhow::anyhow!(get_error(&err)))? {
            append_capped(&mut body, &chunk, self.max_body_bytes)?;
        }
        let body = String::from_utf8_lossy(&body).into_owned();

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }

    async fn head(&self, url: &Url) -> anyhow::Result<StatusCode> {
        log::debug!("{url}: HEAD");

        let resp = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|err| anyhow::anyhow!(get_error(&err)))?;

        Ok(resp.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn test_redirect_to_public_host_is_followed() {
        let config = ScrapeConfig::default();
        assert!(follow_redirect(&url("https://www.example.com/"), 0, &config).is_ok());
        assert!(follow_redirect(&url("http://example.com/next"), MAX_REDIRECTS - 1, &config).is_ok());
    }

    #[test]
    fn test_redirect_to_loopback_is_refused() {
        let config = ScrapeConfig::default();
        assert!(matches!(
            follow_redirect(&url("http://127.0.0.1:8080/admin"), 0, &config),
            Err(ScrapeError::LocalhostBlocked)
        ));
        assert!(matches!(
            follow_redirect(&url("http://[::1]/"), 1, &config),
            Err(ScrapeError::LocalhostBlocked)
        ));
    }

    #[test]
    fn test_redirect_obeys_configured_policy() {
        let config = ScrapeConfig {
            blocked_hosts: vec!["internal.example".to_string()],
            block_private_ips: true,
            ..Default::default()
        };
        assert!(matches!(
            follow_redirect(&url("http://10.0.0.5/latest/meta-data"), 0, &config),
            Err(ScrapeError::BlockedHost(_))
        ));
        assert!(matches!(
            follow_redirect(&url("https://internal.example/"), 0, &config),
            Err(ScrapeError::BlockedHost(_))
        ));
    }

    #[test]
    fn test_redirect_hop_limit() {
        let config = ScrapeConfig::default();
        assert!(matches!(
            follow_redirect(&url("https://example.com/"), MAX_REDIRECTS, &config),
            Err(ScrapeError::Fetch { .. })
        ));
    }

    #[test]
    fn test_body_cap() {
        let mut body = Vec::new();
        append_capped(&mut body, b"hello", 8).unwrap();
        append_capped(&mut body, b"!!!", 8).unwrap();
        assert_eq!(body, b"hello!!!");

        assert!(append_capped(&mut body, b"x", 8).is_err());
        assert_eq!(body.len(), 8);
    }
}
