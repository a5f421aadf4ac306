pub mod cache;
pub mod document;
pub mod errors;
pub mod extract;
pub mod favicon;
pub mod guard;
pub mod http;
pub mod oembed;
pub mod types;

use std::sync::Arc;

use serde::Serialize;

use crate::config::ScrapeConfig;
use cache::FetchCache;
use document::Document;
use favicon::FaviconResolver;
use guard::TargetUrl;
use http::Transport;
use oembed::OembedResolver;

pub use errors::ScrapeError;
pub use types::{MetadataRecord, OembedObject};

/// Number of cached values per cache.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub pages: usize,
    pub favicons: usize,
    pub oembeds: usize,
}

/// Shared, process-wide scraping service.
///
/// Holds the only state shared between requests: the page, favicon probe and
/// oEmbed caches.
pub struct Scraper {
    transport: Arc<dyn Transport>,
    config: ScrapeConfig,
    pages: FetchCache<Arc<str>>,
    favicons: FetchCache<String>,
    oembeds: FetchCache<OembedObject>,
}

fn is_markup(content_type: &str) -> bool {
    let content_type = content_type.to_lowercase();
    content_type.starts_with("text/") || content_type.contains("html") || content_type.contains("xml")
}

impl Scraper {
    pub fn new(transport: Arc<dyn Transport>, config: ScrapeConfig) -> Self {
        Self {
            transport,
            config,
            pages: FetchCache::new("pages"),
            favicons: FetchCache::new("favicons"),
            oembeds: FetchCache::new("oembed"),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            pages: self.pages.len(),
            favicons: self.favicons.len(),
            oembeds: self.oembeds.len(),
        }
    }

    async fn target(&self, raw_url: &str) -> Result<TargetUrl, ScrapeError> {
        let target = guard::validate(raw_url)?;
        guard::check_policy(target.as_url(), &self.config).await?;
        Ok(target)
    }

    async fn fetch_markup(&self, target: &TargetUrl) -> Result<Arc<str>, ScrapeError> {
        self.pages
            .resolve(target.as_str(), || async {
                let resp = self
                    .transport
                    .get(target.as_url())
                    .await
                    .map_err(|err| ScrapeError::Fetch {
                        url: target.to_string(),
                        reason: err.to_string(),
                    })?;

                if !resp.status.is_success() {
                    return Err(ScrapeError::Fetch {
                        url: target.to_string(),
                        reason: format!("unexpected status code: {}", resp.status.as_u16()),
                    });
                }

                if let Some(content_type) = resp.content_type.as_deref() {
                    if !is_markup(content_type) {
                        return Err(ScrapeError::Parse {
                            url: target.to_string(),
                            reason: format!("unsupported content type '{content_type}'"),
                        });
                    }
                }

                Ok(Arc::from(resp.body))
            })
            .await
    }

    /// Full link-preview record for `raw_url`.
    ///
    /// Validation and page fetch failures abort; favicon and oEmbed failures
    /// only leave their field empty.
    pub async fn scrape(&self, raw_url: &str) -> Result<MetadataRecord, ScrapeError> {
        let target = self.target(raw_url).await?;
        let markup = self.fetch_markup(&target).await?;

        let (mut record, declared_icon, oembed_link) = {
            let doc = Document::parse(&markup);
            let base = doc.base_url(target.as_url());
            (
                extract::extract(&doc),
                favicon::declared(&doc, &base),
                oembed::discover(&doc, &base),
            )
        };

        let favicons = FaviconResolver::new(self.transport.as_ref(), &self.favicons);
        let oembeds = OembedResolver::new(self.transport.as_ref(), &self.oembeds, &self.config);

        let (favicon, oembed) = tokio::join!(
            favicons.resolve_or_absent(declared_icon, &target),
            oembeds.resolve_or_absent(oembed_link),
        );

        record.favicon = favicon;
        record.oembed = oembed;

        Ok(record)
    }

    /// Favicon URL only, skipping metadata and oEmbed.
    pub async fn favicon(&self, raw_url: &str) -> Result<String, ScrapeError> {
        let target = self.target(raw_url).await?;
        let markup = self.fetch_markup(&target).await?;

        let declared_icon = {
            let doc = Document::parse(&markup);
            let base = doc.base_url(target.as_url());
            favicon::declared(&doc, &base)
        };

        let favicons = FaviconResolver::new(self.transport.as_ref(), &self.favicons);
        match favicons.resolve(declared_icon, &target).await {
            Ok(url) => Ok(url),
            Err(ScrapeError::NoFavicon) => Err(ScrapeError::NoFavicon),
            Err(err) => {
                log::warn!("{target}: favicon probe failed: {err}");
                Err(ScrapeError::NoFavicon)
            }
        }
    }
}
