use serde_json::Value;
use url::Url;

use crate::config::ScrapeConfig;
use crate::scrape::cache::FetchCache;
use crate::scrape::document::Document;
use crate::scrape::guard;
use crate::scrape::http::Transport;
use crate::scrape::types::OembedObject;
use crate::scrape::ScrapeError;

const OEMBED_SELECTOR: &str = r#"link[rel="alternate"][type="application/json+oembed"]"#;

/// Locates the oEmbed discovery link. `Ok(None)` when the page has none.
pub fn discover(doc: &Document, base: &Url) -> Result<Option<Url>, ScrapeError> {
    let Some(link) = doc.find(OEMBED_SELECTOR) else {
        log::info!("website doesn't seem to have oembed, skipping...");
        return Ok(None);
    };

    let href = link
        .value()
        .attr("href")
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .ok_or(ScrapeError::MalformedOembedLink)?;

    let url = base.join(href).map_err(|err| {
        log::debug!("oembed href '{href}' is unusable: {err}");
        ScrapeError::MalformedOembedLink
    })?;

    log::info!("detected oembed → {url}");

    Ok(Some(url))
}

fn fetch_error(url: &Url, reason: impl ToString) -> ScrapeError {
    ScrapeError::OembedFetch {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

pub struct OembedResolver<'a> {
    transport: &'a dyn Transport,
    objects: &'a FetchCache<OembedObject>,
    policy: &'a ScrapeConfig,
}

impl<'a> OembedResolver<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        objects: &'a FetchCache<OembedObject>,
        policy: &'a ScrapeConfig,
    ) -> Self {
        Self {
            transport,
            objects,
            policy,
        }
    }

    /// GETs the endpoint and decodes its body as a JSON object.
    ///
    /// The endpoint comes from untrusted markup and goes through the same
    /// outbound policy as the page itself.
    pub async fn fetch(&self, url: &Url) -> Result<OembedObject, ScrapeError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(fetch_error(url, format!("scheme '{}' not allowed", url.scheme())));
        }
        guard::ensure_not_localhost(url).map_err(|err| fetch_error(url, err))?;
        guard::check_policy(url, self.policy)
            .await
            .map_err(|err| fetch_error(url, err))?;

        self.objects
            .resolve(url.as_str(), || async {
                let resp = self
                    .transport
                    .get(url)
                    .await
                    .map_err(|err| fetch_error(url, err))?;

                if !resp.status.is_success() {
                    return Err(fetch_error(
                        url,
                        format!("unexpected status code: {}", resp.status.as_u16()),
                    ));
                }

                match serde_json::from_str::<Value>(&resp.body) {
                    Ok(Value::Object(object)) => Ok(object),
                    Ok(_) => Err(fetch_error(url, "response is not a JSON object")),
                    Err(err) => Err(fetch_error(url, err)),
                }
            })
            .await
    }

    /// Follows a discovery result to an oEmbed object; any failure yields `None`.
    pub async fn resolve_or_absent(&self, link: Result<Option<Url>, ScrapeError>) -> Option<OembedObject> {
        let url = match link {
            Ok(Some(url)) => url,
            Ok(None) => return None,
            Err(err) => {
                log::warn!("{err}");
                return None;
            }
        };

        match self.fetch(&url).await {
            Ok(object) if object.is_empty() => None,
            Ok(object) => Some(object),
            Err(err) => {
                log::warn!("{err}");
                None
            }
        }
    }
}
