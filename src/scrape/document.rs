use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::scrape::ScrapeError;

/// Read-only view over a parsed page.
///
/// `scraper::Html` is not `Send`, so a `Document` must be dropped before the
/// owning task reaches its next `.await`.
pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_document(markup),
        }
    }

    /// First element in document order matching `selector`.
    pub fn query(&self, selector: &str) -> Result<Option<ElementRef<'_>>, ScrapeError> {
        let parsed = Selector::parse(selector).map_err(|e| ScrapeError::Selector {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;

        Ok(self.html.select(&parsed).next())
    }

    /// Like [`Document::query`], with malformed selectors logged and treated as no match.
    pub fn find(&self, selector: &str) -> Option<ElementRef<'_>> {
        match self.query(selector) {
            Ok(Some(element)) => {
                log::debug!("found element for selector '{selector}'");
                Some(element)
            }
            Ok(None) => {
                log::debug!("no elements found for selector '{selector}'");
                None
            }
            Err(err) => {
                log::warn!("{err}");
                None
            }
        }
    }

    /// Tries each selector in order and returns the first match.
    pub fn find_first(&self, selectors: &[&str]) -> Option<ElementRef<'_>> {
        selectors.iter().find_map(|selector| self.find(selector))
    }

    pub fn text(&self, selectors: &[&str]) -> Option<String> {
        self.find_first(selectors)
            .map(|element| element.text().collect::<String>())
            .and_then(non_empty)
    }

    pub fn attr(&self, selectors: &[&str], name: &str) -> Option<String> {
        self.find_first(selectors)
            .and_then(|element| element.value().attr(name))
            .map(str::to_string)
            .and_then(non_empty)
    }

    /// Base for relative links: `<base href>` when present and valid, else the page URL.
    pub fn base_url(&self, page: &Url) -> Url {
        self.attr(&["head base[href]", "base[href]"], "href")
            .and_then(|href| page.join(&href).ok())
            .unwrap_or_else(|| page.clone())
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
