use url::Url;

use crate::scrape::cache::FetchCache;
use crate::scrape::document::Document;
use crate::scrape::guard::TargetUrl;
use crate::scrape::http::Transport;
use crate::scrape::ScrapeError;

const ICON_SELECTORS: &[&str] = &[
    r#"link[rel="icon"][href]"#,
    r#"link[rel="shortcut icon"][href]"#,
    r#"link[rel="apple-touch-icon"][href]"#,
];

/// Icon declared in the markup, resolved against `base`.
///
/// A link with a blank `href` does not end the chain.
pub fn declared(doc: &Document, base: &Url) -> Option<Url> {
    let href = ICON_SELECTORS
        .iter()
        .find_map(|selector| doc.attr(&[*selector], "href"))?;

    match base.join(&href) {
        Ok(url) => {
            log::info!("favicon found in HTML → {url}");
            Some(url)
        }
        Err(err) => {
            log::debug!("favicon href '{href}' is unusable: {err}");
            None
        }
    }
}

pub struct FaviconResolver<'a> {
    transport: &'a dyn Transport,
    probes: &'a FetchCache<String>,
}

impl<'a> FaviconResolver<'a> {
    pub fn new(transport: &'a dyn Transport, probes: &'a FetchCache<String>) -> Self {
        Self { transport, probes }
    }

    /// The declared icon if there is one, otherwise `<origin>/favicon.ico` when it exists.
    pub async fn resolve(
        &self,
        declared: Option<Url>,
        target: &TargetUrl,
    ) -> Result<String, ScrapeError> {
        if let Some(url) = declared {
            return Ok(url.to_string());
        }

        self.probe(target).await
    }

    /// Same as [`FaviconResolver::resolve`], with every failure reported as an absent favicon.
    pub async fn resolve_or_absent(&self, declared: Option<Url>, target: &TargetUrl) -> Option<String> {
        match self.resolve(declared, target).await {
            Ok(url) => Some(url),
            Err(ScrapeError::NoFavicon) => {
                log::info!("{target}: no favicon found");
                None
            }
            Err(err) => {
                log::warn!("{target}: favicon probe failed: {err}");
                None
            }
        }
    }

    async fn probe(&self, target: &TargetUrl) -> Result<String, ScrapeError> {
        let favicon_url = target.favicon_url();

        self.probes
            .resolve(favicon_url.as_str(), || async {
                let status = self.transport.head(&favicon_url).await.map_err(|err| {
                    ScrapeError::Fetch {
                        url: favicon_url.to_string(),
                        reason: err.to_string(),
                    }
                })?;

                if status.is_success() {
                    log::info!("{favicon_url} exists");
                    Ok(favicon_url.to_string())
                } else {
                    log::debug!("{favicon_url}: {status}");
                    Err(ScrapeError::NoFavicon)
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://x.com/blog/post").unwrap()
    }

    fn declared_in(head: &str) -> Option<String> {
        let doc = Document::parse(&format!("<html><head>{head}</head></html>"));
        declared(&doc, &base()).map(|url| url.to_string())
    }

    #[test]
    fn test_root_relative_href() {
        assert_eq!(
            declared_in(r#"<link rel="icon" href="/f.ico">"#).as_deref(),
            Some("https://x.com/f.ico")
        );
    }

    #[test]
    fn test_protocol_relative_href() {
        assert_eq!(
            declared_in(r#"<link rel="icon" href="//cdn.x.com/f.png">"#).as_deref(),
            Some("https://cdn.x.com/f.png")
        );
    }

    #[test]
    fn test_document_relative_and_absolute_href() {
        assert_eq!(
            declared_in(r#"<link rel="icon" href="icons/f.png">"#).as_deref(),
            Some("https://x.com/blog/icons/f.png")
        );
        assert_eq!(
            declared_in(r#"<link rel="icon" href="https://static.example.org/f.svg">"#).as_deref(),
            Some("https://static.example.org/f.svg")
        );
    }

    #[test]
    fn test_chain_order() {
        let head = r#"
            <link rel="apple-touch-icon" href="/apple.png">
            <link rel="shortcut icon" href="/shortcut.ico">
        "#;
        assert_eq!(declared_in(head).as_deref(), Some("https://x.com/shortcut.ico"));

        let head = r#"<link rel="apple-touch-icon" href="/apple.png">"#;
        assert_eq!(declared_in(head).as_deref(), Some("https://x.com/apple.png"));
    }

    #[test]
    fn test_link_without_href_is_skipped() {
        let head = r#"
            <link rel="icon">
            <link rel="apple-touch-icon" href="/apple.png">
        "#;
        assert_eq!(declared_in(head).as_deref(), Some("https://x.com/apple.png"));
    }

    #[test]
    fn test_blank_href_falls_through() {
        let head = r#"
            <link rel="icon" href="">
            <link rel="apple-touch-icon" href="/a.png">
        "#;
        assert_eq!(declared_in(head).as_deref(), Some("https://x.com/a.png"));

        let head = r#"
            <link rel="icon" href="   ">
            <link rel="shortcut icon" href="/s.ico">
        "#;
        assert_eq!(declared_in(head).as_deref(), Some("https://x.com/s.ico"));
    }

    #[test]
    fn test_no_icon_links() {
        assert_eq!(declared_in("<title>t</title>"), None);
    }
}
