#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("access to localhost not allowed")]
    LocalhostBlocked,

    #[error("host '{0}' is blocked")]
    BlockedHost(String),

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to parse {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("malformed selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },

    #[error("oembed link tag lacks a usable href attribute")]
    MalformedOembedLink,

    #[error("failed to fetch oembed from {url}: {reason}")]
    OembedFetch { url: String, reason: String },

    #[error("no favicon found")]
    NoFavicon,
}

impl ScrapeError {
    /// Errors caused by the caller's input rather than the remote site.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ScrapeError::InvalidUrl(_) | ScrapeError::LocalhostBlocked | ScrapeError::BlockedHost(_)
        )
    }
}
