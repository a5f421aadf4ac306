use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_LISTEN: &str = "0.0.0.0:3000";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;
pub const USER_AGENT_DEFAULT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0";

/// Outbound request policy applied to every page the scraper is asked to visit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScrapeConfig {
    #[serde(default = "default_allowed_schemes")]
    pub allowed_schemes: Vec<String>,

    /// Hosts rejected outright, compared against the lowercased host.
    #[serde(default)]
    pub blocked_hosts: Vec<String>,

    /// Resolve the host and reject loopback, private and link-local targets.
    #[serde(default)]
    pub block_private_ips: bool,

    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            allowed_schemes: default_allowed_schemes(),
            blocked_hosts: Vec::new(),
            block_private_ips: false,
            accept_invalid_certs: false,
        }
    }
}

fn default_allowed_schemes() -> Vec<String> {
    vec!["http".to_string(), "https".to_string()]
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout for page, favicon and oembed fetches.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound on a fetched page or oembed body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default)]
    pub scrape: ScrapeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            user_agent: default_user_agent(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            scrape: ScrapeConfig::default(),
        }
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_user_agent() -> String {
    USER_AGENT_DEFAULT.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

impl Config {
    fn validate(&mut self) -> anyhow::Result<()> {
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be greater than 0");
        }

        if self.max_body_bytes == 0 {
            bail!("max_body_bytes must be greater than 0");
        }

        if self.scrape.allowed_schemes.is_empty() {
            bail!("scrape.allowed_schemes must not be empty");
        }

        for scheme in self.scrape.allowed_schemes.iter_mut() {
            *scheme = scheme.to_lowercase();
        }

        for host in self.scrape.blocked_hosts.iter_mut() {
            *host = host.to_lowercase();
        }

        Ok(())
    }

    /// Loads the YAML config at `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let config_str = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_yml::from_str::<Self>(&config_str)
                    .with_context(|| format!("config {} is malformed", path.display()))?
            }
            None => Self::default(),
        };

        config.validate()?;

        Ok(config)
    }
}
