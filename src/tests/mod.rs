
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use crate::config::ScrapeConfig;
use crate::scrape::http::{HttpResponse, Transport};
use crate::scrape::Scraper;

/// In-memory transport. Unknown urls fail like a refused connection.
#[derive(Default)]
pub struct StubTransport {
    pages: Mutex<HashMap<String, HttpResponse>>,
    heads: Mutex<HashMap<String, StatusCode>>,
    calls: Mutex<Vec<String>>,
    latency: Duration,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    pub fn set_response(&self, url: &str, status: u16, content_type: &str, body: &str) {
        self.pages.lock().unwrap().insert(
            url.to_string(),
            HttpResponse {
                status: StatusCode::from_u16(status).unwrap(),
                content_type: Some(content_type.to_string()),
                body: body.to_string(),
            },
        );
    }

    pub fn set_html(&self, url: &str, body: &str) {
        self.set_response(url, 200, "text/html; charset=utf-8", body);
    }

    pub fn set_head(&self, url: &str, status: u16) {
        self.heads
            .lock()
            .unwrap()
            .insert(url.to_string(), StatusCode::from_u16(status).unwrap());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn get(&self, url: &Url) -> anyhow::Result<HttpResponse> {
        self.calls.lock().unwrap().push(format!("GET {url}"));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let page = self.pages.lock().unwrap().get(url.as_str()).cloned();
        page.ok_or_else(|| anyhow::anyhow!("connection refused"))
    }

    async fn head(&self, url: &Url) -> anyhow::Result<StatusCode> {
        self.calls.lock().unwrap().push(format!("HEAD {url}"));

        let status = self.heads.lock().unwrap().get(url.as_str()).copied();
        status.ok_or_else(|| anyhow::anyhow!("connection refused"))
    }
}

pub fn scraper_with(transport: Arc<StubTransport>) -> Scraper {
    scraper_with_policy(transport, ScrapeConfig::default())
}

pub fn scraper_with_policy(transport: Arc<StubTransport>, policy: ScrapeConfig) -> Scraper {
    Scraper::new(transport, policy)
}
