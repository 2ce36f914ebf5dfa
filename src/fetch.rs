use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};

pub const DEFAULT_USER_AGENT: &str = "ficbinder/0.1";

/// Capability: fetch a URL. Implementations must be safe to call concurrently.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> anyhow::Result<String>;
    async fn fetch_binary(&self, url: &str) -> anyhow::Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(user_agent: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            user_agent: user_agent.into(),
        })
    }

    /// Honours `FICBINDER_USER_AGENT` when set.
    pub fn from_env() -> anyhow::Result<Self> {
        let user_agent = std::env::var("FICBINDER_USER_AGENT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned());
        Self::new(user_agent)
    }

    async fn get(&self, url: &str, accept: &str) -> anyhow::Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, accept)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {url} failed ({status})");
        }
        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> anyhow::Result<String> {
        let response = self
            .get(url, "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8")
            .await?;
        response
            .text()
            .await
            .with_context(|| format!("read body: {url}"))
    }

    async fn fetch_binary(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let response = self.get(url, "*/*").await?;
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("read body: {url}"))?;
        Ok(bytes.to_vec())
    }
}
