use async_trait::async_trait;
use nt_core::{Error, Result};
use rand::seq::SliceRandom;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Client;
use tracing::{debug, instrument};

use crate::config::ScraperConfig;

/// Raw page returned by a [`Fetcher`]. Parsing happens in the extractors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub url: String,
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieve `url`. Transport errors and non-2xx statuses are `Error::Fetch`.
    async fn fetch(&self, url: &str) -> Result<Document>;
}

pub struct HttpFetcher {
    client: Client,
    user_agents: Vec<String>,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        if config.user_agents.is_empty() {
            return Err(Error::Config("user agent pool is empty".into()));
        }
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            user_agents: config.user_agents.clone(),
        })
    }

    fn pick_identity(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or_default()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<Document> {
        let identity = self.pick_identity().to_string();
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, identity)
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|e| Error::fetch(url, e))?;

        let status = response.status();
        let response = response
            .error_for_status()
            .map_err(|e| Error::fetch(url, e))?;
        let body = response.text().await.map_err(|e| Error::fetch(url, e))?;
        debug!(status = status.as_u16(), bytes = body.len(), "Fetched page");

        Ok(Document {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}
