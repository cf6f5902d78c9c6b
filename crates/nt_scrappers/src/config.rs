use std::path::Path;
use std::time::Duration;

use nt_core::{Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// A listing page the coordinator discovers article links from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsSource {
    pub name: String,
    pub url: String,
}

impl NewsSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

pub const DEFAULT_SOURCES: &[(&str, &str)] = &[
    ("CNBC", "https://www.cnbc.com/finance/"),
    ("Bloomberg", "https://www.bloomberg.com/markets"),
    ("Reuters Finance", "https://www.reuters.com/business/finance/"),
    ("Yahoo Finance", "https://finance.yahoo.com/"),
    ("MarketWatch", "https://www.marketwatch.com/"),
    ("Business Insider Finance", "https://www.businessinsider.com/finance"),
    ("Forbes", "https://www.forbes.com/money/"),
];

pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.114 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Mobile/15E148 Safari/604.1",
];

/// Immutable run configuration shared by the fetcher and the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub sources: Vec<NewsSource>,
    /// Pool of client identities; one is drawn per request.
    pub user_agents: Vec<String>,
    pub timeout_secs: u64,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    /// Articles fetched in parallel within a source.
    pub concurrency: usize,
    pub recent_days: i64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            sources: DEFAULT_SOURCES
                .iter()
                .map(|(name, url)| NewsSource::new(*name, *url))
                .collect(),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
            timeout_secs: 10,
            delay_min_ms: 500,
            delay_max_ms: 1500,
            concurrency: 1,
            recent_days: 7,
        }
    }
}

impl ScraperConfig {
    /// Load a JSON config file. Missing keys take their default values.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_agents.is_empty() {
            return Err(Error::Config("user_agents must not be empty".into()));
        }
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(Error::Config(format!("source {} has no name", source.url)));
            }
            Url::parse(&source.url).map_err(|e| {
                Error::Config(format!("source {} has invalid url {:?}: {}", source.name, source.url, e))
            })?;
        }
        if self.delay_min_ms > self.delay_max_ms {
            return Err(Error::Config(format!(
                "delay_min_ms ({}) exceeds delay_max_ms ({})",
                self.delay_min_ms, self.delay_max_ms
            )));
        }
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".into()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be at least 1".into()));
        }
        if self.recent_days < 0 {
            return Err(Error::Config(format!(
                "recent_days must not be negative, got {}",
                self.recent_days
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
