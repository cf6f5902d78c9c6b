pub mod categorizer;
pub mod config;
pub mod coordinator;
pub mod extractor;
pub mod fetcher;
pub mod links;
pub mod time;

pub use categorizer::categorize;
pub use config::{NewsSource, ScraperConfig};
pub use coordinator::{IngestionCoordinator, RunSummary, SourceReport, SourceState};
pub use extractor::ArticleExtractor;
pub use fetcher::{Document, Fetcher, HttpFetcher};

pub mod prelude {
    pub use super::{Fetcher, IngestionCoordinator, ScraperConfig};
    pub use nt_core::{Article, Error, Result};
}
