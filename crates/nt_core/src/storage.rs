use async_trait::async_trait;

use crate::dates::DateRange;
use crate::types::{Article, ArticleSummary, Category, SearchTerm};
use crate::Result;

/// Row selection for exports.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExportFilter {
    #[default]
    All,
    DateRange(DateRange),
    Category(Category),
    Source(String),
}

impl ExportFilter {
    pub fn matches(&self, article: &Article) -> bool {
        match self {
            ExportFilter::All => true,
            ExportFilter::DateRange(range) => range.contains(&article.published_at),
            ExportFilter::Category(category) => article.category == *category,
            ExportFilter::Source(source) => article.source == *source,
        }
    }
}

/// URL-deduplicated article persistence.
///
/// Implementations must enforce `url` uniqueness themselves so that concurrent
/// writers can rely on `insert` alone instead of check-then-insert.
#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Whether an article with this URL is already stored
    async fn exists(&self, url: &str) -> Result<bool>;

    /// Store an article. Returns `false` without error when the URL exists.
    async fn insert(&self, article: &Article) -> Result<bool>;

    /// Case-insensitive substring search over title, content and summary,
    /// newest publish time first. Records the term as searched.
    async fn query_by_term(&self, term: &str) -> Result<Vec<ArticleSummary>>;

    async fn query_by_category(&self, category: Category) -> Result<Vec<ArticleSummary>>;

    /// Articles published within the inclusive range, newest first
    async fn query_by_date_range(&self, range: &DateRange) -> Result<Vec<ArticleSummary>>;

    /// Most recently retrieved articles
    async fn query_recent(&self, limit: usize) -> Result<Vec<ArticleSummary>>;

    /// Full rows matching the filter, in insertion order
    async fn articles(&self, filter: &ExportFilter) -> Result<Vec<Article>>;

    async fn search_terms(&self) -> Result<Vec<SearchTerm>>;

    async fn count(&self) -> Result<usize>;

    /// Release the underlying resources. Further calls may fail.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
