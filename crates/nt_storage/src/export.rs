//! JSON export of stored articles.
//!
//! An export is a JSON array with one object per article and every column
//! present, indented for reading. [`read_export`] loads it back so an export
//! can be treated as the full row set.

use std::path::Path;

use nt_core::{Article, ArticleStorage, DateRange, ExportFilter, Result};
use serde::Serialize;
use tracing::{info, instrument};

pub const DEFAULT_EXPORT_FILE: &str = "financial_news_export.json";

/// File name suggested for a date-range export.
pub fn range_export_filename(range: &DateRange) -> String {
    format!("{}_to_{}_articles.json", range.start_date(), range.end_date())
}

fn to_pretty_json(articles: &[Article]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    articles.serialize(&mut serializer)?;
    Ok(buf)
}

/// Write every article matching `filter` to `path`. Returns the number written.
#[instrument(level = "info", skip(storage), fields(path = %path.display()))]
pub async fn export_json(
    storage: &dyn ArticleStorage,
    path: &Path,
    filter: &ExportFilter,
) -> Result<usize> {
    let articles = storage.articles(filter).await?;
    let json = to_pretty_json(&articles)?;
    tokio::fs::write(path, json).await?;
    info!(count = articles.len(), "Exported articles");
    Ok(articles.len())
}

pub async fn read_export(path: &Path) -> Result<Vec<Article>> {
    let raw = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&raw)?)
}
