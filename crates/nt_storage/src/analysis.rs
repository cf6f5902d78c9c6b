//! Coverage reporting over stored articles.
//!
//! Both reports are read-only: they load the rows published inside a range
//! and aggregate them in memory.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use nt_core::{Article, ArticleStorage, Category, DateRange, ExportFilter, Result};
use serde::Serialize;
use tracing::{info, instrument};

/// Floor for the low-volume thresholds.
const MIN_EXPECTED_COUNT: f64 = 3.0;
/// Fraction of the average below which a day or source is flagged.
const LOW_VOLUME_RATIO: f64 = 0.3;
const SHORT_CONTENT_CHARS: usize = 500;
const QUALITY_SHORT_CONTENT_CHARS: usize = 200;
const SHORT_CONTENT_PREVIEW: usize = 5;

fn low_volume_threshold(average: f64) -> f64 {
    MIN_EXPECTED_COUNT.max(average * LOW_VOLUME_RATIO)
}

fn is_short(article: &Article, limit: usize) -> bool {
    article.content.chars().count() < limit
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayCount {
    pub day: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShortArticle {
    pub title: String,
    pub url: String,
    pub source: String,
    pub content_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total: usize,
    /// Highest count first
    pub by_source: Vec<(String, usize)>,
    /// Highest count first
    pub by_category: Vec<(Category, usize)>,
    /// Every calendar day of the range, including empty ones
    pub daily: Vec<DayCount>,
    pub missing_days: Vec<NaiveDate>,
    pub low_volume_days: Vec<DayCount>,
    /// Articles with content under 500 characters
    pub short_content: Vec<ShortArticle>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total: usize,
    /// Lowest count first
    pub by_source: Vec<(String, usize)>,
    pub low_coverage_sources: Vec<(String, usize)>,
    /// Articles with content under 200 characters
    pub short_content_count: usize,
}

fn count_by<K, F>(articles: &[Article], key: F) -> Vec<(K, usize)>
where
    K: Eq + std::hash::Hash + Clone,
    F: Fn(&Article) -> K,
{
    // First-seen order keeps equal counts stable
    let mut order: Vec<K> = Vec::new();
    let mut counts: HashMap<K, usize> = HashMap::new();
    for article in articles {
        let k = key(article);
        let entry = counts.entry(k.clone()).or_insert_with(|| {
            order.push(k);
            0
        });
        *entry += 1;
    }
    order
        .into_iter()
        .map(|k| {
            let count = counts[&k];
            (k, count)
        })
        .collect()
}

pub struct CoverageAnalyzer {
    storage: Arc<dyn ArticleStorage>,
}

impl CoverageAnalyzer {
    pub fn new(storage: Arc<dyn ArticleStorage>) -> Self {
        Self { storage }
    }

    async fn articles_in(&self, range: &DateRange) -> Result<Vec<Article>> {
        self.storage
            .articles(&ExportFilter::DateRange(*range))
            .await
    }

    #[instrument(level = "info", skip(self), fields(start = %range.start_date(), end = %range.end_date()))]
    pub async fn analyze_range(&self, range: &DateRange) -> Result<CoverageReport> {
        let articles = self.articles_in(range).await?;

        let mut by_source = count_by(&articles, |a| a.source.clone());
        by_source.sort_by(|a, b| b.1.cmp(&a.1));
        let mut by_category = count_by(&articles, |a| a.category);
        by_category.sort_by(|a, b| b.1.cmp(&a.1));

        let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for article in &articles {
            *per_day.entry(article.published_at.date_naive()).or_default() += 1;
        }

        let daily: Vec<DayCount> = range
            .days()
            .into_iter()
            .map(|day| DayCount {
                day,
                count: per_day.get(&day).copied().unwrap_or(0),
            })
            .collect();
        let missing_days = daily
            .iter()
            .filter(|d| d.count == 0)
            .map(|d| d.day)
            .collect();

        // Averaged over days that have articles; empty days are reported as missing.
        let low_volume_days = if per_day.is_empty() {
            Vec::new()
        } else {
            let average = articles.len() as f64 / per_day.len() as f64;
            let threshold = low_volume_threshold(average);
            per_day
                .iter()
                .filter(|(_, count)| (**count as f64) < threshold)
                .map(|(day, count)| DayCount {
                    day: *day,
                    count: *count,
                })
                .collect()
        };

        let short_content = articles
            .iter()
            .filter(|a| is_short(a, SHORT_CONTENT_CHARS))
            .map(|a| ShortArticle {
                title: a.title.clone(),
                url: a.url.clone(),
                source: a.source.clone(),
                content_chars: a.content.chars().count(),
            })
            .collect();

        info!(total = articles.len(), "Article analysis completed");
        Ok(CoverageReport {
            start: range.start.date_naive(),
            end: range.end.date_naive(),
            total: articles.len(),
            by_source,
            by_category,
            daily,
            missing_days,
            low_volume_days,
            short_content,
        })
    }

    #[instrument(level = "info", skip(self), fields(start = %range.start_date(), end = %range.end_date()))]
    pub async fn check_quality(&self, range: &DateRange) -> Result<QualityReport> {
        let articles = self.articles_in(range).await?;

        let mut by_source = count_by(&articles, |a| a.source.clone());
        by_source.sort_by(|a, b| a.1.cmp(&b.1));

        let low_coverage_sources = if by_source.is_empty() {
            Vec::new()
        } else {
            let average = articles.len() as f64 / by_source.len() as f64;
            let threshold = low_volume_threshold(average);
            by_source
                .iter()
                .filter(|(_, count)| (*count as f64) < threshold)
                .cloned()
                .collect()
        };

        let short_content_count = articles
            .iter()
            .filter(|a| is_short(a, QUALITY_SHORT_CONTENT_CHARS))
            .count();

        info!(total = articles.len(), short_content_count, "Coverage quality checked");
        Ok(QualityReport {
            start: range.start.date_naive(),
            end: range.end.date_naive(),
            total: articles.len(),
            by_source,
            low_coverage_sources,
            short_content_count,
        })
    }
}

impl fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===== ARTICLE ANALYSIS REPORT =====")?;
        writeln!(f, "Date Range: {} to {}", self.start, self.end)?;

        writeln!(f, "\n1. ARTICLES BY SOURCE:")?;
        for (source, count) in &self.by_source {
            writeln!(f, "   - {}: {} articles", source, count)?;
        }
        writeln!(f, "\n2. ARTICLES BY CATEGORY:")?;
        for (category, count) in &self.by_category {
            writeln!(f, "   - {}: {} articles", category, count)?;
        }
        writeln!(f, "\n3. DAILY DISTRIBUTION:")?;
        for day in self.daily.iter().filter(|d| d.count > 0) {
            writeln!(f, "   - {}: {} articles", day.day, day.count)?;
        }

        writeln!(f, "\n4. POTENTIAL ISSUES:")?;
        if self.missing_days.is_empty() {
            writeln!(f, "   - No missing days")?;
        } else {
            let days: Vec<String> = self.missing_days.iter().map(|d| d.to_string()).collect();
            writeln!(f, "   - Missing days (no articles): {}", days.join(", "))?;
        }
        if !self.low_volume_days.is_empty() {
            writeln!(f, "   - Days with unusually few articles:")?;
            for day in &self.low_volume_days {
                writeln!(f, "     * {}: only {} articles", day.day, day.count)?;
            }
        }
        if !self.short_content.is_empty() {
            writeln!(
                f,
                "   - Articles with missing or very short content: {}",
                self.short_content.len()
            )?;
            for article in self.short_content.iter().take(SHORT_CONTENT_PREVIEW) {
                writeln!(f, "     * {} - {}", article.title, article.source)?;
                writeln!(f, "       URL: {}", article.url)?;
            }
            if self.short_content.len() > SHORT_CONTENT_PREVIEW {
                writeln!(
                    f,
                    "       ... and {} more",
                    self.short_content.len() - SHORT_CONTENT_PREVIEW
                )?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===== COVERAGE QUALITY REPORT =====")?;
        writeln!(f, "Date Range: {} to {}", self.start, self.end)?;
        writeln!(f, "Total articles: {}", self.total)?;
        if self.low_coverage_sources.is_empty() {
            writeln!(f, "All sources have satisfactory coverage.")?;
        } else {
            writeln!(f, "Sources with low coverage:")?;
            for (source, count) in &self.low_coverage_sources {
                writeln!(f, " - {}: {} articles", source, count)?;
            }
        }
        writeln!(
            f,
            "Articles with very short content (<{} characters): {}",
            QUALITY_SHORT_CONTENT_CHARS, self.short_content_count
        )
    }
}
