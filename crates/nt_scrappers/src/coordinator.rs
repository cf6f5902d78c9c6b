use std::fmt;
use std::io::IsTerminal;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use kdam::{tqdm, Bar, BarExt};
use nt_core::{ArticleStorage, DateRange, Result};
use nt_storage::{CoverageAnalyzer, CoverageReport};
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::categorizer::categorize;
use crate::config::{NewsSource, ScraperConfig};
use crate::extractor::ArticleExtractor;
use crate::fetcher::Fetcher;
use crate::links;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceState {
    Discovering,
    FetchingArticles,
    Done,
    Error(String),
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceState::Discovering => write!(f, "discovering"),
            SourceState::FetchingArticles => write!(f, "fetching articles"),
            SourceState::Done => write!(f, "done"),
            SourceState::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleOutcome {
    Added,
    AlreadyStored,
    OutOfRange,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub state: SourceState,
    pub links_found: usize,
    pub processed: usize,
    pub added: usize,
    pub already_stored: usize,
    pub out_of_range: usize,
    pub errors: usize,
}

impl SourceReport {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            state: SourceState::Discovering,
            links_found: 0,
            processed: 0,
            added: 0,
            already_stored: 0,
            out_of_range: 0,
            errors: 0,
        }
    }

    fn record(&mut self, outcome: ArticleOutcome) {
        if outcome == ArticleOutcome::Cancelled {
            return;
        }
        self.processed += 1;
        match outcome {
            ArticleOutcome::Added => self.added += 1,
            ArticleOutcome::AlreadyStored => self.already_stored += 1,
            ArticleOutcome::OutOfRange => self.out_of_range += 1,
            ArticleOutcome::Failed => self.errors += 1,
            ArticleOutcome::Cancelled => {}
        }
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub sources: Vec<SourceReport>,
    pub total_new: usize,
    pub cancelled: bool,
    /// Present after `ingest_recent` when the report could be built.
    pub coverage: Option<CoverageReport>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.sources {
            writeln!(
                f,
                "{}: {} ({} links, {} processed, {} new, {} already stored, {} out of range, {} errors)",
                report.source,
                report.state,
                report.links_found,
                report.processed,
                report.added,
                report.already_stored,
                report.out_of_range,
                report.errors
            )?;
        }
        if self.cancelled {
            writeln!(f, "Run cancelled before completion")?;
        }
        writeln!(f, "Total new articles: {}", self.total_new)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub processed: usize,
    pub total: usize,
    pub elapsed: Duration,
    pub eta: Option<Duration>,
    pub added: usize,
}

/// `remaining × elapsed / processed`; unknown until something was processed.
pub fn estimate_remaining(processed: usize, total: usize, elapsed: Duration) -> Option<Duration> {
    if processed == 0 {
        return None;
    }
    let remaining = total.saturating_sub(processed);
    Some(elapsed.mul_f64(remaining as f64 / processed as f64))
}

struct ProgressState {
    bar: Bar,
    processed: usize,
    added: usize,
}

/// Per-source progress bar on stderr, hidden when stderr is not a terminal.
struct Progress {
    total: usize,
    started: Instant,
    visible: bool,
    state: Mutex<ProgressState>,
}

impl Progress {
    fn new(source: &str, total: usize) -> Self {
        let visible = std::io::stderr().is_terminal();
        let bar = tqdm!(
            total = total,
            desc = source.to_string(),
            leave = true,
            disable = !visible
        );
        Self {
            total,
            started: Instant::now(),
            visible,
            state: Mutex::new(ProgressState {
                bar,
                processed: 0,
                added: 0,
            }),
        }
    }

    fn record(&self, added: bool) -> ProgressSnapshot {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.processed += 1;
        if added {
            state.added += 1;
        }
        let new = state.added;
        state.bar.set_postfix(format!("new={}", new));
        if let Err(e) = state.bar.update(1) {
            debug!(error = %e, "Progress bar write failed");
        }

        let elapsed = self.started.elapsed();
        ProgressSnapshot {
            processed: state.processed,
            total: self.total,
            elapsed,
            eta: estimate_remaining(state.processed, self.total, elapsed),
            added: state.added,
        }
    }

    fn finish(&self) {
        if !self.visible {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.bar.refresh().is_ok() {
            eprintln!();
        }
    }
}

/// Drives discovery, extraction and persistence for every configured source.
pub struct IngestionCoordinator {
    storage: Arc<dyn ArticleStorage>,
    fetcher: Arc<dyn Fetcher>,
    extractor: ArticleExtractor,
    config: Arc<ScraperConfig>,
    cancel: CancellationToken,
}

impl IngestionCoordinator {
    pub fn new(
        storage: Arc<dyn ArticleStorage>,
        fetcher: Arc<dyn Fetcher>,
        config: Arc<ScraperConfig>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            storage,
            fetcher,
            extractor: ArticleExtractor::new()?,
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Cancelling the returned token stops the run between articles.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ingest only articles published inside `range`, then report coverage
    /// for the whole calendar days the window touches.
    pub async fn ingest_recent(&self, range: DateRange) -> RunSummary {
        info!(start = %range.start, end = %range.end, "Ingesting recent articles");
        let mut summary = self.run(Some(&range)).await;

        match CoverageAnalyzer::new(self.storage.clone())
            .analyze_range(&range.whole_days())
            .await
        {
            Ok(report) => summary.coverage = Some(report),
            Err(e) => error!(error = %e, "Coverage analysis failed"),
        }
        summary
    }

    pub async fn ingest_all(&self) -> RunSummary {
        info!("Ingesting all discoverable articles");
        self.run(None).await
    }

    async fn run(&self, range: Option<&DateRange>) -> RunSummary {
        let mut summary = RunSummary::default();

        for source in &self.config.sources {
            if self.cancel.is_cancelled() {
                break;
            }
            let report = self.ingest_source(source, range).await;
            summary.total_new += report.added;
            summary.sources.push(report);
        }

        summary.cancelled = self.cancel.is_cancelled();
        info!(
            total_new = summary.total_new,
            sources = summary.sources.len(),
            "Ingestion finished"
        );
        summary
    }

    #[instrument(level = "info", skip(self, source, range), fields(source = %source.name))]
    pub async fn ingest_source(&self, source: &NewsSource, range: Option<&DateRange>) -> SourceReport {
        let mut report = SourceReport::new(&source.name);

        let links = match links::try_discover(self.fetcher.as_ref(), source).await {
            Ok(links) => links,
            Err(e) => {
                error!(error = %e, "Link discovery failed");
                report.state = SourceState::Error(e.to_string());
                return report;
            }
        };
        report.links_found = links.len();
        report.state = SourceState::FetchingArticles;

        let progress = Progress::new(&source.name, links.len());
        let outcomes: Vec<ArticleOutcome> = stream::iter(links)
            .map(|url| {
                let progress = &progress;
                async move {
                    let outcome = self.process_link(source, &url, range).await;
                    if outcome != ArticleOutcome::Cancelled {
                        let snapshot = progress.record(outcome == ArticleOutcome::Added);
                        debug!(
                            processed = snapshot.processed,
                            total = snapshot.total,
                            elapsed_secs = snapshot.elapsed.as_secs(),
                            eta_secs = snapshot.eta.map(|eta| eta.as_secs()),
                            added = snapshot.added,
                            "Progress"
                        );
                    }
                    outcome
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        progress.finish();

        for outcome in outcomes {
            report.record(outcome);
        }
        report.state = SourceState::Done;
        info!(added = report.added, errors = report.errors, "Source complete");
        report
    }

    async fn process_link(
        &self,
        source: &NewsSource,
        url: &str,
        range: Option<&DateRange>,
    ) -> ArticleOutcome {
        if self.cancel.is_cancelled() {
            return ArticleOutcome::Cancelled;
        }
        match self.try_process_link(source, url, range).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(url, error = %e, "Skipping article");
                ArticleOutcome::Failed
            }
        }
    }

    async fn try_process_link(
        &self,
        source: &NewsSource,
        url: &str,
        range: Option<&DateRange>,
    ) -> Result<ArticleOutcome> {
        if self.storage.exists(url).await? {
            debug!(url, "Article already stored");
            return Ok(ArticleOutcome::AlreadyStored);
        }
        if !self.polite_delay().await {
            return Ok(ArticleOutcome::Cancelled);
        }

        let page = self.fetcher.fetch(url).await?;
        let retrieved_at = Utc::now();
        let draft = self.extractor.extract(&page.body, url, retrieved_at)?;
        let category = categorize(&draft.title, &draft.content);
        let article = draft.into_article(url, source.name.as_str(), category, retrieved_at);

        if let Some(range) = range {
            if !range.contains(&article.published_at) {
                info!(url, published = %article.published_at, "Outside date filter");
                return Ok(ArticleOutcome::OutOfRange);
            }
        }

        // A concurrent worker may have stored the same URL since the check above.
        if self.storage.insert(&article).await? {
            info!(url, title = %article.title, category = %article.category, "Saved article");
            Ok(ArticleOutcome::Added)
        } else {
            Ok(ArticleOutcome::AlreadyStored)
        }
    }

    /// Random pause before a fetch. Returns false if cancelled while waiting.
    async fn polite_delay(&self) -> bool {
        let (min, max) = (self.config.delay_min_ms, self.config.delay_max_ms);
        if max == 0 {
            return !self.cancel.is_cancelled();
        }
        let millis = rand::thread_rng().gen_range(min..=max);
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(Duration::from_millis(millis)) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::Document;
    use async_trait::async_trait;
    use nt_core::dates::start_of_day;
    use nt_core::{Article, ArticleDraft, ArticleSummary, Category, Error, ExportFilter, SearchTerm};
    use nt_storage::InMemoryStorage;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned pages; any other URL fails like a timeout.
    #[derive(Default)]
    struct ScriptedFetcher {
        pages: HashMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn page(mut self, url: &str, body: impl Into<String>) -> Self {
            self.pages.insert(url.to_string(), body.into());
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<Document> {
            self.requests.lock().unwrap().push(url.to_string());
            match self.pages.get(url) {
                Some(body) => Ok(Document {
                    url: url.to_string(),
                    status: 200,
                    body: body.clone(),
                }),
                None => Err(Error::fetch(url, "operation timed out")),
            }
        }
    }

    fn listing(hrefs: &[&str]) -> String {
        hrefs
            .iter()
            .map(|href| format!(r#"<a href="{}">link</a>"#, href))
            .collect()
    }

    fn article_page(title: &str, published: &str) -> String {
        format!(
            r#"<html><head><title>{}</title></head><body>
               <time datetime="{}"></time>
               <article><p>Bitcoin and crypto tokens rallied.</p><p>Second.</p></article>
               </body></html>"#,
            title, published
        )
    }

    fn config(sources: &[(&str, &str)], concurrency: usize) -> Arc<ScraperConfig> {
        Arc::new(ScraperConfig {
            sources: sources
                .iter()
                .map(|(name, url)| NewsSource::new(*name, *url))
                .collect(),
            delay_min_ms: 0,
            delay_max_ms: 0,
            concurrency,
            ..ScraperConfig::default()
        })
    }

    fn coordinator(
        storage: Arc<InMemoryStorage>,
        fetcher: ScriptedFetcher,
        config: Arc<ScraperConfig>,
    ) -> (IngestionCoordinator, Arc<ScriptedFetcher>) {
        let fetcher = Arc::new(fetcher);
        let coordinator = IngestionCoordinator::new(storage, fetcher.clone(), config).unwrap();
        (coordinator, fetcher)
    }

    #[tokio::test]
    async fn test_overlapping_links_stored_once() {
        let fetcher = ScriptedFetcher::default()
            .page("https://a.test/", listing(&["/news/shared"]))
            .page("https://b.test/", listing(&["https://a.test/news/shared"]))
            .page("https://a.test/news/shared", article_page("Shared", "2024-03-02T10:00:00Z"));
        let storage = Arc::new(InMemoryStorage::new());
        let (coordinator, _) = coordinator(
            storage.clone(),
            fetcher,
            config(&[("A", "https://a.test/"), ("B", "https://b.test/")], 1),
        );

        let summary = coordinator.ingest_all().await;
        assert_eq!(summary.total_new, 1);
        assert_eq!(storage.count().await.unwrap(), 1);
        assert_eq!(summary.sources[1].already_stored, 1);

        let stored = storage.articles(&ExportFilter::All).await.unwrap();
        assert_eq!(stored[0].source, "A");
        assert_eq!(stored[0].category, Category::Cryptocurrency);
    }

    #[tokio::test]
    async fn test_reingestion_is_idempotent() {
        let fetcher = ScriptedFetcher::default()
            .page("https://a.test/", listing(&["/news/1", "/news/2"]))
            .page("https://a.test/news/1", article_page("One", "2024-03-02T10:00:00Z"))
            .page("https://a.test/news/2", article_page("Two", "2024-03-02T11:00:00Z"));
        let storage = Arc::new(InMemoryStorage::new());
        let (coordinator, fetcher) =
            coordinator(storage.clone(), fetcher, config(&[("A", "https://a.test/")], 2));

        assert_eq!(coordinator.ingest_all().await.total_new, 2);
        let before = storage.articles(&ExportFilter::All).await.unwrap();

        let second = coordinator.ingest_all().await;
        assert_eq!(second.total_new, 0);
        assert_eq!(second.sources[0].already_stored, 2);
        assert_eq!(storage.articles(&ExportFilter::All).await.unwrap(), before);
        // Second run only re-reads the listing.
        assert_eq!(fetcher.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_date_filter_is_inclusive() {
        let fetcher = ScriptedFetcher::default()
            .page(
                "https://a.test/",
                listing(&["/news/before", "/news/first", "/news/last", "/news/after"]),
            )
            .page("https://a.test/news/before", article_page("Before", "2024-02-29T23:59:59Z"))
            .page("https://a.test/news/first", article_page("First", "2024-03-01T00:00:00Z"))
            .page("https://a.test/news/last", article_page("Last", "2024-03-02T23:59:59Z"))
            .page("https://a.test/news/after", article_page("After", "2024-03-03T00:00:00Z"));
        let storage = Arc::new(InMemoryStorage::new());
        let (coordinator, _) =
            coordinator(storage.clone(), fetcher, config(&[("A", "https://a.test/")], 1));

        let range = DateRange::from_dates("2024-03-01", "2024-03-02").unwrap();
        let summary = coordinator.ingest_recent(range).await;

        assert_eq!(summary.total_new, 2);
        assert_eq!(summary.sources[0].out_of_range, 2);
        let mut titles: Vec<String> = storage
            .articles(&ExportFilter::All)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.title)
            .collect();
        titles.sort();
        assert_eq!(titles, vec!["First", "Last"]);

        let coverage = summary.coverage.expect("coverage report");
        assert_eq!(coverage.total, 2);
        assert!(coverage.missing_days.is_empty());
    }

    #[tokio::test]
    async fn test_listing_failure_does_not_stop_run() {
        let fetcher = ScriptedFetcher::default()
            .page("https://b.test/", listing(&["/story/ok", "/story/missing"]))
            .page("https://b.test/story/ok", article_page("Ok", "2024-03-02T10:00:00Z"));
        let storage = Arc::new(InMemoryStorage::new());
        let (coordinator, _) = coordinator(
            storage.clone(),
            fetcher,
            config(&[("Down", "https://a.test/"), ("Up", "https://b.test/")], 1),
        );

        let summary = coordinator.ingest_all().await;
        assert!(matches!(summary.sources[0].state, SourceState::Error(_)));
        assert_eq!(summary.sources[0].links_found, 0);
        assert_eq!(summary.sources[1].state, SourceState::Done);
        assert_eq!(summary.sources[1].added, 1);
        assert_eq!(summary.sources[1].errors, 1);
        assert_eq!(summary.total_new, 1);
        assert!(summary.to_string().contains("Total new articles: 1"));
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_fetching() {
        let fetcher = ScriptedFetcher::default()
            .page("https://a.test/", listing(&["/news/1"]))
            .page("https://a.test/news/1", article_page("One", "2024-03-02T10:00:00Z"));
        let storage = Arc::new(InMemoryStorage::new());
        let (coordinator, fetcher) =
            coordinator(storage.clone(), fetcher, config(&[("A", "https://a.test/")], 1));

        coordinator.cancellation_token().cancel();
        let summary = coordinator.ingest_all().await;
        assert!(summary.cancelled);
        assert!(summary.sources.is_empty());
        assert!(fetcher.requests().is_empty());
        assert_eq!(storage.count().await.unwrap(), 0);
    }

    /// Reports every URL as unseen, so concurrent workers all reach `insert`.
    struct UncheckedStorage(InMemoryStorage);

    #[async_trait]
    impl ArticleStorage for UncheckedStorage {
        async fn exists(&self, _url: &str) -> Result<bool> {
            Ok(false)
        }
        async fn insert(&self, article: &Article) -> Result<bool> {
            self.0.insert(article).await
        }
        async fn query_by_term(&self, term: &str) -> Result<Vec<ArticleSummary>> {
            self.0.query_by_term(term).await
        }
        async fn query_by_category(&self, category: Category) -> Result<Vec<ArticleSummary>> {
            self.0.query_by_category(category).await
        }
        async fn query_by_date_range(&self, range: &DateRange) -> Result<Vec<ArticleSummary>> {
            self.0.query_by_date_range(range).await
        }
        async fn query_recent(&self, limit: usize) -> Result<Vec<ArticleSummary>> {
            self.0.query_recent(limit).await
        }
        async fn articles(&self, filter: &ExportFilter) -> Result<Vec<Article>> {
            self.0.articles(filter).await
        }
        async fn search_terms(&self) -> Result<Vec<SearchTerm>> {
            self.0.search_terms().await
        }
        async fn count(&self) -> Result<usize> {
            self.0.count().await
        }
    }

    #[tokio::test]
    async fn test_concurrent_runs_store_overlapping_links_once() {
        let pages = || {
            ScriptedFetcher::default()
                .page("https://a.test/", listing(&["/news/1", "/news/2", "/news/3"]))
                .page("https://a.test/news/1", article_page("One", "2024-03-02T10:00:00Z"))
                .page("https://a.test/news/2", article_page("Two", "2024-03-02T11:00:00Z"))
                .page("https://a.test/news/3", article_page("Three", "2024-03-02T12:00:00Z"))
        };
        let storage = Arc::new(UncheckedStorage(InMemoryStorage::new()));
        let config = config(&[("A", "https://a.test/")], 3);
        let first = IngestionCoordinator::new(storage.clone(), Arc::new(pages()), config.clone()).unwrap();
        let second = IngestionCoordinator::new(storage.clone(), Arc::new(pages()), config).unwrap();

        let (left, right) = tokio::join!(first.ingest_all(), second.ingest_all());

        assert_eq!(left.total_new + right.total_new, 3);
        assert_eq!(
            left.sources[0].already_stored + right.sources[0].already_stored,
            3
        );
        assert_eq!(left.sources[0].errors + right.sources[0].errors, 0);
        assert_eq!(storage.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_coverage_after_ingest_spans_whole_days() {
        let storage = Arc::new(InMemoryStorage::new());
        let now = Utc::now();
        let range = DateRange::last_days(now, 7).unwrap();
        let first_day = range.start.date_naive();

        let early = ArticleDraft {
            title: "Early bird".to_string(),
            author: "Desk".to_string(),
            published_at: start_of_day(first_day) + chrono::Duration::seconds(1),
            content: "Markets opened.".to_string(),
            summary: "Markets opened.".to_string(),
            keywords: Vec::new(),
        }
        .into_article("https://a.test/news/early", "A", Category::Markets, now);
        storage.insert(&early).await.unwrap();

        let fetcher = ScriptedFetcher::default().page("https://a.test/", listing(&[]));
        let (coordinator, _) =
            coordinator(storage.clone(), fetcher, config(&[("A", "https://a.test/")], 1));
        let summary = coordinator.ingest_recent(range).await;

        let coverage = summary.coverage.expect("coverage report");
        assert_eq!(coverage.start, first_day);
        assert_eq!(coverage.total, 1);
        assert!(!coverage.missing_days.contains(&first_day));
    }

    #[test]
    fn test_eta_needs_progress() {
        assert_eq!(estimate_remaining(0, 10, Duration::from_secs(5)), None);
        assert_eq!(
            estimate_remaining(2, 10, Duration::from_secs(4)),
            Some(Duration::from_secs(16))
        );
        assert_eq!(
            estimate_remaining(10, 10, Duration::from_secs(4)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let bad = Arc::new(ScraperConfig {
            concurrency: 0,
            ..ScraperConfig::default()
        });
        let result = IngestionCoordinator::new(
            Arc::new(InMemoryStorage::new()),
            Arc::new(ScriptedFetcher::default()),
            bad,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
