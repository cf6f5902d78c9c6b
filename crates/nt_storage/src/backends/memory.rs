use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nt_core::{
    Article, ArticleStorage, ArticleSummary, Category, DateRange, ExportFilter, Result, SearchTerm,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryStore {
    /// Insertion order doubles as the row id used for tie-breaking.
    articles: Vec<Article>,
    urls: HashSet<String>,
    search_terms: HashMap<String, DateTime<Utc>>,
}

impl MemoryStore {
    fn insert(&mut self, article: &Article) -> bool {
        if !self.urls.insert(article.url.clone()) {
            return false;
        }
        self.articles.push(article.clone());
        true
    }

    /// Matching rows newest-first by `key`, later insertions first on ties.
    fn summaries_by<F, K>(&self, filter: F, key: K) -> Vec<ArticleSummary>
    where
        F: Fn(&Article) -> bool,
        K: Fn(&Article) -> DateTime<Utc>,
    {
        let mut rows: Vec<(usize, &Article)> = self
            .articles
            .iter()
            .enumerate()
            .filter(|(_, article)| filter(article))
            .collect();
        rows.sort_by(|(ia, a), (ib, b)| key(b).cmp(&key(a)).then(ib.cmp(ia)));
        rows.into_iter().map(|(_, article)| article.into()).collect()
    }
}

/// Process-local store, mainly for tests and dry runs.
#[derive(Default)]
pub struct InMemoryStorage {
    store: RwLock<MemoryStore>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

#[async_trait]
impl ArticleStorage for InMemoryStorage {
    async fn exists(&self, url: &str) -> Result<bool> {
        Ok(self.store.read().await.urls.contains(url))
    }

    async fn insert(&self, article: &Article) -> Result<bool> {
        Ok(self.store.write().await.insert(article))
    }

    async fn query_by_term(&self, term: &str) -> Result<Vec<ArticleSummary>> {
        let mut store = self.store.write().await;
        store.search_terms.insert(term.to_string(), Utc::now());

        let needle = term.to_lowercase();
        Ok(store.summaries_by(
            |a| {
                contains_ignore_case(&a.title, &needle)
                    || contains_ignore_case(&a.content, &needle)
                    || contains_ignore_case(&a.summary, &needle)
            },
            |a| a.published_at,
        ))
    }

    async fn query_by_category(&self, category: Category) -> Result<Vec<ArticleSummary>> {
        let store = self.store.read().await;
        Ok(store.summaries_by(|a| a.category == category, |a| a.published_at))
    }

    async fn query_by_date_range(&self, range: &DateRange) -> Result<Vec<ArticleSummary>> {
        let store = self.store.read().await;
        Ok(store.summaries_by(|a| range.contains(&a.published_at), |a| a.published_at))
    }

    async fn query_recent(&self, limit: usize) -> Result<Vec<ArticleSummary>> {
        let store = self.store.read().await;
        let mut rows = store.summaries_by(|_| true, |a| a.retrieved_at);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn articles(&self, filter: &ExportFilter) -> Result<Vec<Article>> {
        let store = self.store.read().await;
        Ok(store
            .articles
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn search_terms(&self) -> Result<Vec<SearchTerm>> {
        let store = self.store.read().await;
        let mut terms: Vec<SearchTerm> = store
            .search_terms
            .iter()
            .map(|(term, last_searched)| SearchTerm {
                term: term.clone(),
                last_searched: *last_searched,
            })
            .collect();
        terms.sort_by(|a, b| {
            b.last_searched
                .cmp(&a.last_searched)
                .then_with(|| a.term.cmp(&b.term))
        });
        Ok(terms)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.store.read().await.articles.len())
    }
}
