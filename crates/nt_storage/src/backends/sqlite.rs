use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use nt_core::dates::{format_timestamp, parse_timestamp};
use nt_core::types::{join_keywords, split_keywords};
use nt_core::{
    Article, ArticleStorage, ArticleSummary, Category, DateRange, Error, ExportFilter, Result,
    SearchTerm,
};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite};
use tracing::{debug, info};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        url TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        source TEXT NOT NULL,
        author TEXT NOT NULL,
        publish_date TEXT NOT NULL,
        content TEXT,
        summary TEXT,
        keywords TEXT,
        retrieved_date TEXT NOT NULL,
        category TEXT NOT NULL,
        search_text TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS search_terms (
        term TEXT PRIMARY KEY,
        last_search TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_publish_date ON articles (publish_date)",
    "CREATE INDEX IF NOT EXISTS idx_articles_retrieved_date ON articles (retrieved_date)",
    // Add future migrations here
];

/// Separates fields in `search_text` so a term cannot match across them.
const SEARCH_FIELD_SEPARATOR: char = '\u{1f}';

/// Title, content and summary folded with Unicode case rules. SQLite's own
/// `lower()` only folds ASCII.
fn search_text(title: &str, content: &str, summary: &str) -> String {
    [title, content, summary]
        .join(&SEARCH_FIELD_SEPARATOR.to_string())
        .to_lowercase()
}

const SUMMARY_COLUMNS: &str = "url, title, source, publish_date, summary, category";

pub struct SQLiteStorage {
    pool: SqlitePool,
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Database(format!("Failed to create database directory: {}", e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect to database: {}", e)))?;

        let storage = Self { pool };
        storage.migrate().await?;
        info!(path = %db_path.display(), "SQLite storage ready");
        Ok(storage)
    }

    /// A private database that lives as long as this handle.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| Error::Database(format!("Invalid in-memory options: {}", e)))?;
        // Every connection to :memory: is a separate database, so pin one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| Error::Database(format!("Failed to open in-memory database: {}", e)))?;

        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> Result<()> {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to run migration {}: {}", i, e)))?;
        }
        self.migrate_search_text().await?;
        debug!(count = MIGRATIONS.len(), "Migrations applied");
        Ok(())
    }

    /// Adds and backfills `search_text` on databases created without it.
    async fn migrate_search_text(&self) -> Result<()> {
        let columns: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('articles') WHERE name = 'search_text'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to inspect articles table: {}", e)))?;
        if columns == 0 {
            sqlx::query("ALTER TABLE articles ADD COLUMN search_text TEXT")
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to add search_text: {}", e)))?;
        }

        let rows = sqlx::query("SELECT url, title, content, summary FROM articles WHERE search_text IS NULL")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to read rows to backfill: {}", e)))?;
        for row in &rows {
            let url: String = column(row, "url")?;
            let text = search_text(
                &column::<String>(row, "title")?,
                &text_column(row, "content")?,
                &text_column(row, "summary")?,
            );
            sqlx::query("UPDATE articles SET search_text = ? WHERE url = ?")
                .bind(text)
                .bind(&url)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to backfill {}: {}", url, e)))?;
        }
        if !rows.is_empty() {
            info!(count = rows.len(), "Backfilled search text");
        }
        Ok(())
    }

    async fn fetch_summaries<'q>(
        &self,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
        what: &str,
    ) -> Result<Vec<ArticleSummary>> {
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to query {}: {}", what, e)))?;
        rows.iter().map(row_to_summary).collect()
    }
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| Error::Storage(format!("Failed to read column {}: {}", name, e)))
}

fn text_column(row: &SqliteRow, name: &str) -> Result<String> {
    Ok(column::<Option<String>>(row, name)?.unwrap_or_default())
}

fn category_column(row: &SqliteRow) -> Result<Category> {
    let raw: String = column(row, "category")?;
    raw.parse().map_err(Error::Storage)
}

fn row_to_summary(row: &SqliteRow) -> Result<ArticleSummary> {
    Ok(ArticleSummary {
        url: column(row, "url")?,
        title: column(row, "title")?,
        source: column(row, "source")?,
        published_at: parse_timestamp(&column::<String>(row, "publish_date")?)?,
        summary: text_column(row, "summary")?,
        category: category_column(row)?,
    })
}

fn row_to_article(row: &SqliteRow) -> Result<Article> {
    Ok(Article {
        url: column(row, "url")?,
        title: column(row, "title")?,
        source: column(row, "source")?,
        author: column(row, "author")?,
        published_at: parse_timestamp(&column::<String>(row, "publish_date")?)?,
        content: text_column(row, "content")?,
        summary: text_column(row, "summary")?,
        keywords: split_keywords(&text_column(row, "keywords")?),
        retrieved_at: parse_timestamp(&column::<String>(row, "retrieved_date")?)?,
        category: category_column(row)?,
    })
}

#[async_trait]
impl ArticleStorage for SQLiteStorage {
    async fn exists(&self, url: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM articles WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to look up article: {}", e)))?;
        Ok(row.is_some())
    }

    async fn insert(&self, article: &Article) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles
            (url, title, source, author, publish_date, content, summary, keywords, retrieved_date, category, search_text)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.source)
        .bind(&article.author)
        .bind(format_timestamp(&article.published_at))
        .bind(&article.content)
        .bind(&article.summary)
        .bind(join_keywords(&article.keywords))
        .bind(format_timestamp(&article.retrieved_at))
        .bind(article.category.as_str())
        .bind(search_text(&article.title, &article.content, &article.summary))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to store article: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn query_by_term(&self, term: &str) -> Result<Vec<ArticleSummary>> {
        sqlx::query(
            r#"
            INSERT INTO search_terms (term, last_search) VALUES (?, ?)
            ON CONFLICT(term) DO UPDATE SET last_search = excluded.last_search
            "#,
        )
        .bind(term)
        .bind(format_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to record search term: {}", e)))?;

        let needle = term.to_lowercase();
        let sql = format!(
            r#"
            SELECT {SUMMARY_COLUMNS} FROM articles
            WHERE instr(search_text, ?) > 0
            ORDER BY publish_date DESC, rowid DESC
            "#
        );
        let query = sqlx::query(&sql).bind(needle);
        self.fetch_summaries(query, "articles by term").await
    }

    async fn query_by_category(&self, category: Category) -> Result<Vec<ArticleSummary>> {
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM articles WHERE category = ? ORDER BY publish_date DESC, rowid DESC"
        );
        let query = sqlx::query(&sql).bind(category.as_str());
        self.fetch_summaries(query, "articles by category").await
    }

    async fn query_by_date_range(&self, range: &DateRange) -> Result<Vec<ArticleSummary>> {
        let sql = format!(
            r#"
            SELECT {SUMMARY_COLUMNS} FROM articles
            WHERE publish_date >= ? AND publish_date <= ?
            ORDER BY publish_date DESC, rowid DESC
            "#
        );
        let query = sqlx::query(&sql)
            .bind(format_timestamp(&range.start))
            .bind(format_timestamp(&range.end));
        self.fetch_summaries(query, "articles by date range").await
    }

    async fn query_recent(&self, limit: usize) -> Result<Vec<ArticleSummary>> {
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM articles ORDER BY retrieved_date DESC, rowid DESC LIMIT ?"
        );
        let query = sqlx::query(&sql).bind(i64::try_from(limit).unwrap_or(i64::MAX));
        self.fetch_summaries(query, "recent articles").await
    }

    async fn articles(&self, filter: &ExportFilter) -> Result<Vec<Article>> {
        let base = "SELECT url, title, source, author, publish_date, content, summary, keywords, retrieved_date, category FROM articles";
        let rows = match filter {
            ExportFilter::All => {
                sqlx::query(&format!("{base} ORDER BY rowid"))
                    .fetch_all(&self.pool)
                    .await
            }
            ExportFilter::DateRange(range) => {
                sqlx::query(&format!(
                    "{base} WHERE publish_date >= ? AND publish_date <= ? ORDER BY rowid"
                ))
                .bind(format_timestamp(&range.start))
                .bind(format_timestamp(&range.end))
                .fetch_all(&self.pool)
                .await
            }
            ExportFilter::Category(category) => {
                sqlx::query(&format!("{base} WHERE category = ? ORDER BY rowid"))
                    .bind(category.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            ExportFilter::Source(source) => {
                sqlx::query(&format!("{base} WHERE source = ? ORDER BY rowid"))
                    .bind(source)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| Error::Storage(format!("Failed to read articles: {}", e)))?;

        rows.iter().map(row_to_article).collect()
    }

    async fn search_terms(&self) -> Result<Vec<SearchTerm>> {
        let rows = sqlx::query("SELECT term, last_search FROM search_terms ORDER BY last_search DESC, term")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to read search terms: {}", e)))?;

        rows.iter()
            .map(|row| {
                Ok(SearchTerm {
                    term: column(row, "term")?,
                    last_searched: parse_timestamp(&column::<String>(row, "last_search")?)?,
                })
            })
            .collect()
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to count articles: {}", e)))?;
        Ok(count as usize)
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
