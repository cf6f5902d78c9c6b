//! Heuristic article extraction.
//!
//! Every field is read through an ordered list of candidate selectors; the
//! first candidate that yields a non-empty value wins, otherwise the field
//! falls back to its default.

use chrono::{DateTime, Utc};
use nt_core::{ArticleDraft, Error, Result, UNKNOWN_AUTHOR};
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use crate::time::parse_publish_time;

const AUTHOR_SELECTORS: &[&str] = &["a[rel=\"author\"]", "span.author", ".byline", ".author"];

const PUBLISHED_SELECTORS: &[&str] = &[
    "time",
    ".date",
    ".published",
    "meta[property=\"article:published_time\"]",
];

const CONTENT_SELECTORS: &[&str] = &[
    "article",
    ".article-body",
    ".article-content",
    ".story-body",
    ".post-content",
    ".entry-content",
    ".content",
    "#content",
    "[itemprop=\"articleBody\"]",
    ".body",
];

pub const SUMMARY_MAX_CHARS: usize = 500;
const SUMMARY_PARAGRAPHS: usize = 2;
const ELLIPSIS: &str = "...";

fn compile(selectors: &[&str]) -> Result<Vec<Selector>> {
    selectors.iter().map(|css| compile_one(css)).collect()
}

fn compile_one(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::extraction(css, format!("invalid selector: {}", e)))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Meta tags carry their value in `content`, `<time>` prefers `datetime`.
fn date_text(element: ElementRef<'_>) -> Option<String> {
    let value = element.value();
    let attribute = match value.name() {
        "meta" => value.attr("content"),
        "time" => value.attr("datetime"),
        _ => None,
    };
    match attribute.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => Some(v.to_string()),
        None if value.name() == "meta" => None,
        None => non_empty(element_text(element)),
    }
}

/// Cap a summary at [`SUMMARY_MAX_CHARS`] characters including the ellipsis.
pub fn truncate_summary(summary: &str) -> String {
    if summary.chars().count() <= SUMMARY_MAX_CHARS {
        return summary.to_string();
    }
    let kept: String = summary
        .chars()
        .take(SUMMARY_MAX_CHARS - ELLIPSIS.len())
        .collect();
    format!("{}{}", kept, ELLIPSIS)
}

pub struct ArticleExtractor {
    title: Selector,
    authors: Vec<Selector>,
    published: Vec<Selector>,
    containers: Vec<Selector>,
    body: Selector,
    paragraph: Selector,
    keywords: Selector,
}

impl ArticleExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            title: compile_one("title")?,
            authors: compile(AUTHOR_SELECTORS)?,
            published: compile(PUBLISHED_SELECTORS)?,
            containers: compile(CONTENT_SELECTORS)?,
            body: compile_one("body")?,
            paragraph: compile_one("p")?,
            keywords: compile_one("meta[name=\"keywords\"]")?,
        })
    }

    /// Build a draft from a fetched page. `now` stands in for publish times
    /// that are missing or unreadable.
    pub fn extract(&self, html: &str, url: &str, now: DateTime<Utc>) -> Result<ArticleDraft> {
        if html.trim().is_empty() {
            return Err(Error::extraction(url, "empty document"));
        }
        let document = Html::parse_document(html);

        let paragraphs = self.paragraphs(&document);
        let summary = truncate_summary(
            &paragraphs
                .iter()
                .take(SUMMARY_PARAGRAPHS)
                .cloned()
                .collect::<Vec<_>>()
                .join("\n\n"),
        );

        Ok(ArticleDraft {
            title: self.title(&document),
            author: self.author(&document),
            published_at: self.published_at(&document, url, now),
            content: paragraphs.join("\n\n"),
            summary,
            keywords: self.keywords(&document),
        })
    }

    fn title(&self, document: &Html) -> String {
        document
            .select(&self.title)
            .next()
            .map(element_text)
            .unwrap_or_default()
    }

    fn author(&self, document: &Html) -> String {
        self.authors
            .iter()
            .flat_map(|selector| document.select(selector))
            .find_map(|el| non_empty(element_text(el)))
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
    }

    fn published_at(&self, document: &Html, url: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        let Some(text) = self
            .published
            .iter()
            .flat_map(|selector| document.select(selector))
            .find_map(date_text)
        else {
            return now;
        };

        match parse_publish_time(&text, now) {
            Ok(published) => published,
            Err(e) => {
                warn!(url, date = %text, error = %e, "Could not parse publish date");
                now
            }
        }
    }

    /// Paragraph text of the first container holding any, else of the body.
    fn paragraphs(&self, document: &Html) -> Vec<String> {
        let collect = |container: ElementRef<'_>| -> Vec<String> {
            container
                .select(&self.paragraph)
                .map(element_text)
                .filter(|p| !p.is_empty())
                .collect()
        };

        self.containers
            .iter()
            .flat_map(|selector| document.select(selector))
            .map(collect)
            .find(|paragraphs| !paragraphs.is_empty())
            .or_else(|| document.select(&self.body).next().map(collect))
            .unwrap_or_default()
    }

    fn keywords(&self, document: &Html) -> Vec<String> {
        document
            .select(&self.keywords)
            .next()
            .and_then(|meta| meta.value().attr("content"))
            .map(|content| {
                content
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}
