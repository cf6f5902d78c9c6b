use std::collections::HashSet;

use lazy_static::lazy_static;
use nt_core::{Error, Result};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{info, instrument};
use url::Url;

use crate::config::NewsSource;
use crate::fetcher::Fetcher;

const ARTICLE_PATH_MARKERS: &[&str] = &["/article/", "/news/", "/story/"];
const SKIPPED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".pdf"];

lazy_static! {
    static ref YEAR_SEGMENT: Regex = Regex::new(r"/(19|20)\d{2}/").unwrap();
}

fn looks_like_article(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    if SKIPPED_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return false;
    }
    ARTICLE_PATH_MARKERS.iter().any(|marker| path.contains(marker)) || YEAR_SEGMENT.is_match(&path)
}

/// Article-shaped links found in a listing page, in document order and
/// without duplicates. Relative references resolve against the page's origin.
pub fn extract_links(listing_url: &str, html: &str) -> Result<Vec<String>> {
    let page = Url::parse(listing_url)?;
    let origin = Url::parse(&page.origin().ascii_serialization())?;
    let anchors = Selector::parse("a[href]")
        .map_err(|e| Error::extraction(listing_url, format!("invalid selector: {}", e)))?;

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = origin.join(href.trim()) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") || !looks_like_article(&resolved) {
            continue;
        }
        let resolved = resolved.to_string();
        if seen.insert(resolved.clone()) {
            links.push(resolved);
        }
    }

    Ok(links)
}

/// Fetch a source's listing page and extract its article links.
#[instrument(level = "info", skip(fetcher, source), fields(source = %source.name))]
pub async fn try_discover(fetcher: &dyn Fetcher, source: &NewsSource) -> Result<Vec<String>> {
    info!(url = %source.url, "Scraping links");
    let page = fetcher.fetch(&source.url).await?;
    let links = extract_links(&source.url, &page.body)?;
    info!(count = links.len(), "Found potential article links");
    Ok(links)
}
