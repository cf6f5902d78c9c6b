use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dates::{timestamp_format, truncate_to_seconds};

/// Author recorded when no byline can be found.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Topical label assigned to every stored article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Stocks,
    Cryptocurrency,
    Economy,
    Markets,
    Business,
    PersonalFinance,
    RealEstate,
    General,
}

impl Category {
    /// Scored categories in declaration order. Ties resolve to the earliest.
    pub const SCORED: [Category; 7] = [
        Category::Stocks,
        Category::Cryptocurrency,
        Category::Economy,
        Category::Markets,
        Category::Business,
        Category::PersonalFinance,
        Category::RealEstate,
    ];

    pub const ALL: [Category; 8] = [
        Category::Stocks,
        Category::Cryptocurrency,
        Category::Economy,
        Category::Markets,
        Category::Business,
        Category::PersonalFinance,
        Category::RealEstate,
        Category::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Stocks => "stocks",
            Category::Cryptocurrency => "cryptocurrency",
            Category::Economy => "economy",
            Category::Markets => "markets",
            Category::Business => "business",
            Category::PersonalFinance => "personal_finance",
            Category::RealEstate => "real_estate",
            Category::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

/// A persisted article. `url` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub source: String,
    pub author: String,
    #[serde(rename = "publish_date", with = "timestamp_format")]
    pub published_at: DateTime<Utc>,
    pub content: String,
    pub summary: String,
    #[serde(with = "keyword_list")]
    pub keywords: Vec<String>,
    #[serde(rename = "retrieved_date", with = "timestamp_format")]
    pub retrieved_at: DateTime<Utc>,
    pub category: Category,
}

/// Extracted but not yet persisted article fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleDraft {
    pub title: String,
    pub author: String,
    pub published_at: DateTime<Utc>,
    pub content: String,
    pub summary: String,
    pub keywords: Vec<String>,
}

impl ArticleDraft {
    pub fn into_article(
        self,
        url: impl Into<String>,
        source: impl Into<String>,
        category: Category,
        retrieved_at: DateTime<Utc>,
    ) -> Article {
        Article {
            url: url.into(),
            title: self.title,
            source: source.into(),
            author: self.author,
            published_at: truncate_to_seconds(self.published_at),
            content: self.content,
            summary: self.summary,
            keywords: self.keywords,
            retrieved_at: truncate_to_seconds(retrieved_at),
            category,
        }
    }
}

/// Row shape returned by listing queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleSummary {
    pub url: String,
    pub title: String,
    pub source: String,
    #[serde(rename = "publish_date", with = "timestamp_format")]
    pub published_at: DateTime<Utc>,
    pub summary: String,
    pub category: Category,
}

impl From<&Article> for ArticleSummary {
    fn from(article: &Article) -> Self {
        Self {
            url: article.url.clone(),
            title: article.title.clone(),
            source: article.source.clone(),
            published_at: article.published_at,
            summary: article.summary.clone(),
            category: article.category,
        }
    }
}

/// Last time a search term was queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTerm {
    pub term: String,
    #[serde(rename = "last_search", with = "timestamp_format")]
    pub last_searched: DateTime<Utc>,
}

pub fn join_keywords(keywords: &[String]) -> String {
    keywords.join(",")
}

pub fn split_keywords(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',').map(str::to_string).collect()
}

/// Keywords are stored and exported as one comma-joined column.
pub mod keyword_list {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(keywords: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::join_keywords(keywords))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(super::split_keywords(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_category_parse_and_display() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert_eq!("Real_Estate".parse::<Category>().unwrap(), Category::RealEstate);
        assert!("sports".parse::<Category>().is_err());
        assert_eq!(Category::PersonalFinance.to_string(), "personal_finance");
    }

    #[test]
    fn test_article_serializes_storage_columns() {
        let article = Article {
            url: "https://example.com/news/1".to_string(),
            title: "Rates hold".to_string(),
            source: "CNBC".to_string(),
            author: UNKNOWN_AUTHOR.to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            content: "Body".to_string(),
            summary: "Body".to_string(),
            keywords: vec!["fed".to_string(), "rates".to_string()],
            retrieved_at: Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap(),
            category: Category::Economy,
        };

        let value = serde_json::to_value(&article).unwrap();
        assert_eq!(value["publish_date"], "2024-01-02 03:04:05");
        assert_eq!(value["retrieved_date"], "2024-01-03 00:00:00");
        assert_eq!(value["keywords"], "fed,rates");
        assert_eq!(value["category"], "economy");

        let back: Article = serde_json::from_value(value).unwrap();
        assert_eq!(back, article);
    }

    #[test]
    fn test_empty_keywords_stay_empty() {
        assert!(split_keywords("").is_empty());
        assert_eq!(join_keywords(&[]), "");
    }

    #[test]
    fn test_draft_drops_subsecond_precision() {
        let draft = ArticleDraft {
            title: "t".into(),
            author: UNKNOWN_AUTHOR.into(),
            published_at: Utc.timestamp_opt(1_700_000_000, 500).unwrap(),
            content: String::new(),
            summary: String::new(),
            keywords: vec![],
        };
        let article = draft.into_article(
            "https://x.test/a",
            "X",
            Category::General,
            Utc.timestamp_opt(1_700_000_100, 42).unwrap(),
        );
        assert_eq!(article.published_at.timestamp_subsec_nanos(), 0);
        assert_eq!(article.retrieved_at.timestamp(), 1_700_000_100);
    }
}
