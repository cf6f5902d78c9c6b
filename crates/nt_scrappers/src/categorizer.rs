use nt_core::Category;

/// Keyword phrases per scored category. Matching is substring presence on
/// lower-cased text, so "stock" also counts inside "stockholders".
fn keywords_for(category: Category) -> &'static [&'static str] {
    match category {
        Category::Stocks => &["stock", "stocks", "equities", "nasdaq", "dow jones", "nyse", "s&p"],
        Category::Cryptocurrency => &[
            "bitcoin",
            "ethereum",
            "crypto",
            "blockchain",
            "token",
            "cryptocurrency",
        ],
        Category::Economy => &[
            "economy",
            "gdp",
            "inflation",
            "recession",
            "economic growth",
            "fed",
            "federal reserve",
        ],
        Category::Markets => &["market", "trading", "trader", "bulls", "bears", "rally", "correction"],
        Category::Business => &[
            "company",
            "earnings",
            "revenue",
            "profit",
            "ceo",
            "startup",
            "merger",
            "acquisition",
        ],
        Category::PersonalFinance => &[
            "investing",
            "retirement",
            "mortgage",
            "loan",
            "credit",
            "debt",
            "saving",
        ],
        Category::RealEstate => &[
            "housing",
            "real estate",
            "property",
            "mortgage",
            "commercial real estate",
        ],
        Category::General => &[],
    }
}

/// Number of the category's phrases present in `text` (already lower-cased).
fn score(category: Category, text: &str) -> usize {
    keywords_for(category)
        .iter()
        .filter(|keyword| text.contains(*keyword))
        .count()
}

/// Pick the category whose phrases occur most often in title and content.
///
/// Ties go to the category declared first in [`Category::SCORED`]; no match
/// at all is [`Category::General`].
pub fn categorize(title: &str, content: &str) -> Category {
    let text = format!("{} {}", title, content).to_lowercase();

    let mut best = Category::General;
    let mut best_score = 0;
    for category in Category::SCORED {
        let score = score(category, &text);
        if score > best_score {
            best = category;
            best_score = score;
        }
    }
    best
}
