pub mod dates;
pub mod error;
pub mod storage;
pub mod types;

pub use dates::DateRange;
pub use error::{Error, Result};
pub use storage::{ArticleStorage, ExportFilter};
pub use types::{Article, ArticleDraft, ArticleSummary, Category, SearchTerm, UNKNOWN_AUTHOR};
