use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store could not be opened or initialized.
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Extraction failed for {url}: {reason}")]
    Extraction { url: String, reason: String },

    #[error("Unparseable time: {0:?}")]
    UnparseableTime(String),

    /// A single store operation failed; the store itself is still usable.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid date input: {0}")]
    InvalidDateInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn extraction(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::Extraction {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a pipeline run may continue past this error.
    ///
    /// Only a store that cannot be opened and a broken configuration are fatal;
    /// everything else degrades a single article or source.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Database(_) | Error::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
