use thiserror::Error;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("failed to read service account key {path}: {source}")]
    Credentials {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("API base URL cannot carry path segments: {0}")]
    InvalidBaseUrl(String),

    #[error("Sheets API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("the header row in worksheet is not unique: duplicated {duplicates:?}")]
    DuplicateHeaders { duplicates: Vec<String> },

    #[error("expected headers rejected: {reason}")]
    ExpectedHeaders { reason: String },
}

impl SheetError {
    /// True for the failure that the header fallback table can recover from.
    pub fn is_duplicate_headers(&self) -> bool {
        matches!(self, SheetError::DuplicateHeaders { .. })
    }
}
