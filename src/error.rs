use thiserror::Error;

/// Failure reading the candidate collection.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("credentials: {0}")]
    Credentials(String),

    #[error("token exchange failed: {0}")]
    Token(String),

    #[error("document store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("document store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("reading catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed catalog data: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Request-fatal errors. Per-candidate failures never surface here.
#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
