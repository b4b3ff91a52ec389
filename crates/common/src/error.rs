use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Telemetry validation failed: {}", reasons.join("; "))]
    Validation { reasons: Vec<String> },

    #[error("Telemetry document error: {0}")]
    Telemetry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes of a live platform lookup.
///
/// "Not found" is not an error: lookups return `Ok(None)` for it.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("{0} discovery is not available in this environment")]
    Unavailable(String),

    #[error("not connected to {0}")]
    NotConnected(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(String),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("image not found in catalog: {0}")]
    ImageNotFound(String),

    #[error("malformed catalog response: {0}")]
    Malformed(String),
}
