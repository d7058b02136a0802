//! Error taxonomy for the contact discovery pipeline.
//!
//! Per-URL failures are isolated: fetch/extraction/validation errors are
//! converted into error-carrying results at the component boundary and never
//! cancel sibling work. Only configuration and store setup errors are allowed
//! to surface from `main`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("robots.txt disallows fetching {0}")]
    RobotsBlocked(String),

    #[error("timeout while fetching {0}")]
    Timeout(String),

    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("HTTP status {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("artifact at {url} too large: {size} bytes (cap {cap})")]
    TooLarge { url: String, size: u64, cap: u64 },

    #[error("parse error in {component} for {url}: {reason}")]
    Parse {
        component: &'static str,
        url: String,
        reason: String,
    },

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("store pool error: {0}")]
    Pool(String),

    #[error("store conflict on ({listing_id:?}, {method}, {value})")]
    StoreConflict {
        listing_id: Option<i64>,
        method: String,
        value: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<mobc::Error<rusqlite::Error>> for ScoutError {
    fn from(err: mobc::Error<rusqlite::Error>) -> Self {
        match err {
            mobc::Error::Inner(e) => ScoutError::Store(e),
            other => ScoutError::Pool(other.to_string()),
        }
    }
}

impl ScoutError {
    /// Compact tag for stats counters and stored error strings.
    pub fn kind(&self) -> &'static str {
        match self {
            ScoutError::InvalidUrl { .. } => "invalid_url",
            ScoutError::RobotsBlocked(_) => "robots_blocked",
            ScoutError::Timeout(_) => "timeout",
            ScoutError::Network { .. } => "network",
            ScoutError::HttpStatus { .. } => "http_status",
            ScoutError::TooLarge { .. } => "too_large",
            ScoutError::Parse { .. } => "parse",
            ScoutError::Store(_) => "store",
            ScoutError::Pool(_) => "store_pool",
            ScoutError::StoreConflict { .. } => "store_conflict",
            ScoutError::Config(_) => "config",
            ScoutError::Io(_) => "io",
            ScoutError::Json(_) => "json",
            ScoutError::Cancelled => "cancelled",
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_stable() {
        assert_eq!(
            ScoutError::RobotsBlocked("https://x.de/a".into()).kind(),
            "robots_blocked"
        );
        assert_eq!(
            ScoutError::HttpStatus {
                url: "https://x.de".into(),
                status: 503
            }
            .kind(),
            "http_status"
        );
        assert_eq!(ScoutError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn errors_carry_offending_url() {
        let err = ScoutError::Timeout("https://acme.de/kontakt".into());
        assert!(err.to_string().contains("https://acme.de/kontakt"));
    }
}
