use thiserror::Error;

/// Failures reported by the collaborators around the trainer core.
/// None of them are fatal; callers log and carry on.
#[derive(Debug, Error)]
pub enum Error {
    #[error("catalog fetch failed: {0}")]
    CatalogFetch(String),
    #[error("catalog request failed: {0}")]
    CatalogHttp(#[from] reqwest::Error),
    #[error("catalog is not valid JSON: {0}")]
    CatalogJson(#[from] serde_json::Error),
    #[error("catalog file unreadable: {0}")]
    CatalogIo(#[from] std::io::Error),
    #[error("audio trigger failed: {0}")]
    AudioTrigger(String),
    #[error("exercise {exercise:?} references unmapped key {key:?}")]
    UnknownKey { exercise: String, key: String },
}
