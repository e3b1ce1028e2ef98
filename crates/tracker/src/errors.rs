use footfall_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("storage unavailable: {0}")]
    Storage(String),
    #[error("malformed stored state under {key}")]
    MalformedState { key: String },
    #[error("event transmission failed: {0}")]
    Transport(String),
    #[error("host {host} is not allow-listed")]
    UnauthorizedDomain { host: String },
    #[error("no async runtime available")]
    NoRuntime,
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<StorageError> for TrackError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Malformed { key, .. } => TrackError::MalformedState { key },
            other => TrackError::Storage(other.to_string()),
        }
    }
}

pub type TrackResult<T> = Result<T, TrackError>;
