use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PodSyncError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("No peers available for request destinations")]
    NoPeers,

    #[error("Directory error: {0}")]
    Directory(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),
}

pub type Result<T> = std::result::Result<T, PodSyncError>;

impl From<std::io::Error> for PodSyncError {
    fn from(e: std::io::Error) -> Self {
        PodSyncError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for PodSyncError {
    fn from(e: serde_json::Error) -> Self {
        PodSyncError::Json(e.to_string())
    }
}
