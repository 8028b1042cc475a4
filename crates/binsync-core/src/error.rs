use thiserror::Error;

/// Errors that can occur in binsync-core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("replication stream error: {0}")]
    Stream(String),

    #[error("unknown operation kind: {0} (expected `delete` or `update`)")]
    UnknownSkipOp(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
