use thiserror::Error;

/// Errors produced by the nodebase libraries.
#[derive(Debug, Error)]
pub enum NodebaseError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for NodebaseError {
    fn from(e: serde_json::Error) -> Self {
        NodebaseError::Codec(e.to_string())
    }
}

pub type NodebaseResult<T> = Result<T, NodebaseError>;
