use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to spawn transcoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transcoder has no output pipe")]
    MissingOutput,

    #[error("Invalid media stream: {0}")]
    Stream(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
