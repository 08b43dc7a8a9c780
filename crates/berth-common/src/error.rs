use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to decode payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Payload carries no box")]
    MissingBox,

    #[error("Invalid box in payload: {0}")]
    InvalidBox(#[source] serde_json::Error),

    #[error("Invalid box name '{0}': must be a single path segment")]
    InvalidBoxName(String),

    #[error("Invalid tosca descriptor '{0}': expected at least three dot-separated segments")]
    InvalidTosca(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Status store error: {0}")]
    StatusStore(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
