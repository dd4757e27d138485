use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("missing API key (set {var})")]
    MissingApiKey { var: &'static str },

    #[error("invalid embedder configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
