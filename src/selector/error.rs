use thiserror::Error;

/// Reasons a completion cannot be turned into selections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("response contains no JSON array or object")]
    NoJson,

    #[error("unbalanced JSON starting at byte {start}")]
    Unbalanced { start: usize },

    #[error("invalid selection JSON: {0}")]
    InvalidJson(String),

    #[error("expected {expected} selections, got {got}")]
    WrongArity { expected: usize, got: usize },
}

impl From<serde_json::Error> for SelectorError {
    fn from(err: serde_json::Error) -> Self {
        SelectorError::InvalidJson(err.to_string())
    }
}
