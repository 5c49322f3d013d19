use thiserror::Error;

/// Coarse grouping used by the HTTP layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    BadRequest,
    ServerError,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("document has no extractable content: {0}")]
    EmptyDocument(String),

    #[error("document is corrupted or encrypted: {0}")]
    Corrupted(String),

    #[error("no embeddings exist for file: {0}")]
    NoEmbeddings(String),

    #[error("{collaborator} call failed: {details}")]
    Collaborator {
        collaborator: &'static str,
        details: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("metadata store error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl PipelineError {
    pub fn collaborator(name: &'static str, details: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator: name,
            details: details.into(),
        }
    }

    /// Not-found vs. bad-request vs. server-error, per caller-facing contract.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) | Self::NoEmbeddings(_) => ErrorClass::NotFound,
            Self::InvalidInput(_) | Self::EmptyDocument(_) | Self::Corrupted(_) => {
                ErrorClass::BadRequest
            }
            _ => ErrorClass::ServerError,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
