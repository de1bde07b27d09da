use thiserror::Error;
use uuid::Uuid;

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Template {0} not found")]
    TemplateNotFound(Uuid),

    #[error("Skip evaluation error: {0}")]
    SkipEvaluation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
