use thiserror::Error;

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
