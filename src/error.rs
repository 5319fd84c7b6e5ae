//! Error handling for the PAD to ESCO matcher

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Pad2EscoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A required input file from an earlier pipeline stage is absent.
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Stale embeddings: {0}")]
    StaleEmbeddings(String),

    #[error("Embedding generation error: {0}")]
    Embedding(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

pub type Result<T> = std::result::Result<T, Pad2EscoError>;

/// Convert anyhow errors (the Model2Vec loader reports through anyhow)
impl From<anyhow::Error> for Pad2EscoError {
    fn from(err: anyhow::Error) -> Self {
        Pad2EscoError::Embedding(err.to_string())
    }
}

impl From<safetensors::SafeTensorError> for Pad2EscoError {
    fn from(err: safetensors::SafeTensorError) -> Self {
        Pad2EscoError::Embedding(format!("safetensors: {}", err))
    }
}

impl From<ndarray::ShapeError> for Pad2EscoError {
    fn from(err: ndarray::ShapeError) -> Self {
        Pad2EscoError::Processing(format!("array shape: {}", err))
    }
}

impl From<tempfile::PersistError> for Pad2EscoError {
    fn from(err: tempfile::PersistError) -> Self {
        Pad2EscoError::Io(err.error)
    }
}
