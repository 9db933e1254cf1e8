//! Error types for Llama inference.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlamaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid model file: {0}")]
    Format(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("usage error: {0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, LlamaError>;
