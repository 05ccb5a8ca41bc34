//! Error handling for feature-table construction and join pipelines.
//!
//! Malformed cells are never errors here: field coercion degrades them to
//! null/NaN and logs. The variants below cover schema setup mistakes, join
//! queries the engine cannot compile, and failures propagated from the
//! engine or the filesystem.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Input not found at path: {path}")]
    DatasetNotFound { path: PathBuf },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Query compilation failed for predicate '{predicate}': {reason}")]
    QueryCompilation { predicate: String, reason: String },

    #[error("Processing interrupted: {reason}")]
    ProcessingInterrupted { reason: String },
}

impl PipelineError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a query compilation error
    pub fn query_compilation(predicate: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::QueryCompilation {
            predicate: predicate.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
