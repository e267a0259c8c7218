//! Error types for the analytics pipeline

use std::path::PathBuf;

use datafusion::arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use parquet::errors::ParquetError;
use thiserror::Error;

/// Errors that abort a pipeline run.
///
/// Per-row schema violations are not errors: the loader tallies them
/// according to the configured [`RowPolicy`](crate::config::RowPolicy).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Schema mismatch in {}: {message}", .path.display())]
    SchemaMismatch { path: PathBuf, message: String },

    #[error("Malformed source {}: {message}", .path.display())]
    MalformedSource { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Table not registered: {0}")]
    TableNotRegistered(String),

    #[error("Report '{report}' failed: {message}")]
    Query { report: String, message: String },

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("DataFusion error: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    /// Wrap an engine error with the name of the report that raised it
    pub fn query(report: &str, err: impl std::fmt::Display) -> Self {
        PipelineError::Query {
            report: report.to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
