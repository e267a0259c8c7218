//! Batch cricket analytics on DataFusion
//!
//! Loads ball-by-ball, match, player and team CSV files into schema-checked
//! Arrow tables, derives per-delivery running totals and a high-impact flag,
//! runs a fixed set of aggregate reports, and commits CSV, Parquet and chart
//! spec outputs in one step.
//!
//! ```no_run
//! use cricket_analytics::{Pipeline, PipelineConfig};
//!
//! let pipeline = Pipeline::new(PipelineConfig::default())?;
//! let (summary, result) = pipeline.run();
//! println!("{}", summary.to_json()?);
//! result?;
//! # Ok::<(), cricket_analytics::PipelineError>(())
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod helpers;
pub mod ops;
pub mod pipeline;
pub mod presentation;
pub mod types;

#[cfg(test)]
mod fixtures;

pub use config::{PipelineConfig, RowPolicy};
pub use engine::PipelineContext;
pub use error::{PipelineError, Result};
pub use ops::aggregation::Report;
pub use pipeline::{Pipeline, RunStatus, RunSummary};
pub use types::{ColumnDef, ColumnType, RecordKind, ReportTable, TableSchema};
