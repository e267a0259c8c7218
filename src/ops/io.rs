//! I/O operations: schema-validated CSV loading and report materialization
//!
//! Loading reads each source as all-text columns through DataFusion's CSV
//! reader, then hands the raw batches to the [`RowValidator`]. Writing
//! produces CSV (Arrow CSV writer) and Parquet (`ArrowWriter`) files.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use datafusion::arrow::csv::WriterBuilder;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::error::DataFusionError;
use datafusion::prelude::*;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{PipelineConfig, RowPolicy};
use crate::engine::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::ops::validate::{RowValidator, ValidationTally};
use crate::types::{Datasets, LoadedTable, RecordKind, ReportTable, TableSchema};

/// Loader settings shared by the four tables
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub policy: RowPolicy,
    pub delimiter: u8,
    pub null_values: Vec<String>,
    pub max_samples: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for LoadOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            policy: config.row_policy,
            delimiter: config.delimiter as u8,
            null_values: config.null_values.clone(),
            max_samples: config.max_violation_samples,
        }
    }
}

/// Per-table outcome of the load stage
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub kind: RecordKind,
    pub source: PathBuf,
    #[serde(flatten)]
    pub tally: ValidationTally,
}

fn unquote(name: &str) -> &str {
    let name = name.trim();
    name.strip_prefix('"')
        .and_then(|n| n.strip_suffix('"'))
        .unwrap_or(name)
}

/// Check the header line names the declared columns in declared order
///
/// The CSV reader maps columns by position, so a reordered or renamed header
/// would silently load values into the wrong columns.
fn check_header(path: &Path, schema: &TableSchema, delimiter: u8) -> Result<()> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(PipelineError::SchemaMismatch {
            path: path.to_path_buf(),
            message: "file is empty, expected a header line".to_string(),
        });
    }

    let line = line.trim_start_matches('\u{feff}').trim_end_matches(['\r', '\n']);
    let found: Vec<&str> = line.split(delimiter as char).map(unquote).collect();
    let expected: Vec<&str> = schema.columns().iter().map(|c| c.name.as_str()).collect();

    let matches = found.len() == expected.len()
        && found
            .iter()
            .zip(&expected)
            .all(|(f, e)| f.eq_ignore_ascii_case(e));
    if !matches {
        return Err(PipelineError::SchemaMismatch {
            path: path.to_path_buf(),
            message: format!(
                "header [{}] does not match declared columns [{}]",
                found.join(", "),
                expected.join(", ")
            ),
        });
    }
    Ok(())
}

fn malformed(path: &Path, err: DataFusionError) -> PipelineError {
    PipelineError::MalformedSource {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Read a delimited file into raw all-text batches
fn read_raw(
    ctx: &PipelineContext,
    path: &Path,
    schema: &TableSchema,
    delimiter: u8,
) -> Result<Vec<RecordBatch>> {
    let path_str = path.to_str().ok_or_else(|| {
        PipelineError::Config(format!("path '{}' is not valid UTF-8", path.display()))
    })?;
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let raw_schema = schema.raw_schema();

    ctx.block_on(async {
        let options = CsvReadOptions::new()
            .has_header(true)
            .delimiter(delimiter)
            .schema(&raw_schema)
            .file_extension(&extension);
        let df = ctx
            .session()
            .read_csv(path_str, options)
            .await
            .map_err(|e| malformed(path, e))?;
        df.collect().await.map_err(|e| malformed(path, e))
    })
}

/// Load one source file into a validated, typed table
///
/// A missing file or a header that does not match the schema is fatal;
/// individual bad rows are handled by `options.policy` and tallied.
pub fn load_table(
    ctx: &PipelineContext,
    path: &Path,
    schema: &TableSchema,
    options: &LoadOptions,
) -> Result<(LoadedTable, LoadReport)> {
    if !path.is_file() {
        return Err(PipelineError::SourceNotFound(path.to_path_buf()));
    }
    check_header(path, schema, options.delimiter)?;

    let raw = read_raw(ctx, path, schema, options.delimiter)?;
    let validator = RowValidator::new(
        schema,
        options.policy,
        &options.null_values,
        options.max_samples,
    );
    let (batches, tally) = validator.validate_batches(&raw)?;

    info!(
        table = %schema.kind(),
        rows_read = tally.rows_read,
        rows_loaded = tally.rows_loaded,
        rows_rejected = tally.rows_rejected,
        cells_nulled = tally.cells_nulled,
        "loaded {}",
        path.display()
    );
    if tally.total_violations() > 0 {
        warn!(
            table = %schema.kind(),
            violations = tally.total_violations(),
            "schema violations found"
        );
    }

    let report = LoadReport {
        kind: schema.kind(),
        source: path.to_path_buf(),
        tally,
    };
    Ok((LoadedTable::new(schema.clone(), batches), report))
}

/// Load the four sources named by the configuration
pub fn load_datasets(
    ctx: &PipelineContext,
    config: &PipelineConfig,
) -> Result<(Datasets, Vec<LoadReport>)> {
    let options = LoadOptions::from(config);
    let mut reports = Vec::with_capacity(RecordKind::ALL.len());
    let mut load = |kind: RecordKind| -> Result<LoadedTable> {
        let schema = config.schema_for(kind)?;
        let (table, report) = load_table(ctx, &config.source_path(kind), &schema, &options)?;
        reports.push(report);
        Ok(table)
    };

    let datasets = Datasets {
        deliveries: load(RecordKind::Deliveries)?,
        matches: load(RecordKind::Matches)?,
        players: load(RecordKind::Players)?,
        teams: load(RecordKind::Teams)?,
    };
    Ok((datasets, reports))
}

/// Batches to write: an empty table still gets a header / schema
fn batches_or_empty(table: &ReportTable) -> Vec<RecordBatch> {
    if table.batches.is_empty() {
        vec![RecordBatch::new_empty(table.schema.clone())]
    } else {
        table.batches.clone()
    }
}

/// Write a report table to a CSV file with a header row
pub fn write_csv(table: &ReportTable, path: &Path) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    for batch in batches_or_empty(table) {
        writer.write(&batch)?;
    }
    writer.into_inner().flush()?;
    Ok(())
}

/// Write a report table to a Parquet file
pub fn write_parquet(table: &ReportTable, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, table.schema.clone(), Some(props))?;
    for batch in batches_or_empty(table) {
        writer.write(&batch)?;
    }
    writer.close()?;
    Ok(())
}
