//! Row-level schema validation of raw (all-text) record batches
//!
//! Raw batches come straight from the CSV reader with every column typed as
//! text. Each row is parsed cell by cell against the declared column
//! definitions and either kept (as typed Arrow values), kept with some cells
//! nulled, or rejected, depending on the [`RowPolicy`].
//!
//! Batches are validated in parallel; results are reassembled in source
//! order so the output and the tallies match a sequential pass exactly.

use std::collections::BTreeMap;
use std::sync::Arc;

use datafusion::arrow::array::{
    Array, ArrayRef, BooleanBuilder, Int64Builder, StringArray, StringBuilder,
};
use datafusion::arrow::compute::cast;
use datafusion::arrow::datatypes::{DataType, SchemaRef};
use datafusion::arrow::record_batch::RecordBatch;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::RowPolicy;
use crate::error::{PipelineError, Result};
use crate::types::{ColumnDef, ColumnType, TableSchema};

/// Why a cell failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ViolationReason {
    Missing,
    InvalidInteger,
    InvalidBoolean,
    BelowMinimum { min: i64 },
}

impl std::fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ViolationReason::Missing => write!(f, "missing value in non-nullable column"),
            ViolationReason::InvalidInteger => write!(f, "not an integer"),
            ViolationReason::InvalidBoolean => write!(f, "not a boolean"),
            ViolationReason::BelowMinimum { min } => write!(f, "below minimum {}", min),
        }
    }
}

/// One offending cell, kept as a sample in the load report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// 1-based data row number (the header is not counted)
    pub row: usize,
    pub column: String,
    pub value: Option<String>,
    pub reason: ViolationReason,
}

/// Counters accumulated while validating
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationTally {
    pub rows_read: usize,
    pub rows_loaded: usize,
    pub rows_rejected: usize,
    pub cells_nulled: usize,
    pub violations_by_column: BTreeMap<String, usize>,
    pub samples: Vec<Violation>,
}

impl ValidationTally {
    fn record(&mut self, violation: Violation, max_samples: usize) {
        *self
            .violations_by_column
            .entry(violation.column.clone())
            .or_insert(0) += 1;
        if self.samples.len() < max_samples {
            self.samples.push(violation);
        }
    }

    /// Fold a later batch's tally into this one
    pub fn merge(&mut self, other: ValidationTally, max_samples: usize) {
        self.rows_read += other.rows_read;
        self.rows_loaded += other.rows_loaded;
        self.rows_rejected += other.rows_rejected;
        self.cells_nulled += other.cells_nulled;
        for (column, count) in other.violations_by_column {
            *self.violations_by_column.entry(column).or_insert(0) += count;
        }
        let room = max_samples.saturating_sub(self.samples.len());
        self.samples.extend(other.samples.into_iter().take(room));
    }

    pub fn total_violations(&self) -> usize {
        self.violations_by_column.values().sum()
    }
}

/// A parsed cell value borrowing from the raw text
#[derive(Debug, Clone, Copy, PartialEq)]
enum Cell<'a> {
    Null,
    Int(i64),
    Bool(bool),
    Str(&'a str),
}

enum ColumnBuilder {
    Int(Int64Builder),
    Bool(BooleanBuilder),
    Str(StringBuilder),
}

impl ColumnBuilder {
    fn new(column_type: ColumnType, capacity: usize) -> Self {
        match column_type {
            ColumnType::Integer => ColumnBuilder::Int(Int64Builder::with_capacity(capacity)),
            ColumnType::Boolean => ColumnBuilder::Bool(BooleanBuilder::with_capacity(capacity)),
            ColumnType::String => {
                ColumnBuilder::Str(StringBuilder::with_capacity(capacity, capacity * 16))
            }
        }
    }

    fn append(&mut self, cell: Cell<'_>) -> Result<()> {
        match (self, cell) {
            (ColumnBuilder::Int(b), Cell::Int(v)) => b.append_value(v),
            (ColumnBuilder::Int(b), Cell::Null) => b.append_null(),
            (ColumnBuilder::Bool(b), Cell::Bool(v)) => b.append_value(v),
            (ColumnBuilder::Bool(b), Cell::Null) => b.append_null(),
            (ColumnBuilder::Str(b), Cell::Str(v)) => b.append_value(v),
            (ColumnBuilder::Str(b), Cell::Null) => b.append_null(),
            (_, cell) => {
                return Err(PipelineError::Runtime(format!(
                    "cell {:?} does not match its column builder",
                    cell
                )))
            }
        }
        Ok(())
    }

    fn finish(self) -> ArrayRef {
        match self {
            ColumnBuilder::Int(mut b) => Arc::new(b.finish()),
            ColumnBuilder::Bool(mut b) => Arc::new(b.finish()),
            ColumnBuilder::Str(mut b) => Arc::new(b.finish()),
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "1" => Some(true),
        "false" | "f" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Validates raw batches of one table against its declared schema
pub struct RowValidator<'a> {
    schema: &'a TableSchema,
    policy: RowPolicy,
    null_values: &'a [String],
    max_samples: usize,
}

impl<'a> RowValidator<'a> {
    pub fn new(
        schema: &'a TableSchema,
        policy: RowPolicy,
        null_values: &'a [String],
        max_samples: usize,
    ) -> Self {
        Self {
            schema,
            policy,
            null_values,
            max_samples,
        }
    }

    fn is_missing(&self, raw: Option<&str>) -> bool {
        match raw.map(str::trim) {
            None => true,
            Some(text) => {
                text.is_empty() || self.null_values.iter().any(|n| n.eq_ignore_ascii_case(text))
            }
        }
    }

    fn parse_cell<'r>(
        &self,
        raw: Option<&'r str>,
        column: &ColumnDef,
    ) -> std::result::Result<Cell<'r>, ViolationReason> {
        if self.is_missing(raw) {
            return if column.nullable {
                Ok(Cell::Null)
            } else {
                Err(ViolationReason::Missing)
            };
        }
        let text = raw.map(str::trim).unwrap_or_default();

        match column.column_type {
            ColumnType::Integer => {
                let value = text
                    .parse::<i64>()
                    .map_err(|_| ViolationReason::InvalidInteger)?;
                match column.min {
                    Some(min) if value < min => Err(ViolationReason::BelowMinimum { min }),
                    _ => Ok(Cell::Int(value)),
                }
            }
            ColumnType::Boolean => parse_bool(text)
                .map(Cell::Bool)
                .ok_or(ViolationReason::InvalidBoolean),
            ColumnType::String => Ok(Cell::Str(text)),
        }
    }

    /// Validate one raw batch whose first row is data row `first_row + 1`
    pub fn validate_batch(
        &self,
        raw: &RecordBatch,
        first_row: usize,
    ) -> Result<(RecordBatch, ValidationTally)> {
        let columns = self.schema.columns();
        if raw.num_columns() != columns.len() {
            return Err(PipelineError::Runtime(format!(
                "{}: raw batch has {} columns, schema declares {}",
                self.schema.kind(),
                raw.num_columns(),
                columns.len()
            )));
        }

        let text_columns = raw
            .columns()
            .iter()
            .map(|c| cast(c, &DataType::Utf8))
            .collect::<std::result::Result<Vec<ArrayRef>, _>>()?;
        let texts = text_columns
            .iter()
            .map(|c| {
                c.as_any().downcast_ref::<StringArray>().ok_or_else(|| {
                    PipelineError::Runtime("raw column is not a string array".to_string())
                })
            })
            .collect::<Result<Vec<&StringArray>>>()?;

        let num_rows = raw.num_rows();
        let mut builders: Vec<ColumnBuilder> = columns
            .iter()
            .map(|c| ColumnBuilder::new(c.column_type, num_rows))
            .collect();
        let mut tally = ValidationTally {
            rows_read: num_rows,
            ..Default::default()
        };
        let mut cells: Vec<Cell<'_>> = Vec::with_capacity(columns.len());

        for row_idx in 0..num_rows {
            cells.clear();
            let mut reject = false;

            for (column, text) in columns.iter().zip(&texts) {
                let raw_value = if text.is_null(row_idx) {
                    None
                } else {
                    Some(text.value(row_idx))
                };

                match self.parse_cell(raw_value, column) {
                    Ok(cell) => cells.push(cell),
                    Err(reason) => {
                        let coerce = self.policy == RowPolicy::NullOnError && column.nullable;
                        tally.record(
                            Violation {
                                row: first_row + row_idx + 1,
                                column: column.name.clone(),
                                value: raw_value.map(str::to_string),
                                reason,
                            },
                            self.max_samples,
                        );
                        if coerce {
                            tally.cells_nulled += 1;
                        } else {
                            reject = true;
                        }
                        cells.push(Cell::Null);
                    }
                }
            }

            if reject {
                tally.rows_rejected += 1;
                continue;
            }
            for (builder, cell) in builders.iter_mut().zip(cells.iter()) {
                builder.append(*cell)?;
            }
            tally.rows_loaded += 1;
        }

        let arrays: Vec<ArrayRef> = builders.into_iter().map(ColumnBuilder::finish).collect();
        let batch = RecordBatch::try_new(self.typed_schema(), arrays)?;
        Ok((batch, tally))
    }

    fn typed_schema(&self) -> SchemaRef {
        self.schema.arrow_schema()
    }

    /// Validate all raw batches of a table, in parallel, preserving order
    pub fn validate_batches(
        &self,
        raw: &[RecordBatch],
    ) -> Result<(Vec<RecordBatch>, ValidationTally)> {
        let offsets: Vec<usize> = raw
            .iter()
            .scan(0usize, |next, batch| {
                let first = *next;
                *next += batch.num_rows();
                Some(first)
            })
            .collect();

        let validated = raw
            .par_iter()
            .zip(offsets.par_iter())
            .map(|(batch, first_row)| self.validate_batch(batch, *first_row))
            .collect::<Result<Vec<_>>>()?;

        let mut batches = Vec::with_capacity(validated.len());
        let mut tally = ValidationTally::default();
        for (batch, batch_tally) in validated {
            tally.merge(batch_tally, self.max_samples);
            if batch.num_rows() > 0 {
                batches.push(batch);
            }
        }
        Ok((batches, tally))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordKind;
    use datafusion::arrow::array::{BooleanArray, Int64Array};
    use datafusion::arrow::datatypes::{Field, Schema};

    fn teams_schema() -> TableSchema {
        TableSchema::try_new(
            RecordKind::Teams,
            vec![
                ColumnDef::new("team_id", ColumnType::Integer, false).with_min(1),
                ColumnDef::new("team_name", ColumnType::String, false),
                ColumnDef::new("founded", ColumnType::Integer, true),
                ColumnDef::new("active", ColumnType::Boolean, true),
            ],
        )
        .unwrap()
    }

    fn raw_batch(rows: &[[Option<&str>; 4]]) -> RecordBatch {
        let schema = Arc::new(Schema::new(
            ["team_id", "team_name", "founded", "active"]
                .iter()
                .map(|n| Field::new(*n, DataType::Utf8, true))
                .collect::<Vec<_>>(),
        ));
        let columns: Vec<ArrayRef> = (0..4)
            .map(|i| {
                Arc::new(StringArray::from(
                    rows.iter().map(|r| r[i]).collect::<Vec<_>>(),
                )) as ArrayRef
            })
            .collect();
        RecordBatch::try_new(schema, columns).unwrap()
    }

    #[test]
    fn test_boolean_tokens() {
        for text in ["true", "T", "Yes", "1"] {
            assert_eq!(parse_bool(text), Some(true), "{}", text);
        }
        for text in ["FALSE", "f", "no", "0"] {
            assert_eq!(parse_bool(text), Some(false), "{}", text);
        }
        for text in ["y", "n", "on", "2"] {
            assert_eq!(parse_bool(text), None, "{}", text);
        }
    }

    fn null_tokens() -> Vec<String> {
        vec!["NULL".to_string(), "NA".to_string()]
    }

    #[test]
    fn test_valid_rows_are_typed() {
        let schema = teams_schema();
        let tokens = null_tokens();
        let validator = RowValidator::new(&schema, RowPolicy::Reject, &tokens, 10);
        let raw = raw_batch(&[
            [Some("1"), Some(" Mumbai Indians "), Some("2008"), Some("TRUE")],
            [Some("2"), Some("Deccan Chargers"), Some("NA"), Some("0")],
        ]);

        let (batch, tally) = validator.validate_batch(&raw, 0).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(tally.rows_loaded, 2);
        assert_eq!(tally.total_violations(), 0);

        let ids = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ids.values().to_vec(), vec![1, 2]);
        let names = batch.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(names.value(0), "Mumbai Indians");
        let founded = batch.column(2).as_any().downcast_ref::<Int64Array>().unwrap();
        assert!(founded.is_null(1));
        let active = batch.column(3).as_any().downcast_ref::<BooleanArray>().unwrap();
        assert!(active.value(0));
        assert!(!active.value(1));
    }

    #[test]
    fn test_reject_policy_drops_row() {
        let schema = teams_schema();
        let tokens = null_tokens();
        let validator = RowValidator::new(&schema, RowPolicy::Reject, &tokens, 10);
        let raw = raw_batch(&[
            [Some("1"), Some("A"), Some("abc"), None],
            [Some("2"), Some("B"), Some("2009"), Some("maybe")],
            [Some("3"), Some("C"), None, None],
        ]);

        let (batch, tally) = validator.validate_batch(&raw, 0).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(tally.rows_read, 3);
        assert_eq!(tally.rows_rejected, 2);
        assert_eq!(tally.cells_nulled, 0);
        assert_eq!(tally.violations_by_column.get("founded"), Some(&1));
        assert_eq!(tally.violations_by_column.get("active"), Some(&1));
        assert_eq!(tally.samples[0].row, 1);
        assert_eq!(tally.samples[0].reason, ViolationReason::InvalidInteger);
        assert_eq!(tally.samples[1].reason, ViolationReason::InvalidBoolean);
    }

    #[test]
    fn test_null_on_error_coerces_nullable_cells() {
        let schema = teams_schema();
        let tokens = null_tokens();
        let validator = RowValidator::new(&schema, RowPolicy::NullOnError, &tokens, 10);
        let raw = raw_batch(&[
            [Some("1"), Some("A"), Some("abc"), Some("maybe")],
            [Some("x"), Some("B"), Some("2009"), Some("yes")],
            [Some("3"), None, Some("2010"), Some("no")],
        ]);

        let (batch, tally) = validator.validate_batch(&raw, 0).unwrap();
        // bad cells in nullable columns are nulled, bad non-nullable cells still reject
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(tally.cells_nulled, 2);
        assert_eq!(tally.rows_rejected, 2);
        let founded = batch.column(2).as_any().downcast_ref::<Int64Array>().unwrap();
        assert!(founded.is_null(0));
        assert_eq!(
            tally.samples.iter().find(|v| v.column == "team_name").map(|v| &v.reason),
            Some(&ViolationReason::Missing)
        );
    }

    #[test]
    fn test_lower_bound() {
        let schema = teams_schema();
        let tokens = null_tokens();
        let validator = RowValidator::new(&schema, RowPolicy::Reject, &tokens, 10);
        let raw = raw_batch(&[[Some("0"), Some("A"), None, None]]);

        let (batch, tally) = validator.validate_batch(&raw, 0).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(
            tally.samples[0].reason,
            ViolationReason::BelowMinimum { min: 1 }
        );
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let schema = teams_schema();
        let tokens = null_tokens();
        let validator = RowValidator::new(&schema, RowPolicy::Reject, &tokens, 3);
        let first = raw_batch(&[
            [Some("1"), Some("A"), Some("bad"), None],
            [Some("2"), Some("B"), None, None],
        ]);
        let second = raw_batch(&[
            [Some("3"), Some("C"), Some("bad"), None],
            [Some("4"), Some("D"), Some("bad"), None],
            [Some("5"), Some("E"), Some("bad"), None],
        ]);

        let (batches, tally) = validator
            .validate_batches(&[first.clone(), second.clone()])
            .unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(tally.rows_read, 5);
        assert_eq!(tally.rows_rejected, 4);
        assert_eq!(tally.violations_by_column.get("founded"), Some(&4));
        // samples are capped and keep source order with global row numbers
        let rows: Vec<usize> = tally.samples.iter().map(|v| v.row).collect();
        assert_eq!(rows, vec![1, 3, 4]);

        let (_, first_tally) = validator.validate_batch(&first, 0).unwrap();
        let (_, second_tally) = validator.validate_batch(&second, 2).unwrap();
        let mut sequential = first_tally;
        sequential.merge(second_tally, 3);
        assert_eq!(sequential, tally);
    }
}
