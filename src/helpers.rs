//! Helper and utility functions shared by the operations

use datafusion::arrow::array::{Array, Int64Array};
use datafusion::arrow::compute::cast;
use datafusion::arrow::datatypes::DataType;

use crate::error::{PipelineError, Result};
use crate::types::ReportTable;

/// Quote a column name for use in generated SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Join column names into a quoted, comma-separated list
pub fn column_list<S: AsRef<str>>(columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read the single integer produced by a `SELECT COUNT(*) ...` style query
///
/// An empty result reads as zero.
pub fn scalar_i64(table: &ReportTable) -> Result<i64> {
    let Some(batch) = table.batches.iter().find(|b| b.num_rows() > 0) else {
        return Ok(0);
    };
    if batch.num_columns() != 1 {
        return Err(PipelineError::query(
            &table.name,
            format!("expected one column, found {}", batch.num_columns()),
        ));
    }
    let column = cast(batch.column(0), &DataType::Int64)?;
    let values = column
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| PipelineError::query(&table.name, "scalar is not an integer"))?;
    if values.is_null(0) {
        Ok(0)
    } else {
        Ok(values.value(0))
    }
}
