//! Formatting functions for displaying report tables as ASCII tables

use datafusion::arrow::array::*;
use datafusion::arrow::datatypes::Schema as ArrowSchema;
use datafusion::arrow::record_batch::RecordBatch;

use crate::types::ReportTable;

const MAX_CELL_WIDTH: usize = 50;

/// Calculate column widths by scanning through all rows (up to limit)
fn calculate_column_widths(
    batches: &[RecordBatch],
    schema: &ArrowSchema,
    limit: usize,
) -> Vec<usize> {
    let mut col_widths: Vec<usize> = schema.fields().iter().map(|f| f.name().len()).collect();

    let mut row_count = 0;
    'outer: for batch in batches {
        for row_idx in 0..batch.num_rows() {
            if row_count >= limit {
                break 'outer;
            }
            for (col_idx, width) in col_widths.iter_mut().enumerate() {
                let value_str = format_cell(batch.column(col_idx).as_ref(), row_idx);
                *width = (*width).max(value_str.chars().count());
            }
            row_count += 1;
        }
    }

    for width in &mut col_widths {
        *width = (*width).min(MAX_CELL_WIDTH);
    }

    col_widths
}

fn draw_border(col_widths: &[usize]) -> String {
    let mut border = String::from("+");
    for width in col_widths {
        border.push_str(&"-".repeat(width + 2));
        border.push('+');
    }
    border.push('\n');
    border
}

fn draw_header(schema: &ArrowSchema, col_widths: &[usize]) -> String {
    let mut header = String::from("|");
    for (field, width) in schema.fields().iter().zip(col_widths) {
        header.push_str(&format!(" {:<width$} |", field.name(), width = width));
    }
    header.push('\n');
    header
}

fn truncate(value: String) -> String {
    if value.chars().count() > MAX_CELL_WIDTH {
        let head: String = value.chars().take(MAX_CELL_WIDTH - 3).collect();
        format!("{}...", head)
    } else {
        value
    }
}

fn draw_rows(batches: &[RecordBatch], col_widths: &[usize], limit: usize) -> String {
    let mut rows = String::new();
    let mut row_count = 0;

    'outer: for batch in batches {
        for row_idx in 0..batch.num_rows() {
            if row_count >= limit {
                break 'outer;
            }
            rows.push('|');
            for (col_idx, width) in col_widths.iter().enumerate() {
                let value_str = truncate(format_cell(batch.column(col_idx).as_ref(), row_idx));
                rows.push_str(&format!(" {:<width$} |", value_str, width = *width));
            }
            rows.push('\n');
            row_count += 1;
        }
    }

    rows
}

/// Format RecordBatches as a pretty-printed ASCII table
///
/// Shows up to `limit` rows, followed by a footer when rows were cut.
pub fn format_table(batches: &[RecordBatch], schema: &ArrowSchema, limit: usize) -> String {
    let col_widths = calculate_column_widths(batches, schema, limit);

    let mut output = String::new();
    output.push_str(&draw_border(&col_widths));
    output.push_str(&draw_header(schema, &col_widths));
    output.push_str(&draw_border(&col_widths));
    output.push_str(&draw_rows(batches, &col_widths, limit));
    output.push_str(&draw_border(&col_widths));

    let total_rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    if total_rows > limit {
        output.push_str(&format!(
            "... ({} total rows, showing first {})\n",
            total_rows, limit
        ));
    }

    output
}

/// Render a report under a title line
pub fn format_report(table: &ReportTable, limit: usize) -> String {
    format!(
        "{} ({} rows)\n{}",
        table.name,
        table.num_rows(),
        format_table(&table.batches, &table.schema, limit)
    )
}

/// Format a single cell value from an Arrow column
pub fn format_cell(column: &dyn Array, row_idx: usize) -> String {
    if !column.is_valid(row_idx) {
        return "NULL".to_string();
    }

    if let Some(arr) = column.as_any().downcast_ref::<StringArray>() {
        arr.value(row_idx).to_string()
    } else if let Some(arr) = column.as_any().downcast_ref::<StringViewArray>() {
        arr.value(row_idx).to_string()
    } else if let Some(arr) = column.as_any().downcast_ref::<LargeStringArray>() {
        arr.value(row_idx).to_string()
    } else if let Some(arr) = column.as_any().downcast_ref::<Int32Array>() {
        arr.value(row_idx).to_string()
    } else if let Some(arr) = column.as_any().downcast_ref::<Int64Array>() {
        arr.value(row_idx).to_string()
    } else if let Some(arr) = column.as_any().downcast_ref::<UInt64Array>() {
        arr.value(row_idx).to_string()
    } else if let Some(arr) = column.as_any().downcast_ref::<Float64Array>() {
        format!("{:.4}", arr.value(row_idx))
    } else if let Some(arr) = column.as_any().downcast_ref::<BooleanArray>() {
        arr.value(row_idx).to_string()
    } else {
        "[unsupported type]".to_string()
    }
}
