//! Window operations over deliveries
//!
//! Running totals are computed with a SQL window over the registered
//! `deliveries` table:
//!
//! ```sql
//! SUM(runs_scored) OVER (PARTITION BY match_id, innings_number
//!                        ORDER BY over_id, ball_id, <remaining columns>
//!                        ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW)
//! ```
//!
//! Ordering by over_id alone leaves the balls of an over unordered, and
//! ball_id alone does not separate re-bowled deliveries that share a ball
//! key, so every remaining column is appended as a further tiebreak. Rows
//! that still tie are identical and receive their totals in either order
//! with the same output.

use datafusion::prelude::DataFrame;

use crate::engine::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::helpers::{column_list, quote_ident};
use crate::types::{RecordKind, TableSchema};

pub const RUNNING_TOTAL_COLUMN: &str = "running_total";

const PARTITION_KEYS: [&str; 2] = ["match_id", "innings_number"];
const ORDER_KEYS: [&str; 2] = ["over_id", "ball_id"];

/// Order keys of the running total: over_id, ball_id, then every other
/// non-partition column of the deliveries schema in declared order
pub fn delivery_order_keys(schema: &TableSchema) -> Vec<String> {
    let mut keys: Vec<String> = ORDER_KEYS.iter().map(|k| k.to_string()).collect();
    keys.extend(
        schema
            .columns()
            .iter()
            .map(|c| c.name.clone())
            .filter(|name| {
                !PARTITION_KEYS.contains(&name.as_str()) && !ORDER_KEYS.contains(&name.as_str())
            }),
    );
    keys
}

/// Add `running_total` to every delivery: the prefix sum of runs_scored
/// within its (match_id, innings_number) partition
///
/// The result is ordered by match_id, innings_number and the order keys.
pub fn running_totals(ctx: &PipelineContext, schema: &TableSchema) -> Result<DataFrame> {
    if schema.kind() != RecordKind::Deliveries {
        return Err(PipelineError::Runtime(format!(
            "running totals need the deliveries table, got {}",
            schema.kind()
        )));
    }
    let table = RecordKind::Deliveries.table_name();
    ctx.require_table(table)?;

    let partition_by = column_list(&PARTITION_KEYS);
    let order_by = column_list(&delivery_order_keys(schema));
    let columns = column_list(
        &schema
            .columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>(),
    );

    let sql = format!(
        "SELECT {columns}, \
         SUM(\"runs_scored\") OVER (PARTITION BY {partition_by} ORDER BY {order_by} \
         ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW) AS {total} \
         FROM {table} \
         ORDER BY {partition_by}, {order_by}",
        total = quote_ident(RUNNING_TOTAL_COLUMN),
    );
    ctx.sql(&sql)
        .map_err(|e| PipelineError::query(RUNNING_TOTAL_COLUMN, e))
}
