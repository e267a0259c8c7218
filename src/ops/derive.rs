//! Per-row derived columns
//!
//! Derivations that need no ordering are plain DataFusion expressions added
//! with `DataFrame::with_column`; the running total is a window and lives in
//! [`crate::ops::window`].

use datafusion::prelude::*;
use tracing::debug;

use crate::engine::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::ops::window::running_totals;
use crate::types::{ReportTable, TableSchema};

pub const HIGH_IMPACT_COLUMN: &str = "high_impact";
pub const DELIVERY_INSIGHTS: &str = "delivery_insights";

/// Runs off the bat and extras above which a delivery counts as high impact
pub const HIGH_IMPACT_RUNS: i64 = 6;

/// `(runs_scored + extra_runs > 6) OR bowler_wicket`
pub fn high_impact_expr() -> Expr {
    (col("runs_scored") + col("extra_runs"))
        .gt(lit(HIGH_IMPACT_RUNS))
        .or(col("bowler_wicket"))
}

/// Append the `high_impact` flag to a DataFrame of deliveries
pub fn with_high_impact(df: DataFrame) -> Result<DataFrame> {
    Ok(df.with_column(HIGH_IMPACT_COLUMN, high_impact_expr())?)
}

/// Deliveries with `running_total` and `high_impact`, materialized
pub fn delivery_insights(ctx: &PipelineContext, schema: &TableSchema) -> Result<ReportTable> {
    let df = running_totals(ctx, schema)?;
    let df = with_high_impact(df).map_err(|e| PipelineError::query(DELIVERY_INSIGHTS, e))?;
    let table = ctx.collect(DELIVERY_INSIGHTS, df)?;
    debug!(rows = table.num_rows(), "delivery insights computed");
    Ok(table)
}
