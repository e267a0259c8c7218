//! Declarative chart specs for report tables
//!
//! Charts are not rendered here. Each report becomes a JSON document
//! naming the chart kind, the encoded columns and the rows themselves,
//! ready for an external renderer.

use arrow::json::writer::JsonArray;
use arrow::json::WriterBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::ops::aggregation::Report;
use crate::ops::derive::DELIVERY_INSIGHTS;
use crate::types::ReportTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Heatmap,
    Pie,
    Scatter,
}

/// How one report is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartLayout {
    pub title: &'static str,
    pub kind: ChartKind,
    pub x: &'static str,
    pub y: &'static str,
    pub series: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub name: String,
    pub title: String,
    pub kind: ChartKind,
    pub x: String,
    pub y: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    pub data: Vec<Value>,
}

impl ChartSpec {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub fn layout_for(name: &str) -> Option<ChartLayout> {
    use ChartKind::*;
    let layout = |title, kind, x, y, series| ChartLayout {
        title,
        kind,
        x,
        y,
        series,
    };
    if name == DELIVERY_INSIGHTS {
        return Some(layout(
            "Run progression by innings",
            Line,
            "over_id",
            "running_total",
            Some("innings_number"),
        ));
    }
    let report = Report::ALL.into_iter().find(|r| r.name() == name)?;
    Some(match report {
        Report::TopScorersPerSeason => layout(
            "Top run scorers per season",
            Bar,
            "player_name",
            "total_runs",
            Some("season_year"),
        ),
        Report::EconomicalPowerplayBowlers => layout(
            "Economical powerplay bowlers",
            Scatter,
            "avg_runs_per_ball",
            "total_wickets",
            None,
        ),
        Report::TossImpact => layout(
            "Match outcome after winning the toss",
            Pie,
            "match_outcome",
            "matches",
            Some("toss_winner"),
        ),
        Report::ScoresByVenue => layout(
            "Average match score by venue",
            Bar,
            "venue",
            "average_score",
            None,
        ),
        Report::DismissalTypes => layout("Dismissal types", Pie, "out_type", "frequency", None),
        Report::TeamTossPerformance => layout(
            "Wins after winning the toss",
            Bar,
            "team",
            "win_percentage",
            None,
        ),
        Report::RunsPerOver => layout(
            "Runs per over",
            Heatmap,
            "over_id",
            "total_runs",
            Some("innings_number"),
        ),
    })
}

/// Report rows as JSON objects, nulls kept as explicit `null`
pub fn table_rows(table: &ReportTable) -> Result<Vec<Value>> {
    if table.num_rows() == 0 {
        return Ok(Vec::new());
    }
    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());
    let batches: Vec<_> = table.batches.iter().collect();
    writer.write_batches(&batches)?;
    writer.finish()?;
    let buf = writer.into_inner();
    Ok(serde_json::from_slice(&buf)?)
}

/// Build the chart spec of a report table
pub fn chart_for(table: &ReportTable) -> Result<ChartSpec> {
    let layout = layout_for(&table.name).ok_or_else(|| {
        PipelineError::Runtime(format!("no chart layout for report '{}'", table.name))
    })?;
    for column in [Some(layout.x), Some(layout.y), layout.series]
        .into_iter()
        .flatten()
    {
        if table.schema.field_with_name(column).is_err() {
            return Err(PipelineError::Runtime(format!(
                "chart for '{}' encodes missing column '{}'",
                table.name, column
            )));
        }
    }

    Ok(ChartSpec {
        name: table.name.clone(),
        title: layout.title.to_string(),
        kind: layout.kind,
        x: layout.x.to_string(),
        y: layout.y.to_string(),
        series: layout.series.map(str::to_string),
        data: table_rows(table)?,
    })
}
