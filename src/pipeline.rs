//! The batch job: load → transform → check → report → present → commit
//!
//! Stages run one after another against a single [`PipelineContext`]. Every
//! result is held in memory until the commit stage, which writes into a
//! staging directory beside `output_dir` and then swaps it into place, so a
//! failed run never leaves partial output behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::engine::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::ops::aggregation::Report;
use crate::ops::derive::delivery_insights;
use crate::ops::io::{load_datasets, write_csv, write_parquet, LoadReport};
use crate::ops::join::{check_data_quality, DataQualityReport};
use crate::presentation::chart_for;
use crate::types::ReportTable;

pub const RUN_SUMMARY_FILE: &str = "run_summary.json";
pub const CHARTS_DIR: &str = "charts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub name: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedReport {
    pub name: String,
    pub missing_columns: Vec<String>,
}

/// Structured outcome of one run, produced on success and on failure
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub error: Option<String>,
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub loads: Vec<LoadReport>,
    pub data_quality: Option<DataQualityReport>,
    pub reports: Vec<ReportSummary>,
    pub skipped_reports: Vec<SkippedReport>,
    /// Files written, relative to `output_dir`
    pub outputs: Vec<String>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    fn new(config: &PipelineConfig) -> Self {
        Self {
            status: RunStatus::Running,
            error: None,
            source_dir: config.source_dir.clone(),
            output_dir: config.output_dir.clone(),
            loads: Vec::new(),
            data_quality: None,
            reports: Vec::new(),
            skipped_reports: Vec::new(),
            outputs: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    summary: RunSummary,
    started: Instant,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let summary = RunSummary::new(&config);
        Ok(Self {
            config,
            summary,
            started: Instant::now(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage and commit the outputs
    ///
    /// Returns the summary together with the computed tables. The summary is
    /// complete on failure too, with `status = failed` and the error message.
    pub fn run(mut self) -> (RunSummary, Result<Vec<ReportTable>>) {
        self.started = Instant::now();
        info!(
            source = %self.config.source_dir.display(),
            output = %self.config.output_dir.display(),
            policy = ?self.config.row_policy,
            "pipeline started"
        );

        // outputs are committed only once the context is released cleanly
        let result = PipelineContext::new(self.config.target_partitions)
            .and_then(|ctx| {
                let result = self.execute(&ctx);
                let released = ctx.release();
                result.and_then(|tables| released.map(|_| tables))
            })
            .and_then(|tables| self.commit(&tables).map(|_| tables));

        self.summary.elapsed_ms = self.elapsed_ms();
        match &result {
            Ok(tables) => {
                self.summary.status = RunStatus::Succeeded;
                info!(
                    reports = tables.len(),
                    elapsed_ms = self.summary.elapsed_ms,
                    "pipeline finished"
                );
            }
            Err(e) => {
                self.summary.status = RunStatus::Failed;
                self.summary.error = Some(e.to_string());
                self.summary.outputs.clear();
                error!(error = %e, "pipeline failed");
            }
        }
        (self.summary, result)
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn execute(&mut self, ctx: &PipelineContext) -> Result<Vec<ReportTable>> {
        // ingestion
        let (datasets, loads) = load_datasets(ctx, &self.config)?;
        self.summary.loads = loads;
        ctx.register_datasets(&datasets)?;

        // transformation
        let mut tables = vec![delivery_insights(ctx, &datasets.deliveries.schema)?];

        self.summary.data_quality = Some(check_data_quality(ctx)?);

        // analytical queries
        for report in Report::ALL {
            let missing = report.missing_columns(&datasets);
            if !missing.is_empty() {
                warn!(report = report.name(), missing = ?missing, "report skipped");
                self.summary.skipped_reports.push(SkippedReport {
                    name: report.name().to_string(),
                    missing_columns: missing,
                });
                continue;
            }
            tables.push(report.run(ctx, &self.config.reports)?);
        }
        self.summary.reports = tables
            .iter()
            .map(|t| ReportSummary {
                name: t.name.clone(),
                rows: t.num_rows(),
            })
            .collect();
        Ok(tables)
    }

    /// Write everything into staging, then swap staging in for `output_dir`
    fn commit(&mut self, tables: &[ReportTable]) -> Result<()> {
        let output_dir = self.config.output_dir.clone();
        let staging = sibling_path(&output_dir, "staging")?;
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let result = self
            .write_outputs(&staging, tables)
            .and_then(|_| replace_dir(&staging, &output_dir));
        if result.is_err() && staging.exists() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                warn!(error = %e, path = %staging.display(), "failed to remove staging directory");
            }
        }
        result?;
        info!(
            files = self.summary.outputs.len(),
            path = %output_dir.display(),
            "outputs committed"
        );
        Ok(())
    }

    fn write_outputs(&mut self, staging: &Path, tables: &[ReportTable]) -> Result<()> {
        let output = self.config.output.clone();
        let mut outputs = Vec::new();

        for table in tables {
            if output.csv {
                let file = format!("{}.csv", table.name);
                write_csv(table, &staging.join(&file))?;
                outputs.push(file);
            }
            if output.parquet {
                let file = format!("{}.parquet", table.name);
                write_parquet(table, &staging.join(&file))?;
                outputs.push(file);
            }
        }

        if output.charts {
            fs::create_dir_all(staging.join(CHARTS_DIR))?;
            for table in tables {
                let file = format!("{}/{}.json", CHARTS_DIR, table.name);
                fs::write(staging.join(&file), chart_for(table)?.to_json()?)?;
                outputs.push(file);
            }
        }

        outputs.push(RUN_SUMMARY_FILE.to_string());
        self.summary.outputs = outputs;
        self.summary.status = RunStatus::Succeeded;
        self.summary.elapsed_ms = self.elapsed_ms();
        fs::write(staging.join(RUN_SUMMARY_FILE), self.summary.to_json()?)?;
        debug!(path = %staging.display(), "staging complete");
        Ok(())
    }
}

/// `<parent>/.<name>.<suffix>` next to `dir`
fn sibling_path(dir: &Path, suffix: &str) -> Result<PathBuf> {
    let name = dir.file_name().ok_or_else(|| {
        PipelineError::Config(format!(
            "output_dir '{}' must name a directory",
            dir.display()
        ))
    })?;
    let parent = dir
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    Ok(parent.join(format!(".{}.{}", name.to_string_lossy(), suffix)))
}

/// Move `staging` to `target`, restoring the previous `target` if the move fails
fn replace_dir(staging: &Path, target: &Path) -> Result<()> {
    if !target.exists() {
        fs::rename(staging, target)?;
        return Ok(());
    }

    let previous = sibling_path(target, "previous")?;
    if previous.exists() {
        fs::remove_dir_all(&previous)?;
    }
    fs::rename(target, &previous)?;
    if let Err(e) = fs::rename(staging, target) {
        fs::rename(&previous, target)?;
        return Err(e.into());
    }
    fs::remove_dir_all(&previous)?;
    Ok(())
}
