//! Pipeline configuration
//!
//! Loaded from a TOML file; every field has a default so an empty file (or no
//! file at all) describes a runnable pipeline over `data/sample`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::types::{ColumnDef, RecordKind, TableSchema};

/// What to do with a row whose cells violate the declared schema
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowPolicy {
    /// Drop the whole row
    #[default]
    Reject,
    /// Null out offending cells of nullable columns, reject otherwise
    NullOnError,
}

impl std::str::FromStr for RowPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(RowPolicy::Reject),
            "null_on_error" | "null-on-error" | "null" => Ok(RowPolicy::NullOnError),
            other => Err(PipelineError::Config(format!(
                "unknown row policy '{}', expected 'reject' or 'null_on_error'",
                other
            ))),
        }
    }
}

/// File names of the four record kinds, relative to `source_dir`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SourceFiles {
    pub deliveries: String,
    pub matches: String,
    pub players: String,
    pub teams: String,
}

impl Default for SourceFiles {
    fn default() -> Self {
        Self {
            deliveries: "ball_by_ball.csv".to_string(),
            matches: "match.csv".to_string(),
            players: "player.csv".to_string(),
            teams: "team.csv".to_string(),
        }
    }
}

impl SourceFiles {
    pub fn file_for(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Deliveries => &self.deliveries,
            RecordKind::Matches => &self.matches,
            RecordKind::Players => &self.players,
            RecordKind::Teams => &self.teams,
        }
    }
}

/// Optional per-kind column lists replacing the built-in schemas
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchemaOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deliveries: Option<Vec<ColumnDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<ColumnDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<ColumnDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teams: Option<Vec<ColumnDef>>,
}

impl SchemaOverrides {
    fn columns_for(&self, kind: RecordKind) -> Option<&Vec<ColumnDef>> {
        match kind {
            RecordKind::Deliveries => self.deliveries.as_ref(),
            RecordKind::Matches => self.matches.as_ref(),
            RecordKind::Players => self.players.as_ref(),
            RecordKind::Teams => self.teams.as_ref(),
        }
    }
}

/// Parameters of the named reports
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReportSettings {
    /// Players kept per season in `top_scorers_per_season` (0 keeps all)
    pub top_n_per_season: usize,
    /// Last over (inclusive) counted as powerplay
    pub powerplay_overs: i64,
    /// Bowlers need strictly more powerplay deliveries than this
    pub min_powerplay_deliveries: i64,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            top_n_per_season: 10,
            powerplay_overs: 6,
            min_powerplay_deliveries: 120,
        }
    }
}

/// Which artifacts the commit stage writes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputSettings {
    pub csv: bool,
    pub parquet: bool,
    pub charts: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            csv: true,
            parquet: true,
            charts: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the four CSV sources
    pub source_dir: PathBuf,

    /// Directory replaced by the run's outputs
    pub output_dir: PathBuf,

    pub row_policy: RowPolicy,

    /// Engine partitions and runtime worker threads
    pub target_partitions: usize,

    /// Field delimiter of the sources
    pub delimiter: char,

    /// Cell values treated as missing in addition to empty cells
    pub null_values: Vec<String>,

    /// Sample violations kept per table in the run summary
    pub max_violation_samples: usize,

    pub sources: SourceFiles,
    pub reports: ReportSettings,
    pub output: OutputSettings,
    pub schemas: SchemaOverrides,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("data/sample"),
            output_dir: PathBuf::from("reports"),
            row_policy: RowPolicy::Reject,
            target_partitions: 4,
            delimiter: ',',
            null_values: vec!["NULL".to_string(), "NA".to_string()],
            max_violation_samples: 20,
            sources: SourceFiles::default(),
            reports: ReportSettings::default(),
            output: OutputSettings::default(),
            schemas: SchemaOverrides::default(),
        }
    }
}

impl PipelineConfig {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::Config(format!(
                "config file '{}' does not exist",
                path.display()
            )));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("failed to serialize config: {}", e)))
    }

    /// Check settings the run cannot start without
    pub fn validate(&self) -> Result<()> {
        if self.target_partitions == 0 {
            return Err(PipelineError::Config(
                "target_partitions must be at least 1".to_string(),
            ));
        }
        if !self.delimiter.is_ascii() {
            return Err(PipelineError::Config(format!(
                "delimiter '{}' is not a single-byte character",
                self.delimiter
            )));
        }
        if self.reports.powerplay_overs < 1 {
            return Err(PipelineError::Config(
                "reports.powerplay_overs must be at least 1".to_string(),
            ));
        }
        for kind in RecordKind::ALL {
            self.schema_for(kind)?;
        }
        Ok(())
    }

    /// Resolved schema of a record kind: the override if one is configured,
    /// otherwise the built-in one
    pub fn schema_for(&self, kind: RecordKind) -> Result<TableSchema> {
        match self.schemas.columns_for(kind) {
            Some(columns) => TableSchema::try_new(kind, columns.clone()),
            None => Ok(TableSchema::builtin(kind)),
        }
    }

    pub fn source_path(&self, kind: RecordKind) -> PathBuf {
        self.source_dir.join(self.sources.file_for(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.row_policy, RowPolicy::Reject);
        assert_eq!(config.reports.min_powerplay_deliveries, 120);
        assert_eq!(
            config.source_path(RecordKind::Deliveries),
            PathBuf::from("data/sample/ball_by_ball.csv")
        );
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let toml_str = r#"
            source_dir = "/data/ipl"
            row_policy = "null_on_error"

            [reports]
            top_n_per_season = 3

            [output]
            parquet = false
        "#;
        let config = PipelineConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.source_dir, PathBuf::from("/data/ipl"));
        assert_eq!(config.row_policy, RowPolicy::NullOnError);
        assert_eq!(config.reports.top_n_per_season, 3);
        assert_eq!(config.reports.powerplay_overs, 6);
        assert!(!config.output.parquet);
        assert!(config.output.csv);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = PipelineConfig::default();
        config.target_partitions = 8;
        config.sources.deliveries = "Ball_By_Ball.csv".to_string();

        let toml_str = config.to_toml().unwrap();
        let deserialized = PipelineConfig::from_toml(&toml_str).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_zero_partitions_rejected() {
        let err = PipelineConfig::from_toml("target_partitions = 0").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_schema_override_missing_required_column() {
        let toml_str = r#"
            [[schemas.teams]]
            name = "team_id"
            type = "integer"
            nullable = false
        "#;
        let err = PipelineConfig::from_toml(toml_str).unwrap_err();
        assert!(err.to_string().contains("team_name"));
    }

    #[test]
    fn test_schema_override_with_extra_column() {
        let toml_str = r#"
            [[schemas.teams]]
            name = "team_id"
            type = "integer"
            nullable = false

            [[schemas.teams]]
            name = "team_name"
            type = "string"
            nullable = false

            [[schemas.teams]]
            name = "home_ground"
            type = "string"
            nullable = true
        "#;
        let config = PipelineConfig::from_toml(toml_str).unwrap();
        let schema = config.schema_for(RecordKind::Teams).unwrap();
        assert_eq!(schema.columns().len(), 3);
        assert_eq!(schema.columns()[2].column_type, ColumnType::String);
    }

    fn deliveries_override(edit: impl FnOnce(&mut Vec<ColumnDef>)) -> PipelineConfig {
        let mut columns = TableSchema::builtin(RecordKind::Deliveries).columns().to_vec();
        edit(&mut columns);
        PipelineConfig {
            schemas: SchemaOverrides {
                deliveries: Some(columns),
                ..SchemaOverrides::default()
            },
            ..PipelineConfig::default()
        }
    }

    fn column<'a>(columns: &'a mut [ColumnDef], name: &str) -> &'a mut ColumnDef {
        columns.iter_mut().find(|c| c.name == name).unwrap()
    }

    #[test]
    fn test_override_cannot_make_required_column_nullable() {
        for name in ["runs_scored", "bowler_wicket", "match_id"] {
            let config = deliveries_override(|cols| column(cols, name).nullable = true);
            let err = config.validate().unwrap_err();
            assert!(matches!(err, PipelineError::Config(_)), "{}", name);
            assert!(err.to_string().contains("must not be nullable"), "{}", err);
        }
    }

    #[test]
    fn test_override_cannot_drop_lower_bounds() {
        for name in ["innings_number", "over_id", "ball_id", "runs_scored", "extra_runs"] {
            let config = deliveries_override(|cols| column(cols, name).min = None);
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(name), "{}", err);
        }
    }

    #[test]
    fn test_override_cannot_loosen_lower_bound() {
        let config = deliveries_override(|cols| column(cols, "over_id").min = Some(0));
        assert!(config.validate().is_err());
        let config = deliveries_override(|cols| column(cols, "runs_scored").min = Some(-5));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_override_may_tighten_bounds_and_relax_optional_columns() {
        let config = deliveries_override(|cols| {
            column(cols, "over_id").min = Some(2);
            column(cols, "out_type").nullable = false;
        });
        assert!(config.validate().is_ok());

        let winner_nullable = PipelineConfig::default();
        let schema = winner_nullable.schema_for(RecordKind::Matches).unwrap();
        assert!(TableSchema::try_new(RecordKind::Matches, schema.columns().to_vec()).is_ok());
    }

    #[test]
    fn test_toml_override_with_nullable_runs_rejected() {
        let toml_str = r#"
            [[schemas.deliveries]]
            name = "match_id"
            type = "integer"
            [[schemas.deliveries]]
            name = "innings_number"
            type = "integer"
            min = 1
            [[schemas.deliveries]]
            name = "over_id"
            type = "integer"
            min = 1
            [[schemas.deliveries]]
            name = "ball_id"
            type = "integer"
            min = 1
            [[schemas.deliveries]]
            name = "striker"
            type = "integer"
            [[schemas.deliveries]]
            name = "bowler"
            type = "integer"
            [[schemas.deliveries]]
            name = "runs_scored"
            type = "integer"
            nullable = true
            [[schemas.deliveries]]
            name = "extra_runs"
            type = "integer"
            min = 0
            [[schemas.deliveries]]
            name = "bowler_wicket"
            type = "boolean"
        "#;
        let err = PipelineConfig::from_toml(toml_str).unwrap_err();
        assert!(err.to_string().contains("runs_scored"), "{}", err);
    }

    #[test]
    fn test_row_policy_from_str() {
        assert_eq!("reject".parse::<RowPolicy>().unwrap(), RowPolicy::Reject);
        assert_eq!(
            "NULL_ON_ERROR".parse::<RowPolicy>().unwrap(),
            RowPolicy::NullOnError
        );
        assert!("drop".parse::<RowPolicy>().is_err());
    }
}
