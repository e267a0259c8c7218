//! Record kinds, declared column schemas and in-memory tables

use std::sync::Arc;

use datafusion::arrow::datatypes::{DataType, Field, Schema as ArrowSchema, SchemaRef};
use datafusion::arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Semantic type of a declared column
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    String,
    Boolean,
}

impl ColumnType {
    pub fn data_type(self) -> DataType {
        match self {
            ColumnType::Integer => DataType::Int64,
            ColumnType::String => DataType::Utf8,
            ColumnType::Boolean => DataType::Boolean,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::String => write!(f, "string"),
            ColumnType::Boolean => write!(f, "boolean"),
        }
    }
}

/// One declared column: `{ name = "over_id", type = "integer", nullable = false, min = 1 }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub nullable: bool,
    /// Inclusive lower bound for integer columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
}

impl ColumnDef {
    pub fn new(name: &str, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            nullable,
            min: None,
        }
    }

    pub fn with_min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn field(&self) -> Field {
        Field::new(&self.name, self.column_type.data_type(), self.nullable)
    }
}

/// The four datasets the pipeline reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Deliveries,
    Matches,
    Players,
    Teams,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Deliveries,
        RecordKind::Matches,
        RecordKind::Players,
        RecordKind::Teams,
    ];

    /// Name the table is registered under in the SQL session
    pub fn table_name(self) -> &'static str {
        match self {
            RecordKind::Deliveries => "deliveries",
            RecordKind::Matches => "matches",
            RecordKind::Players => "players",
            RecordKind::Teams => "teams",
        }
    }

    /// Columns the queries depend on, with the type, nullability and lower
    /// bound a configured schema must keep
    pub fn required_columns(self) -> &'static [RequiredColumn] {
        match self {
            RecordKind::Deliveries => REQUIRED_DELIVERIES,
            RecordKind::Matches => REQUIRED_MATCHES,
            RecordKind::Players => REQUIRED_PLAYERS,
            RecordKind::Teams => REQUIRED_TEAMS,
        }
    }

    fn builtin_columns(self) -> Vec<ColumnDef> {
        use ColumnType::*;
        match self {
            RecordKind::Deliveries => vec![
                ColumnDef::new("match_id", Integer, false),
                ColumnDef::new("innings_number", Integer, false).with_min(1),
                ColumnDef::new("over_id", Integer, false).with_min(1),
                ColumnDef::new("ball_id", Integer, false).with_min(1),
                ColumnDef::new("striker", Integer, false),
                ColumnDef::new("bowler", Integer, false),
                ColumnDef::new("runs_scored", Integer, false).with_min(0),
                ColumnDef::new("extra_runs", Integer, false).with_min(0),
                ColumnDef::new("bowler_wicket", Boolean, false),
                ColumnDef::new("out_type", String, true),
            ],
            RecordKind::Matches => vec![
                ColumnDef::new("match_id", Integer, false),
                ColumnDef::new("season_year", Integer, false),
                ColumnDef::new("team1", String, true),
                ColumnDef::new("team2", String, true),
                ColumnDef::new("toss_winner", String, false),
                ColumnDef::new("toss_decision", String, true),
                ColumnDef::new("match_winner", String, true),
                ColumnDef::new("win_margin", Integer, true).with_min(0),
                ColumnDef::new("venue", String, false),
            ],
            RecordKind::Players => vec![
                ColumnDef::new("player_id", Integer, false),
                ColumnDef::new("player_name", String, false),
                ColumnDef::new("batting_hand", String, true),
                ColumnDef::new("bowling_skill", String, true),
            ],
            RecordKind::Teams => vec![
                ColumnDef::new("team_id", Integer, false),
                ColumnDef::new("team_name", String, false),
            ],
        }
    }
}

/// A column the queries rely on and the guarantees they rely on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredColumn {
    pub name: &'static str,
    pub column_type: ColumnType,
    /// Whether a configured schema may declare the column nullable
    pub nullable: bool,
    /// Lower bound a configured schema must keep (or tighten)
    pub min: Option<i64>,
}

const fn req(name: &'static str, column_type: ColumnType) -> RequiredColumn {
    RequiredColumn {
        name,
        column_type,
        nullable: false,
        min: None,
    }
}

const fn at_least(name: &'static str, min: i64) -> RequiredColumn {
    RequiredColumn {
        name,
        column_type: ColumnType::Integer,
        nullable: false,
        min: Some(min),
    }
}

const REQUIRED_DELIVERIES: &[RequiredColumn] = &[
    req("match_id", ColumnType::Integer),
    at_least("innings_number", 1),
    at_least("over_id", 1),
    at_least("ball_id", 1),
    req("striker", ColumnType::Integer),
    req("bowler", ColumnType::Integer),
    at_least("runs_scored", 0),
    at_least("extra_runs", 0),
    req("bowler_wicket", ColumnType::Boolean),
];

const REQUIRED_MATCHES: &[RequiredColumn] = &[
    req("match_id", ColumnType::Integer),
    req("season_year", ColumnType::Integer),
    req("toss_winner", ColumnType::String),
    RequiredColumn {
        name: "match_winner",
        column_type: ColumnType::String,
        nullable: true,
        min: None,
    },
    req("venue", ColumnType::String),
];

const REQUIRED_PLAYERS: &[RequiredColumn] = &[
    req("player_id", ColumnType::Integer),
    req("player_name", ColumnType::String),
];

const REQUIRED_TEAMS: &[RequiredColumn] = &[
    req("team_id", ColumnType::Integer),
    req("team_name", ColumnType::String),
];

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.table_name())
    }
}

/// Declared, validated column list of one record kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    kind: RecordKind,
    columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn builtin(kind: RecordKind) -> Self {
        Self {
            kind,
            columns: kind.builtin_columns(),
        }
    }

    /// Build a schema from configured columns, checking names are unique and
    /// every required column is present with its required type
    pub fn try_new(kind: RecordKind, columns: Vec<ColumnDef>) -> Result<Self> {
        for (idx, column) in columns.iter().enumerate() {
            if column.name.is_empty() {
                return Err(PipelineError::Config(format!(
                    "{}: column {} has an empty name",
                    kind, idx
                )));
            }
            if columns[..idx].iter().any(|c| c.name == column.name) {
                return Err(PipelineError::Config(format!(
                    "{}: duplicate column '{}'",
                    kind, column.name
                )));
            }
            if column.min.is_some() && column.column_type != ColumnType::Integer {
                return Err(PipelineError::Config(format!(
                    "{}: column '{}' has a lower bound but is not an integer",
                    kind, column.name
                )));
            }
        }

        for required in kind.required_columns() {
            let Some(column) = columns.iter().find(|c| c.name == required.name) else {
                return Err(PipelineError::Config(format!(
                    "{}: required column '{}' is missing",
                    kind, required.name
                )));
            };
            if column.column_type != required.column_type {
                return Err(PipelineError::Config(format!(
                    "{}: column '{}' must be {}, found {}",
                    kind, required.name, required.column_type, column.column_type
                )));
            }
            if column.nullable && !required.nullable {
                return Err(PipelineError::Config(format!(
                    "{}: column '{}' must not be nullable",
                    kind, required.name
                )));
            }
            if let Some(min) = required.min {
                if column.min.map_or(true, |m| m < min) {
                    return Err(PipelineError::Config(format!(
                        "{}: column '{}' needs min >= {}",
                        kind, required.name, min
                    )));
                }
            }
        }

        Ok(Self { kind, columns })
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Typed Arrow schema of the loaded table
    pub fn arrow_schema(&self) -> SchemaRef {
        Arc::new(ArrowSchema::new(
            self.columns.iter().map(ColumnDef::field).collect::<Vec<_>>(),
        ))
    }

    /// All-text schema used to read the raw file before validation
    pub fn raw_schema(&self) -> SchemaRef {
        Arc::new(ArrowSchema::new(
            self.columns
                .iter()
                .map(|c| Field::new(&c.name, DataType::Utf8, true))
                .collect::<Vec<_>>(),
        ))
    }
}

/// A validated, typed table held in memory for the duration of a run
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub schema: TableSchema,
    pub batches: Vec<RecordBatch>,
}

impl LoadedTable {
    pub fn new(schema: TableSchema, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    pub fn kind(&self) -> RecordKind {
        self.schema.kind()
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}

/// The four input tables of one run
#[derive(Debug, Clone)]
pub struct Datasets {
    pub deliveries: LoadedTable,
    pub matches: LoadedTable,
    pub players: LoadedTable,
    pub teams: LoadedTable,
}

impl Datasets {
    pub fn get(&self, kind: RecordKind) -> &LoadedTable {
        match kind {
            RecordKind::Deliveries => &self.deliveries,
            RecordKind::Matches => &self.matches,
            RecordKind::Players => &self.players,
            RecordKind::Teams => &self.teams,
        }
    }

    pub fn tables(&self) -> [&LoadedTable; 4] {
        [&self.deliveries, &self.matches, &self.players, &self.teams]
    }
}

/// A named result set produced by a transformation or report
#[derive(Debug, Clone)]
pub struct ReportTable {
    pub name: String,
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl ReportTable {
    pub fn new(name: &str, schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self {
            name: name.to_string(),
            schema,
            batches,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }
}
