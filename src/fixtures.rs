//! In-memory fixtures shared by the unit tests

use std::sync::Arc;

use datafusion::arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray,
};
use datafusion::arrow::compute::{cast, concat_batches};
use datafusion::arrow::datatypes::DataType;
use datafusion::arrow::record_batch::RecordBatch;

use crate::engine::PipelineContext;
use crate::types::{Datasets, LoadedTable, RecordKind, ReportTable, TableSchema};

#[derive(Debug, Clone)]
pub struct DeliveryRow {
    pub match_id: i64,
    pub innings_number: i64,
    pub over_id: i64,
    pub ball_id: i64,
    pub striker: i64,
    pub bowler: i64,
    pub runs_scored: i64,
    pub extra_runs: i64,
    pub bowler_wicket: bool,
    pub out_type: Option<String>,
}

impl DeliveryRow {
    pub fn out(mut self, out_type: &str) -> Self {
        self.out_type = Some(out_type.to_string());
        self.bowler_wicket = true;
        self
    }
}

#[allow(clippy::too_many_arguments)]
pub fn delivery(
    match_id: i64,
    innings_number: i64,
    over_id: i64,
    ball_id: i64,
    striker: i64,
    bowler: i64,
    runs_scored: i64,
    extra_runs: i64,
    bowler_wicket: bool,
) -> DeliveryRow {
    DeliveryRow {
        match_id,
        innings_number,
        over_id,
        ball_id,
        striker,
        bowler,
        runs_scored,
        extra_runs,
        bowler_wicket,
        out_type: None,
    }
}

#[derive(Debug, Clone)]
pub struct MatchRow {
    pub match_id: i64,
    pub season_year: i64,
    pub toss_winner: String,
    pub match_winner: Option<String>,
    pub venue: String,
}

pub fn match_row(
    match_id: i64,
    season_year: i64,
    toss_winner: &str,
    match_winner: Option<&str>,
    venue: &str,
) -> MatchRow {
    MatchRow {
        match_id,
        season_year,
        toss_winner: toss_winner.to_string(),
        match_winner: match_winner.map(str::to_string),
        venue: venue.to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Fixture {
    pub deliveries: Vec<DeliveryRow>,
    pub matches: Vec<MatchRow>,
    pub players: Vec<(i64, &'static str)>,
    pub teams: Vec<(i64, &'static str)>,
}

fn table(kind: RecordKind, columns: Vec<ArrayRef>) -> LoadedTable {
    let schema = TableSchema::builtin(kind);
    let batch = RecordBatch::try_new(schema.arrow_schema(), columns).unwrap();
    LoadedTable::new(schema, vec![batch])
}

fn ints<T>(rows: &[T], f: impl Fn(&T) -> i64) -> ArrayRef {
    Arc::new(Int64Array::from(rows.iter().map(f).collect::<Vec<_>>()))
}

fn strs<T>(rows: &[T], f: impl Fn(&T) -> Option<String>) -> ArrayRef {
    Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
}

pub fn datasets(fixture: &Fixture) -> Datasets {
    let d = &fixture.deliveries;
    let deliveries = table(
        RecordKind::Deliveries,
        vec![
            ints(d, |r| r.match_id),
            ints(d, |r| r.innings_number),
            ints(d, |r| r.over_id),
            ints(d, |r| r.ball_id),
            ints(d, |r| r.striker),
            ints(d, |r| r.bowler),
            ints(d, |r| r.runs_scored),
            ints(d, |r| r.extra_runs),
            Arc::new(BooleanArray::from(
                d.iter().map(|r| r.bowler_wicket).collect::<Vec<_>>(),
            )),
            strs(d, |r| r.out_type.clone()),
        ],
    );

    let m = &fixture.matches;
    let matches = table(
        RecordKind::Matches,
        vec![
            ints(m, |r| r.match_id),
            ints(m, |r| r.season_year),
            strs(m, |_| None),
            strs(m, |_| None),
            strs(m, |r| Some(r.toss_winner.clone())),
            strs(m, |_| Some("bat".to_string())),
            strs(m, |r| r.match_winner.clone()),
            Arc::new(Int64Array::from(vec![None::<i64>; m.len()])),
            strs(m, |r| Some(r.venue.clone())),
        ],
    );

    let p = &fixture.players;
    let players = table(
        RecordKind::Players,
        vec![
            ints(p, |r| r.0),
            strs(p, |r| Some(r.1.to_string())),
            strs(p, |_| None),
            strs(p, |_| None),
        ],
    );

    let t = &fixture.teams;
    let teams = table(
        RecordKind::Teams,
        vec![ints(t, |r| r.0), strs(t, |r| Some(r.1.to_string()))],
    );

    Datasets {
        deliveries,
        matches,
        players,
        teams,
    }
}

/// A context with all four fixture tables registered
pub fn register_fixture(fixture: &Fixture) -> PipelineContext {
    let ctx = PipelineContext::new(2).unwrap();
    ctx.register_datasets(&datasets(fixture)).unwrap();
    ctx
}

fn column(table: &ReportTable, name: &str, data_type: &DataType) -> ArrayRef {
    let batch = concat_batches(&table.schema, &table.batches).unwrap();
    let idx = batch.schema().index_of(name).unwrap();
    cast(batch.column(idx), data_type).unwrap()
}

pub fn int_column(table: &ReportTable, name: &str) -> Vec<i64> {
    let array = column(table, name, &DataType::Int64);
    let values = array.as_any().downcast_ref::<Int64Array>().unwrap();
    (0..values.len()).map(|i| values.value(i)).collect()
}

pub fn float_column(table: &ReportTable, name: &str) -> Vec<f64> {
    let array = column(table, name, &DataType::Float64);
    let values = array.as_any().downcast_ref::<Float64Array>().unwrap();
    (0..values.len()).map(|i| values.value(i)).collect()
}

pub fn bool_column(table: &ReportTable, name: &str) -> Vec<bool> {
    let array = column(table, name, &DataType::Boolean);
    let values = array.as_any().downcast_ref::<BooleanArray>().unwrap();
    (0..values.len()).map(|i| values.value(i)).collect()
}

pub fn str_column(table: &ReportTable, name: &str) -> Vec<Option<String>> {
    let array = column(table, name, &DataType::Utf8);
    let values = array.as_any().downcast_ref::<StringArray>().unwrap();
    (0..values.len())
        .map(|i| (!values.is_null(i)).then(|| values.value(i).to_string()))
        .collect()
}
