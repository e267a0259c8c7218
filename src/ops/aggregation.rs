//! Named analytical reports
//!
//! Each report is one SQL statement over the registered input tables with
//! explicit join keys, grouping keys and aggregates. Every statement ends in
//! an ORDER BY that is total over its output, so results do not depend on
//! how DataFusion partitions the work.

use serde::Serialize;
use tracing::debug;

use crate::config::ReportSettings;
use crate::engine::PipelineContext;
use crate::error::Result;
use crate::types::{Datasets, RecordKind, ReportTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Report {
    TopScorersPerSeason,
    EconomicalPowerplayBowlers,
    TossImpact,
    ScoresByVenue,
    DismissalTypes,
    TeamTossPerformance,
    RunsPerOver,
}

impl Report {
    pub const ALL: [Report; 7] = [
        Report::TopScorersPerSeason,
        Report::EconomicalPowerplayBowlers,
        Report::TossImpact,
        Report::ScoresByVenue,
        Report::DismissalTypes,
        Report::TeamTossPerformance,
        Report::RunsPerOver,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Report::TopScorersPerSeason => "top_scorers_per_season",
            Report::EconomicalPowerplayBowlers => "economical_powerplay_bowlers",
            Report::TossImpact => "toss_impact",
            Report::ScoresByVenue => "scores_by_venue",
            Report::DismissalTypes => "dismissal_types",
            Report::TeamTossPerformance => "team_toss_performance",
            Report::RunsPerOver => "runs_per_over",
        }
    }

    /// Tables the query reads
    pub fn inputs(self) -> &'static [RecordKind] {
        use RecordKind::*;
        match self {
            Report::TopScorersPerSeason => &[Deliveries, Matches, Players],
            Report::EconomicalPowerplayBowlers => &[Deliveries, Players],
            Report::TossImpact => &[Matches],
            Report::ScoresByVenue => &[Deliveries, Matches],
            Report::DismissalTypes => &[Deliveries],
            Report::TeamTossPerformance => &[Matches, Teams],
            Report::RunsPerOver => &[Deliveries],
        }
    }

    /// Columns outside the required set that the query reads
    pub fn optional_columns(self) -> &'static [(RecordKind, &'static str)] {
        match self {
            Report::DismissalTypes => &[(RecordKind::Deliveries, "out_type")],
            _ => &[],
        }
    }

    /// Optional columns this report needs that the loaded schemas lack,
    /// as `table.column`
    pub fn missing_columns(self, datasets: &Datasets) -> Vec<String> {
        self.optional_columns()
            .iter()
            .filter(|(kind, column)| !datasets.get(*kind).schema.has_column(column))
            .map(|(kind, column)| format!("{}.{}", kind, column))
            .collect()
    }

    pub fn sql(self, settings: &ReportSettings) -> String {
        match self {
            Report::TopScorersPerSeason => top_scorers_sql(settings.top_n_per_season),
            Report::EconomicalPowerplayBowlers => powerplay_bowlers_sql(
                settings.powerplay_overs,
                settings.min_powerplay_deliveries,
            ),
            Report::TossImpact => toss_impact_sql(),
            Report::ScoresByVenue => scores_by_venue_sql(),
            Report::DismissalTypes => dismissal_types_sql(),
            Report::TeamTossPerformance => team_toss_performance_sql(),
            Report::RunsPerOver => runs_per_over_sql(),
        }
    }

    pub fn run(self, ctx: &PipelineContext, settings: &ReportSettings) -> Result<ReportTable> {
        for kind in self.inputs() {
            ctx.require_table(kind.table_name())?;
        }
        let table = ctx.sql_collect(self.name(), &self.sql(settings))?;
        debug!(report = self.name(), rows = table.num_rows(), "report computed");
        Ok(table)
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// `numerator * 100 / denominator` as a double, 0.0 when the denominator is 0
pub fn guarded_percentage(numerator: &str, denominator: &str) -> String {
    format!(
        "COALESCE(CAST({numerator} AS DOUBLE) * 100.0 / NULLIF(CAST({denominator} AS DOUBLE), 0.0), 0.0)"
    )
}

const WICKET_COUNT: &str = "SUM(CASE WHEN d.bowler_wicket THEN 1 ELSE 0 END)";

fn top_scorers_sql(top_n: usize) -> String {
    let rank_filter = if top_n == 0 {
        String::new()
    } else {
        format!("WHERE season_rank <= {top_n}")
    };
    format!(
        "WITH season_runs AS (
            SELECT p.player_id, p.player_name, m.season_year, SUM(d.runs_scored) AS total_runs
            FROM deliveries d
            JOIN matches m ON d.match_id = m.match_id
            JOIN players p ON d.striker = p.player_id
            GROUP BY p.player_id, p.player_name, m.season_year
        ),
        ranked AS (
            SELECT season_year, player_id, player_name, total_runs,
                   CAST(ROW_NUMBER() OVER (
                       PARTITION BY season_year
                       ORDER BY total_runs DESC, player_id, player_name
                   ) AS BIGINT) AS season_rank
            FROM season_runs
        )
        SELECT season_year, season_rank, player_id, player_name, total_runs
        FROM ranked
        {rank_filter}
        ORDER BY season_year, total_runs DESC, player_id, player_name"
    )
}

fn powerplay_bowlers_sql(powerplay_overs: i64, min_deliveries: i64) -> String {
    format!(
        "SELECT p.player_id, p.player_name,
                COUNT(*) AS \"deliveries\",
                AVG(CAST(d.runs_scored AS DOUBLE)) AS avg_runs_per_ball,
                {WICKET_COUNT} AS total_wickets
        FROM deliveries d
        JOIN players p ON d.bowler = p.player_id
        WHERE d.over_id <= {powerplay_overs}
        GROUP BY p.player_id, p.player_name
        HAVING COUNT(*) > {min_deliveries}
        ORDER BY avg_runs_per_ball, total_wickets DESC, p.player_id, p.player_name"
    )
}

fn toss_impact_sql() -> String {
    let percentage = guarded_percentage("COUNT(*)", "MAX(t.total_matches)");
    format!(
        "WITH outcomes AS (
            SELECT toss_winner,
                   CASE
                       WHEN match_winner IS NULL THEN 'No Result'
                       WHEN toss_winner = match_winner THEN 'Won'
                       ELSE 'Lost'
                   END AS match_outcome
            FROM matches
        ),
        total AS (SELECT COUNT(*) AS total_matches FROM matches)
        SELECT o.toss_winner, o.match_outcome,
               COUNT(*) AS \"matches\",
               {percentage} AS percentage
        FROM outcomes o CROSS JOIN total t
        GROUP BY o.toss_winner, o.match_outcome
        ORDER BY o.toss_winner, o.match_outcome"
    )
}

fn scores_by_venue_sql() -> String {
    "WITH match_totals AS (
        SELECT m.match_id, m.venue, SUM(d.runs_scored + d.extra_runs) AS match_total
        FROM deliveries d
        JOIN matches m ON d.match_id = m.match_id
        GROUP BY m.match_id, m.venue
    )
    SELECT venue,
           AVG(CAST(match_total AS DOUBLE)) AS average_score,
           MAX(match_total) AS highest_score,
           COUNT(*) AS \"matches\"
    FROM match_totals
    GROUP BY venue
    ORDER BY average_score DESC, venue"
        .to_string()
}

fn dismissal_types_sql() -> String {
    "SELECT out_type, COUNT(*) AS frequency
    FROM deliveries
    WHERE out_type IS NOT NULL
    GROUP BY out_type
    ORDER BY frequency DESC, out_type"
        .to_string()
}

fn team_toss_performance_sql() -> String {
    let wins = "SUM(CASE WHEN m.match_winner = m.toss_winner THEN 1 ELSE 0 END)";
    let percentage = guarded_percentage(wins, "COUNT(*)");
    format!(
        "SELECT t.team_name AS team,
                COUNT(*) AS tosses_won,
                {wins} AS wins_after_toss,
                {percentage} AS win_percentage
        FROM matches m
        JOIN teams t ON m.toss_winner = t.team_name
        GROUP BY t.team_name
        ORDER BY wins_after_toss DESC, team"
    )
}

fn runs_per_over_sql() -> String {
    format!(
        "SELECT d.innings_number, d.over_id,
                SUM(d.runs_scored + d.extra_runs) AS total_runs,
                {WICKET_COUNT} AS wickets,
                COUNT(*) AS \"deliveries\"
        FROM deliveries d
        GROUP BY d.innings_number, d.over_id
        ORDER BY d.innings_number, d.over_id"
    )
}
