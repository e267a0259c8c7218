//! Referential checks across the input tables
//!
//! Reports join the inputs with inner joins, which silently drop rows whose
//! foreign key has no parent. These checks count what the joins drop, plus
//! duplicated keys that would fan joins out.
//!
//! # SQL shape
//!
//! ```sql
//! SELECT COUNT(*) FROM deliveries c
//! WHERE c."striker" IS NOT NULL
//!   AND NOT EXISTS (SELECT 1 FROM players p WHERE p."player_id" = c."striker")
//! ```
//!
//! DataFusion plans the correlated `NOT EXISTS` as a left anti join.

use serde::Serialize;
use tracing::{info, warn};

use crate::engine::PipelineContext;
use crate::error::Result;
use crate::helpers::{quote_ident, scalar_i64};
use crate::types::RecordKind;

/// A declared child → parent key relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: &'static str,
    pub child: RecordKind,
    pub child_column: &'static str,
    pub parent: RecordKind,
    pub parent_column: &'static str,
}

pub const FOREIGN_KEYS: [ForeignKey; 5] = [
    ForeignKey {
        name: "delivery_match",
        child: RecordKind::Deliveries,
        child_column: "match_id",
        parent: RecordKind::Matches,
        parent_column: "match_id",
    },
    ForeignKey {
        name: "delivery_striker",
        child: RecordKind::Deliveries,
        child_column: "striker",
        parent: RecordKind::Players,
        parent_column: "player_id",
    },
    ForeignKey {
        name: "delivery_bowler",
        child: RecordKind::Deliveries,
        child_column: "bowler",
        parent: RecordKind::Players,
        parent_column: "player_id",
    },
    ForeignKey {
        name: "match_toss_winner",
        child: RecordKind::Matches,
        child_column: "toss_winner",
        parent: RecordKind::Teams,
        parent_column: "team_name",
    },
    ForeignKey {
        name: "match_winner",
        child: RecordKind::Matches,
        child_column: "match_winner",
        parent: RecordKind::Teams,
        parent_column: "team_name",
    },
];

/// Keys that must be unique: each table's primary key, plus team_name,
/// which matches join teams on
pub const UNIQUE_KEYS: [(RecordKind, &str); 4] = [
    (RecordKind::Matches, "match_id"),
    (RecordKind::Players, "player_id"),
    (RecordKind::Teams, "team_id"),
    (RecordKind::Teams, "team_name"),
];

impl ForeignKey {
    /// Count child rows with a non-null key that has no parent row
    pub fn orphan_sql(&self) -> String {
        let child_column = quote_ident(self.child_column);
        format!(
            "SELECT COUNT(*) AS orphans FROM {child} c \
             WHERE c.{child_column} IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM {parent} p WHERE p.{parent_column} = c.{child_column})",
            child = self.child.table_name(),
            parent = self.parent.table_name(),
            parent_column = quote_ident(self.parent_column),
        )
    }
}

fn duplicate_sql(kind: RecordKind, key: &str) -> String {
    let key = quote_ident(key);
    format!(
        "SELECT COUNT(*) - COUNT(DISTINCT {key}) AS duplicates FROM {}",
        kind.table_name()
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanCount {
    pub relation: String,
    pub table: RecordKind,
    pub column: String,
    pub references: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateKeyCount {
    pub table: RecordKind,
    pub key: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataQualityReport {
    pub orphans: Vec<OrphanCount>,
    pub duplicate_keys: Vec<DuplicateKeyCount>,
}

impl DataQualityReport {
    pub fn total_orphans(&self) -> i64 {
        self.orphans.iter().map(|o| o.count).sum()
    }

    pub fn total_duplicates(&self) -> i64 {
        self.duplicate_keys.iter().map(|d| d.count).sum()
    }

    pub fn orphans_for(&self, relation: &str) -> Option<i64> {
        self.orphans
            .iter()
            .find(|o| o.relation == relation)
            .map(|o| o.count)
    }
}

/// Count orphaned foreign keys and duplicated unique keys
///
/// Findings are logged and returned; they never fail the run.
pub fn check_data_quality(ctx: &PipelineContext) -> Result<DataQualityReport> {
    let mut report = DataQualityReport::default();

    for fk in FOREIGN_KEYS {
        ctx.require_table(fk.child.table_name())?;
        ctx.require_table(fk.parent.table_name())?;
        let count = scalar_i64(&ctx.sql_collect(fk.name, &fk.orphan_sql())?)?;
        if count > 0 {
            warn!(
                relation = fk.name,
                count,
                "{}.{} rows without a matching {}.{}",
                fk.child,
                fk.child_column,
                fk.parent,
                fk.parent_column
            );
        }
        report.orphans.push(OrphanCount {
            relation: fk.name.to_string(),
            table: fk.child,
            column: fk.child_column.to_string(),
            references: format!("{}.{}", fk.parent, fk.parent_column),
            count,
        });
    }

    for (kind, key) in UNIQUE_KEYS {
        ctx.require_table(kind.table_name())?;
        let name = format!("{}_{}_duplicates", kind, key);
        let count = scalar_i64(&ctx.sql_collect(&name, &duplicate_sql(kind, key))?)?;
        if count > 0 {
            warn!(table = %kind, key, count, "duplicate keys");
        }
        report.duplicate_keys.push(DuplicateKeyCount {
            table: kind,
            key: key.to_string(),
            count,
        });
    }

    info!(
        orphans = report.total_orphans(),
        duplicates = report.total_duplicates(),
        "data quality checked"
    );
    Ok(report)
}
