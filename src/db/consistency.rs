//! Read-only diagnostics over the loaded tables.
//!
//! These checks are advisory: they report what they find and never repair or
//! block ingestion.

use serde::Serialize;

use super::pool::{Dialect, Pool};
use super::schema::{
    COSTS, COURIER_STAFF, ROUTES, SHIPMENT_TRACKING, SHIPMENTS, TableSpec, WAREHOUSES, quote,
};
use crate::error::{LoadError, Result};

/// Tables in reporting order
const TABLES: [&TableSpec; 6] = [
    &SHIPMENTS,
    &SHIPMENT_TRACKING,
    &COURIER_STAFF,
    &ROUTES,
    &WAREHOUSES,
    &COSTS,
];

const ORPHANED_TRACKING_EVENTS: &str = r#"
    SELECT COUNT(*) FROM "shipment_tracking" st
    WHERE NOT EXISTS (
        SELECT 1 FROM "shipments" s WHERE s."shipment_id" = st."shipment_id"
    )
"#;

const ORPHANED_COSTS: &str = r#"
    SELECT COUNT(*) FROM "costs" c
    WHERE NOT EXISTS (
        SELECT 1 FROM "shipments" s WHERE s."shipment_id" = c."shipment_id"
    )
"#;

const UNKNOWN_COURIER_REFERENCES: &str = r#"
    SELECT COUNT(*) FROM "shipments" s
    WHERE s."courier_id" IS NOT NULL
    AND NOT EXISTS (
        SELECT 1 FROM "courier_staff" cs WHERE cs."courier_id" = s."courier_id"
    )
"#;

/// Counts of rows whose references point nowhere
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    /// Tracking rows whose shipment does not exist
    pub orphaned_tracking_events: i64,
    /// Cost rows whose shipment does not exist
    pub orphaned_costs: i64,
    /// Shipments naming a courier that does not exist
    pub unknown_courier_references: i64,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_tracking_events == 0
            && self.orphaned_costs == 0
            && self.unknown_courier_references == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub table: &'static str,
    pub rows: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnNulls {
    pub column: &'static str,
    pub nulls: i64,
}

/// NULL counts for every column of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableNulls {
    pub table: &'static str,
    pub rows: i64,
    pub columns: Vec<ColumnNulls>,
}

impl TableNulls {
    /// Columns holding at least one NULL
    pub fn with_nulls(&self) -> impl Iterator<Item = &ColumnNulls> {
        self.columns.iter().filter(|c| c.nulls > 0)
    }
}

/// Which of the ingest tables exist in the connected store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub present: Vec<&'static str>,
    pub missing: Vec<&'static str>,
}

async fn count(pool: &Pool, sql: &str) -> Result<i64> {
    pool.fetch_count(sql)
        .await
        .map_err(|source| LoadError::store(source, LoadError::Query))
}

pub async fn check_consistency(pool: &Pool) -> Result<ConsistencyReport> {
    let report = ConsistencyReport {
        orphaned_tracking_events: count(pool, ORPHANED_TRACKING_EVENTS).await?,
        orphaned_costs: count(pool, ORPHANED_COSTS).await?,
        unknown_courier_references: count(pool, UNKNOWN_COURIER_REFERENCES).await?,
    };

    if report.is_consistent() {
        tracing::info!("no orphaned rows found");
    } else {
        tracing::warn!(
            orphaned_tracking_events = report.orphaned_tracking_events,
            orphaned_costs = report.orphaned_costs,
            unknown_courier_references = report.unknown_courier_references,
            "consistency issues found"
        );
    }

    Ok(report)
}

/// Row counts for every table
pub async fn table_statistics(pool: &Pool) -> Result<Vec<TableStats>> {
    let mut stats = Vec::with_capacity(TABLES.len());
    for table in TABLES {
        let rows = count(pool, &format!("SELECT COUNT(*) FROM {}", quote(table.name))).await?;
        stats.push(TableStats {
            table: table.name,
            rows,
        });
    }

    Ok(stats)
}

/// Per-column NULL counts for every table
pub async fn missing_values(pool: &Pool) -> Result<Vec<TableNulls>> {
    let mut report = Vec::with_capacity(TABLES.len());
    for table in TABLES {
        let name = quote(table.name);
        let rows = count(pool, &format!("SELECT COUNT(*) FROM {name}")).await?;

        let mut columns = Vec::with_capacity(table.columns.len());
        for column in table.columns {
            let nulls = count(
                pool,
                &format!(
                    "SELECT COUNT(*) FROM {name} WHERE {} IS NULL",
                    quote(column.name)
                ),
            )
            .await?;
            columns.push(ColumnNulls {
                column: column.name,
                nulls,
            });
        }

        let table_nulls = TableNulls {
            table: table.name,
            rows,
            columns,
        };
        for column in table_nulls.with_nulls() {
            tracing::debug!(table = table.name, column = column.column, nulls = column.nulls, "missing values");
        }
        report.push(table_nulls);
    }

    Ok(report)
}

/// Round-trip to the store and list which ingest tables exist
pub async fn check_connection(pool: &Pool) -> Result<ConnectionStatus> {
    let mut status = ConnectionStatus::default();
    for table in TABLES {
        let sql = match pool.dialect() {
            Dialect::Postgres => format!(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = '{}'",
                table.name
            ),
            #[cfg(test)]
            Dialect::Sqlite => format!(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '{}'",
                table.name
            ),
        };

        if count(pool, &sql).await? > 0 {
            status.present.push(table.name);
        } else {
            status.missing.push(table.name);
        }
    }

    tracing::info!(present = status.present.len(), missing = status.missing.len(), "store reachable");
    Ok(status)
}
