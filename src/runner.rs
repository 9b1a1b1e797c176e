//! High-level runner API for the logistics ingest pipeline.
//!
//! This module is the public face of the crate: it owns the connection pool
//! and exposes the operator actions (initialize or reset the schema, load
//! data, check consistency, show statistics). The CLI is a thin layer on top.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::db::{self, Pool};
use crate::error::Result;
use crate::ingest::{Loader, load_order};
use crate::telemetry::{ProgressStats, TelemetryEvent};

pub use crate::config::BATCH_SIZE;
pub use crate::db::consistency::{
    ColumnNulls, ConnectionStatus, ConsistencyReport, TableNulls, TableStats,
};
pub use crate::db::pool::{PoolArgs, PoolArgsBuilder, PoolArgsBuilderError};
pub use crate::error::LoadError;
pub use crate::ingest::{Entity, EntityLoadResult};

/// Options for a load run
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Records per upsert statement
    pub batch_size: usize,
    /// Suppress progress bars
    pub quiet: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            quiet: true,
        }
    }
}

/// Result of a completed load run
#[derive(Debug)]
pub struct LoadSummary {
    pub entities: Vec<EntityLoadResult>,
    pub duration: Duration,
}

impl LoadSummary {
    pub fn records_loaded(&self) -> usize {
        self.entities.iter().map(|e| e.records).sum()
    }
}

/// A connected store on which operator actions run
///
/// # Example
///
/// ```no_run
/// use logistics_ingest::runner::{LoadOptions, PoolArgsBuilder, Store};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let args = PoolArgsBuilder::default()
///     .host("localhost")
///     .username("logistics")
///     .password("secret")
///     .database("logistics")
///     .build()?;
///
/// let store = Store::connect(args).await?;
/// store.init_schema().await?;
/// let summary = store.load_all(Path::new("data"), &LoadOptions::default()).await?;
/// println!("Loaded {} records in {:?}", summary.records_loaded(), summary.duration);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Store {
    pool: Pool,
}

impl Store {
    pub async fn connect(args: PoolArgs) -> Result<Self> {
        let pool = db::pool::pool(args).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create all tables and indexes if they do not exist
    pub async fn init_schema(&self) -> Result<()> {
        let tables: Vec<_> = load_order()?.into_iter().map(Entity::table).collect();
        db::schema::create_schema(&self.pool, &tables).await?;
        tracing::info!(tables = tables.len(), "schema initialized");
        Ok(())
    }

    /// Drop every table and recreate the schema. Destroys all loaded data.
    pub async fn reset_schema(&self) -> Result<()> {
        db::schema::drop_schema(&self.pool).await?;
        self.init_schema().await
    }

    /// Load every entity from its conventional file under `base_path`
    pub async fn load_all(&self, base_path: &Path, options: &LoadOptions) -> Result<LoadSummary> {
        let start = Instant::now();
        let entity_count = Entity::ALL.len() as u64;

        let entities = self
            .with_progress(options, entity_count, |loader| async move {
                loader.ingest_all(base_path).await
            })
            .await?;

        Ok(LoadSummary {
            entities,
            duration: start.elapsed(),
        })
    }

    /// Load one entity from an explicit file
    pub async fn load_entity(
        &self,
        entity: Entity,
        path: &Path,
        options: &LoadOptions,
    ) -> Result<LoadSummary> {
        let start = Instant::now();

        let entities = self
            .with_progress(options, 1, |loader| async move {
                loader.load_entity(entity, path).await.map(|r| vec![r])
            })
            .await?;

        Ok(LoadSummary {
            entities,
            duration: start.elapsed(),
        })
    }

    pub async fn check_consistency(&self) -> Result<ConsistencyReport> {
        db::consistency::check_consistency(&self.pool).await
    }

    pub async fn table_statistics(&self) -> Result<Vec<TableStats>> {
        db::consistency::table_statistics(&self.pool).await
    }

    /// NULL counts per column, for spotting gaps in the source data
    pub async fn missing_values(&self) -> Result<Vec<TableNulls>> {
        db::consistency::missing_values(&self.pool).await
    }

    pub async fn check_connection(&self) -> Result<ConnectionStatus> {
        db::consistency::check_connection(&self.pool).await
    }

    /// Run `f` with a loader whose telemetry drives progress bars
    async fn with_progress<F, Fut, T>(&self, options: &LoadOptions, entities: u64, f: F) -> Result<T>
    where
        F: FnOnce(Loader) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let loader = Loader::new(self.pool.clone()).with_batch_size(options.batch_size);

        if options.quiet {
            return f(loader).await;
        }

        let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel::<TelemetryEvent>();
        let progress = setup_progress_tracking(entities, telemetry_rx);

        // The loader owns the only sender, so the channel closes when it is dropped
        let result = f(loader.with_telemetry(telemetry_tx)).await;

        // Wait for the progress bars to finish so we don't collide output
        let _ = progress.await;
        result
    }
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .map(|style| style.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn percentiles_message(stats: &ProgressStats) -> Option<String> {
    match stats.get_percentiles() {
        (Some(p50), Some(p90), Some(p99)) => {
            Some(format!("p50: {p50}ms, p90: {p90}ms, p99: {p99}ms"))
        }
        _ => None,
    }
}

fn setup_progress_tracking(
    entities: u64,
    mut telemetry_rx: mpsc::UnboundedReceiver<TelemetryEvent>,
) -> tokio::task::JoinHandle<()> {
    let multi_progress = MultiProgress::new();

    let entity_bar = multi_progress.add(ProgressBar::new(entities));
    entity_bar.set_style(bar_style(
        "[{elapsed_precise}] Entities: [{bar:30.cyan/blue}] {pos}/{len} {msg}",
    ));

    let rows_bar = multi_progress.add(ProgressBar::new(0));
    rows_bar.set_style(bar_style(
        "[{elapsed_precise}] Records:  [{bar:30.green/blue}] {human_pos}/{human_len} | {per_sec}",
    ));

    let stats_bar = multi_progress.add(ProgressBar::new(0));
    stats_bar.set_style(bar_style("[{elapsed_precise}] Batch Time: {msg}"));

    tokio::spawn(async move {
        let mut stats = ProgressStats::new();

        while let Some(event) = telemetry_rx.recv().await {
            stats.update(&event);

            match stats.current_entity {
                Some(entity) => entity_bar.set_message(entity.to_string()),
                None => entity_bar.set_message(String::new()),
            }
            entity_bar.set_position(stats.entities_completed as u64);
            rows_bar.set_length(stats.records_expected);
            rows_bar.set_position(stats.records_written);

            if let Some(message) = percentiles_message(&stats) {
                stats_bar.set_message(message);
            }
        }

        entity_bar.finish_with_message("done");
        rows_bar.finish();
        match percentiles_message(&stats) {
            Some(message) => stats_bar.finish_with_message(message),
            None => stats_bar.finish(),
        }
    })
}
