use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::sync::mpsc;

use super::entity::{Entity, load_order};
use super::mapping::map_records;
use crate::config::BATCH_SIZE;
use crate::db::Pool;
use crate::db::upsert::{max_rows_per_statement, upsert_batch};
use crate::error::{LoadError, Result};
use crate::formats::create_reader;
use crate::telemetry::TelemetryEvent;

/// Outcome of loading one entity's file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLoadResult {
    pub entity: Entity,
    /// Records read from the source file
    pub records: usize,
    /// Upsert statements issued
    pub batches: usize,
}

/// Loads source files into the store, one entity at a time
pub struct Loader {
    pool: Pool,
    batch_size: usize,
    telemetry_tx: Option<mpsc::UnboundedSender<TelemetryEvent>>,
}

impl Loader {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            batch_size: BATCH_SIZE,
            telemetry_tx: None,
        }
    }

    /// Records per upsert statement; zero is treated as one
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_telemetry(mut self, telemetry_tx: mpsc::UnboundedSender<TelemetryEvent>) -> Self {
        self.telemetry_tx = Some(telemetry_tx);
        self
    }

    fn send(&self, event: TelemetryEvent) {
        if let Some(tx) = &self.telemetry_tx {
            // The receiver going away only means nobody is rendering progress
            let _ = tx.send(event);
        }
    }

    /// Read, map and upsert one entity's file.
    ///
    /// Every record is mapped before anything is written, so a malformed
    /// file leaves the table untouched. Batches commit independently: when
    /// batch `n` fails, batches `0..n` stay committed.
    pub async fn load_entity(&self, entity: Entity, path: &Path) -> Result<EntityLoadResult> {
        let table = entity.table();
        let reader = create_reader(path, None)?;
        let records = reader.read_records().await?;
        let rows = map_records(table, &records, reader.location())?;

        tracing::info!(
            entity = %entity,
            path = %path.display(),
            records = rows.len(),
            "loading"
        );
        self.send(TelemetryEvent::EntityStarted {
            entity,
            records: rows.len(),
        });

        let batch_size = self.batch_size.min(max_rows_per_statement(table));
        if batch_size < self.batch_size {
            tracing::warn!(
                table = table.name,
                requested = self.batch_size,
                batch_size,
                "batch size capped by the statement parameter limit"
            );
        }

        let mut batches = 0;
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let batch: Vec<_> = rows.by_ref().take(batch_size).collect();
            let batch_records = batch.len();
            let start = Instant::now();

            upsert_batch(&self.pool, table, batch)
                .await
                .map_err(|source| {
                    LoadError::store(source, |source| LoadError::Write {
                        table: table.name,
                        batch: batches,
                        source,
                    })
                })?;

            let duration_ms = start.elapsed().as_millis() as u64;
            tracing::debug!(
                table = table.name,
                batch = batches,
                records = batch_records,
                duration_ms,
                "batch committed"
            );
            self.send(TelemetryEvent::BatchWritten {
                entity,
                records: batch_records,
                duration_ms,
            });
            batches += 1;
        }

        self.send(TelemetryEvent::EntityCompleted { entity });
        tracing::info!(entity = %entity, records = records.len(), batches, "loaded");

        Ok(EntityLoadResult {
            entity,
            records: records.len(),
            batches,
        })
    }

    /// Load every entity from its conventional file under `base_path`, in
    /// dependency order. Stops at the first failure; entities loaded before
    /// it stay committed.
    pub async fn ingest_all(&self, base_path: &Path) -> Result<Vec<EntityLoadResult>> {
        let order = load_order()?;
        let mut results = Vec::with_capacity(order.len());

        for entity in order {
            let path: PathBuf = base_path.join(entity.file_name());
            match self.load_entity(entity, &path).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(entity = %entity, error = %e, "ingestion stopped");
                    return Err(LoadError::Stage {
                        entity,
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(results)
    }
}
