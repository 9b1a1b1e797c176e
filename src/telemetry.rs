use crate::ingest::Entity;

/// Telemetry events sent from the loader to whoever renders progress
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// An entity's file was read and mapped; `records` rows are about to be written
    EntityStarted { entity: Entity, records: usize },
    /// One upsert statement was committed
    BatchWritten {
        entity: Entity,
        records: usize,
        duration_ms: u64,
    },
    /// Every batch of an entity was committed
    EntityCompleted { entity: Entity },
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub entities_started: usize,
    pub entities_completed: usize,
    pub records_expected: u64,
    pub records_written: u64,
    pub batches_written: u64,
    pub batch_durations_ms: Vec<u64>,
    /// Entity whose batches are being written
    pub current_entity: Option<Entity>,
    pub completed_entities: Vec<Entity>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::EntityStarted { entity, records } => {
                self.entities_started += 1;
                self.records_expected += *records as u64;
                self.current_entity = Some(*entity);
            }
            TelemetryEvent::BatchWritten {
                entity,
                records,
                duration_ms,
            } => {
                self.records_written += *records as u64;
                self.batches_written += 1;
                self.batch_durations_ms.push(*duration_ms);
                self.current_entity = Some(*entity);
            }
            TelemetryEvent::EntityCompleted { entity } => {
                self.entities_completed += 1;
                self.completed_entities.push(*entity);
                if self.current_entity == Some(*entity) {
                    self.current_entity = None;
                }
            }
        }
    }

    /// Calculate percentile from batch durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.batch_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.batch_durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil().max(1.0) as usize - 1;
        let index = index.min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}
