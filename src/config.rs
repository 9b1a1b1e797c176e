//! Configuration constants for the ingest pipeline
//!
//! This module centralizes the tunable parameters used by the store and the
//! loaders. Connection settings themselves are passed explicitly through
//! [`crate::db::pool::PoolArgs`].

use std::time::Duration;

// ============================================================================
// Connection Pool Configuration
// ============================================================================

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_PORT: u16 = 5432;

pub const DEFAULT_POOL_SIZE: u32 = 5;

// ============================================================================
// Ingestion Configuration
// ============================================================================

/// Number of records written per upsert statement
///
/// Batching only exists for write throughput. Each batch is its own
/// statement; nothing spans batches, so a failure leaves earlier batches
/// committed.
pub const BATCH_SIZE: usize = 500;

/// Upper bound on bind parameters in one statement (the Postgres wire
/// protocol counts them in a u16). Batches of wide tables are capped so a
/// single upsert never exceeds it.
pub const MAX_BIND_PARAMETERS: usize = 65535;
