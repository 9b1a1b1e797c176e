//! Ingestion pipeline - entity catalog, record mapping and batched loading

pub mod entity;
pub mod loader;
pub mod mapping;

pub use entity::{Entity, load_order};
pub use loader::{EntityLoadResult, Loader};
