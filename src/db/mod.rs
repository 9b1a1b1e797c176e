//! Database layer - connection pooling, schema management, upserts and consistency diagnostics

pub mod consistency;
pub mod pool;
pub mod schema;
pub mod upsert;
pub mod value;

pub use pool::Pool;
pub use value::SqlValue;
