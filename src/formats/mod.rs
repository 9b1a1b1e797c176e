//! File format parsers and readers

pub mod delimited;
pub mod json;
pub mod reader;

pub use reader::{RawValue, Record, create_reader};
