use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use super::delimited::reader::GenericDelimitedReader;
use super::json::reader::GenericJsonReader;
use crate::error::{LoadError, Result};
use crate::io::LocalFileByteReader;

/// A raw field value as it came out of a source file
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => f.write_str("null"),
            RawValue::Bool(b) => write!(f, "{b}"),
            RawValue::Integer(i) => write!(f, "{i}"),
            RawValue::Float(x) => write!(f, "{x}"),
            RawValue::Text(s) => f.write_str(s),
        }
    }
}

/// A single record (row or object) from a source file, keyed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub fields: BTreeMap<String, RawValue>,
}

impl Record {
    /// Look up a field; absent fields and explicit nulls both yield `None`
    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.fields.get(column).filter(|v| !v.is_null())
    }
}

impl<K: Into<String>> FromIterator<(K, RawValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, RawValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Trait for reading different file formats into records
#[async_trait]
pub trait FileReader: Send + Sync {
    /// Path of the source, for logging and error messages
    fn location(&self) -> &Path;

    /// Read and parse every record in the source
    async fn read_records(&self) -> Result<Vec<Record>>;
}

/// Configuration for delimited file reading (CSV, TSV, etc.)
#[derive(Debug, Clone)]
pub struct DelimitedConfig {
    pub delimiter: u8,
    pub quote: u8,
}

impl Default for DelimitedConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }
}

impl DelimitedConfig {
    pub fn csv() -> Self {
        Self::default()
    }

    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            quote: b'"',
        }
    }
}

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Tsv,
    Json,
}

impl Format {
    /// Parse format from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Some(Format::Csv),
            "tsv" => Some(Format::Tsv),
            "json" => Some(Format::Json),
            _ => None,
        }
    }

    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::parse)
    }
}

/// Create a FileReader for a local file
///
/// The format is taken from `format` when given, otherwise from the file
/// extension.
pub fn create_reader(path: &Path, format: Option<Format>) -> Result<Box<dyn FileReader>> {
    let format = format.or_else(|| Format::from_path(path)).ok_or_else(|| {
        LoadError::parse(
            path,
            "cannot detect file format; supported extensions: .csv, .tsv, .json",
        )
    })?;

    let byte_reader = LocalFileByteReader::new(path);
    let reader: Box<dyn FileReader> = match format {
        Format::Csv => Box::new(GenericDelimitedReader::new(
            byte_reader,
            DelimitedConfig::csv(),
        )),
        Format::Tsv => Box::new(GenericDelimitedReader::new(
            byte_reader,
            DelimitedConfig::tsv(),
        )),
        Format::Json => Box::new(GenericJsonReader::new(byte_reader)),
    };
    Ok(reader)
}
