use async_trait::async_trait;
use std::path::Path;

use crate::error::{LoadError, Result};
use crate::formats::reader::{DelimitedConfig, FileReader, RawValue, Record};
use crate::io::ByteReader;

/// Generic delimited file reader that works with any ByteReader implementation.
/// The first row is the header; every following row becomes one record.
pub struct GenericDelimitedReader<R: ByteReader> {
    reader: R,
    config: DelimitedConfig,
}

impl<R: ByteReader> GenericDelimitedReader<R> {
    pub fn new(reader: R, config: DelimitedConfig) -> Self {
        Self { reader, config }
    }

    fn parse_error(&self, message: impl Into<String>) -> LoadError {
        LoadError::parse(self.reader.location(), message)
    }
}

/// Type a single cell. Numbers are only typed when the text round-trips, so
/// identifiers such as `007` or `1.10` stay text.
fn infer_value(raw: &str) -> RawValue {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return RawValue::Null;
    }

    if let Ok(val) = trimmed.parse::<i64>()
        && val.to_string() == trimmed
    {
        return RawValue::Integer(val);
    }

    if trimmed.contains('.')
        && let Ok(val) = trimmed.parse::<f64>()
        && val.is_finite()
        && val.to_string() == trimmed
    {
        return RawValue::Float(val);
    }

    RawValue::Text(trimmed.to_string())
}

#[async_trait]
impl<R: ByteReader + 'static> FileReader for GenericDelimitedReader<R> {
    fn location(&self) -> &Path {
        self.reader.location()
    }

    async fn read_records(&self) -> Result<Vec<Record>> {
        let buffer = self.reader.read_all().await?;

        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(self.config.delimiter)
            .quote(self.config.quote)
            .has_headers(true)
            .from_reader(buffer.as_slice());

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| self.parse_error(format!("invalid header row: {e}")))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(self.parse_error("missing header row"));
        }

        let mut records = Vec::new();

        for result in csv_reader.records() {
            // Unequal row lengths surface here with their position
            let row = result.map_err(|e| self.parse_error(e.to_string()))?;

            records.push(
                headers
                    .iter()
                    .zip(row.iter())
                    .map(|(name, value)| (name.clone(), infer_value(value)))
                    .collect(),
            );
        }

        tracing::debug!(
            path = %self.reader.location().display(),
            records = records.len(),
            "parsed delimited file"
        );

        Ok(records)
    }
}
