use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::error::{LoadError, Result};
use crate::formats::reader::{FileReader, RawValue, Record};
use crate::io::ByteReader;

/// Reader for hierarchical sources: a JSON array of flat objects
pub struct GenericJsonReader<R: ByteReader> {
    reader: R,
}

impl<R: ByteReader> GenericJsonReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

fn to_raw_value(value: Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Bool(b) => RawValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => RawValue::Integer(i),
            None => n.as_f64().map(RawValue::Float).unwrap_or(RawValue::Null),
        },
        Value::String(s) => RawValue::Text(s),
        nested @ (Value::Array(_) | Value::Object(_)) => RawValue::Text(nested.to_string()),
    }
}

#[async_trait]
impl<R: ByteReader + 'static> FileReader for GenericJsonReader<R> {
    fn location(&self) -> &Path {
        self.reader.location()
    }

    async fn read_records(&self) -> Result<Vec<Record>> {
        let buffer = self.reader.read_all().await?;
        let location = self.reader.location();

        let document: Value = serde_json::from_slice(&buffer)
            .map_err(|e| LoadError::parse(location, format!("invalid JSON: {e}")))?;

        let Value::Array(items) = document else {
            return Err(LoadError::parse(
                location,
                "expected a top-level array of objects",
            ));
        };

        let records = items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::Object(map) => Ok(map
                    .into_iter()
                    .map(|(key, value)| (key, to_raw_value(value)))
                    .collect::<Record>()),
                other => Err(LoadError::parse(
                    location,
                    format!("record {idx} is not an object: {other}"),
                )),
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            path = %location.display(),
            records = records.len(),
            "parsed JSON file"
        );

        Ok(records)
    }
}
