//! Newline-delimited JSON output.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value as JsonValue};

use crate::data::{DataSink, Frame};
use crate::TextClassError;

/// Writes one JSON object per row, keyed by column name.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

/// Convert a frame row into a JSON object.
pub fn row_to_json(columns: &[String], row: &[crate::data::Value]) -> JsonValue {
    let mut obj = Map::with_capacity(columns.len());
    for (name, value) in columns.iter().zip(row) {
        obj.insert(
            name.clone(),
            serde_json::to_value(value).unwrap_or(JsonValue::Null),
        );
    }
    JsonValue::Object(obj)
}

impl DataSink for JsonlSink {
    fn write(&self, frame: &Frame) -> Result<(), TextClassError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = std::fs::File::create(&self.path)?;
        let mut out = BufWriter::new(file);
        for row in frame.rows() {
            serde_json::to_writer(&mut out, &row_to_json(frame.columns(), row))?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }
}
