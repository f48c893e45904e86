//! Tab-separated corpus files.
//!
//! The SMS Spam Collection ships as `label<TAB>text` lines with no header
//! and unescaped quotes, so quoting is disabled on both sides.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::data::{DataSink, DataSource, Frame, Value};
use crate::TextClassError;

/// Reads a TSV file into a [`Frame`] of text cells.
#[derive(Debug, Clone)]
pub struct TsvSource {
    path: PathBuf,
    columns: Option<Vec<String>>,
    has_header: bool,
}

impl TsvSource {
    /// Headerless file with explicit column names.
    pub fn headerless<S: Into<String>>(
        path: impl AsRef<Path>,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            columns: Some(columns.into_iter().map(Into::into).collect()),
            has_header: false,
        }
    }

    /// File whose first line names the columns.
    pub fn with_header(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            columns: None,
            has_header: true,
        }
    }
}

impl DataSource for TsvSource {
    fn read(&self) -> Result<Frame, TextClassError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(self.has_header)
            .quoting(false)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| {
                TextClassError::Data(format!("Failed to open {}: {}", self.path.display(), e))
            })?;

        let columns: Vec<String> = match (&self.columns, self.has_header) {
            (Some(columns), _) => columns.clone(),
            (None, true) => reader.headers()?.iter().map(str::to_string).collect(),
            (None, false) => {
                return Err(TextClassError::Config(
                    "Headerless TSV needs explicit column names".to_string(),
                ))
            }
        };

        let mut frame = Frame::new(columns.iter().cloned());
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() > columns.len() {
                return Err(TextClassError::Data(format!(
                    "{}: record {} has {} fields, expected at most {}",
                    self.path.display(),
                    line + 1,
                    record.len(),
                    columns.len()
                )));
            }
            let mut row: Vec<Value> = record.iter().map(Value::from).collect();
            row.resize(columns.len(), Value::Null);
            frame.push_row(row)?;
        }

        debug!("Read {} rows from {}", frame.len(), self.path.display());
        Ok(frame)
    }
}

/// Writes a [`Frame`] as TSV with a header line.
#[derive(Debug, Clone)]
pub struct TsvSink {
    path: PathBuf,
}

impl TsvSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl DataSink for TsvSink {
    fn write(&self, frame: &Frame) -> Result<(), TextClassError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(csv::QuoteStyle::Never)
            .from_path(&self.path)?;

        writer.write_record(frame.columns())?;
        for (i, row) in frame.rows().iter().enumerate() {
            let fields: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            if let Some(bad) = fields.iter().find(|f| f.contains(['\t', '\n', '\r'])) {
                return Err(TextClassError::Data(format!(
                    "Row {} cannot be written as TSV: value contains a tab or newline: {:?}",
                    i, bad
                )));
            }
            writer.write_record(&fields)?;
        }
        writer.flush()?;

        debug!("Wrote {} rows to {}", frame.len(), self.path.display());
        Ok(())
    }
}
