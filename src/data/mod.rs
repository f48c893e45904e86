//! Tabular data access for corpora and scoring inputs.
//!
//! The scoring pipeline only needs three capabilities from a dataframe
//! engine: read rows, apply a function to a column, write rows. [`DataSource`]
//! and [`DataSink`] cover the first and last; column application lives in
//! [`crate::inference::service::score_frame`] and
//! [`crate::labels::LabelTable::encode_column`].

pub mod jsonl;
pub mod memory;
pub mod tsv;

use std::fmt;
use std::ops::Range;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::TextClassError;

pub use jsonl::JsonlSink;
pub use memory::MemoryFrame;
pub use tsv::{TsvSink, TsvSource};

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
}

impl Value {
    /// Borrow the string payload, if this is a text cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "integer",
            Value::Text(_) => "text",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

/// Row-major table with named columns.
///
/// Every row holds exactly one value per column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    /// Create an empty frame with the given column names.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Create a frame from rows, checking each row's width.
    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Value>>,
    ) -> Result<Self, TextClassError> {
        let mut frame = Self::new(columns);
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    /// Append a row.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TextClassError> {
        if row.len() != self.columns.len() {
            return Err(TextClassError::Data(format!(
                "Row {} has {} values, expected {}",
                self.rows.len(),
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a named column.
    pub fn column_index(&self, name: &str) -> Result<usize, TextClassError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| {
                TextClassError::Data(format!(
                    "Column '{}' not found (available: {})",
                    name,
                    self.columns.join(", ")
                ))
            })
    }

    /// All values of a named column, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<&Value>, TextClassError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Values of a text column.
    ///
    /// Rejects the whole column with `InvalidInput` at the first non-text
    /// cell, so no partial work is done on a malformed batch.
    pub fn text_column(&self, name: &str) -> Result<Vec<String>, TextClassError> {
        let idx = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| match &row[idx] {
                Value::Text(s) => Ok(s.clone()),
                other => Err(TextClassError::InvalidInput {
                    index: i,
                    reason: format!("column '{}' holds {} instead of text", name, other.kind()),
                }),
            })
            .collect()
    }

    /// Return a copy with `name` set to `values`, replacing an existing
    /// column of that name or appending a new one.
    pub fn with_column(&self, name: &str, values: Vec<Value>) -> Result<Frame, TextClassError> {
        if values.len() != self.rows.len() {
            return Err(TextClassError::Data(format!(
                "Column '{}' has {} values but frame has {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }

        let mut frame = self.clone();
        match frame.columns.iter().position(|c| c == name) {
            Some(idx) => {
                for (row, value) in frame.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                frame.columns.push(name.to_string());
                for (row, value) in frame.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(frame)
    }

    /// Project onto a subset of columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Frame, TextClassError> {
        let indices = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Frame {
            columns: names.iter().map(|n| n.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        })
    }

    /// Copy of the rows at the given indices, in that order.
    pub fn take_rows(&self, indices: &[usize]) -> Frame {
        Frame {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }
}

/// Split `0..len` into contiguous ranges of at most `partition_rows`.
pub fn partition_ranges(len: usize, partition_rows: usize) -> Vec<Range<usize>> {
    let step = partition_rows.max(1);
    (0..len)
        .step_by(step)
        .map(|start| start..(start + step).min(len))
        .collect()
}

/// Seeded random train/test split.
///
/// The test side receives `round(len * test_fraction)` rows. Both halves keep
/// the shuffled order, which is fixed for a given seed.
pub fn split(
    frame: &Frame,
    test_fraction: f64,
    seed: u64,
) -> Result<(Frame, Frame), TextClassError> {
    if !(0.0..=1.0).contains(&test_fraction) {
        return Err(TextClassError::Config(format!(
            "test_fraction must be within [0, 1], got {}",
            test_fraction
        )));
    }

    let mut indices: Vec<usize> = (0..frame.len()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test_len = (frame.len() as f64 * test_fraction).round() as usize;
    let (test_idx, train_idx) = indices.split_at(test_len);

    Ok((frame.take_rows(train_idx), frame.take_rows(test_idx)))
}

/// Source of tabular rows.
pub trait DataSource {
    fn read(&self) -> Result<Frame, TextClassError>;
}

/// Destination for tabular rows.
pub trait DataSink {
    fn write(&self, frame: &Frame) -> Result<(), TextClassError>;
}
