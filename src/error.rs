use thiserror::Error;

/// Custom error type for textclass operations.
#[derive(Debug, Error)]
pub enum TextClassError {
    /// Label string is not part of the label table.
    #[error("Unknown label: '{label}'")]
    UnknownLabel { label: String },

    /// Class ID falls outside `0..num_labels`.
    #[error("Unknown class id {id} (table has {num_labels} labels)")]
    UnknownId { id: usize, num_labels: usize },

    /// Label appeared twice in the enumeration passed to `LabelTable::build`.
    #[error("Duplicate label: '{label}'")]
    DuplicateLabel { label: String },

    /// Serialized `id2label` / `label2id` tables are not a bijection.
    #[error("Invalid label table: {0}")]
    InvalidLabelTable(String),

    /// Model, tokenizer or label artifacts cannot be loaded or do not fit together.
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Model invocation failed for one chunk of a scoring call.
    #[error("Inference failed for chunk {chunk} ({len} rows from row {offset}): {message}")]
    Inference {
        chunk: usize,
        offset: usize,
        len: usize,
        message: String,
    },

    /// Caller supplied input the scoring unit cannot accept.
    #[error("Invalid input at row {index}: {reason}")]
    InvalidInput { index: usize, reason: String },

    /// Configuration values are out of range or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dataset read or write failed.
    #[error("Data error: {0}")]
    Data(String),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TextClassError {
    /// Whether retrying the same call may succeed.
    ///
    /// Only per-chunk inference failures are potentially transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TextClassError::Inference { .. })
    }
}

impl From<std::io::Error> for TextClassError {
    fn from(err: std::io::Error) -> Self {
        TextClassError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TextClassError {
    fn from(err: serde_json::Error) -> Self {
        TextClassError::Data(format!("JSON serialization error: {}", err))
    }
}

impl From<csv::Error> for TextClassError {
    fn from(err: csv::Error) -> Self {
        TextClassError::Data(format!("TSV error: {}", err))
    }
}

impl From<toml::de::Error> for TextClassError {
    fn from(err: toml::de::Error) -> Self {
        TextClassError::Config(format!("TOML parse error: {}", err))
    }
}
