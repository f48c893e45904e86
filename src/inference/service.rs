//! Async scoring service and partitioned frame scoring.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use tracing::debug;

use crate::data::{partition_ranges, Frame, Value};
use crate::inference::scoring::ScoringUnit;
use crate::labels::LabelTable;
use crate::TextClassError;

/// Service trait for text classification.
///
/// Abstracts the scoring backend so frame-level scoring can run against a
/// local model, a remote endpoint, or a test double.
#[async_trait]
pub trait ScoringService: Send + Sync {
    /// Predict one label per text, in input order.
    async fn classify(&self, texts: Vec<String>) -> Result<Vec<String>, TextClassError>;

    /// Label table of the underlying model.
    fn labels(&self) -> Option<&LabelTable>;

    /// Whether a model is loaded.
    fn is_available(&self) -> bool;
}

/// Scoring service backed by an in-process [`ScoringUnit`].
///
/// Uses spawn_blocking to offload CPU/GPU-bound inference.
pub struct LocalScoringService {
    unit: Arc<ScoringUnit>,
}

impl LocalScoringService {
    pub fn new(unit: Arc<ScoringUnit>) -> Self {
        Self { unit }
    }

    pub fn unit(&self) -> &Arc<ScoringUnit> {
        &self.unit
    }
}

#[async_trait]
impl ScoringService for LocalScoringService {
    async fn classify(&self, texts: Vec<String>) -> Result<Vec<String>, TextClassError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let unit = self.unit.clone();
        tokio::task::spawn_blocking(move || unit.classify(&texts))
            .await
            .map_err(|e| TextClassError::Inference {
                chunk: 0,
                offset: 0,
                len: 0,
                message: format!("Task join error: {}", e),
            })?
    }

    fn labels(&self) -> Option<&LabelTable> {
        Some(self.unit.labels())
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// No-op scoring service for testing.
///
/// Always reports as unavailable and returns errors for classify calls.
pub struct NoopScoringService;

impl Default for NoopScoringService {
    fn default() -> Self {
        Self::new()
    }
}

impl NoopScoringService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScoringService for NoopScoringService {
    async fn classify(&self, texts: Vec<String>) -> Result<Vec<String>, TextClassError> {
        Err(TextClassError::Inference {
            chunk: 0,
            offset: 0,
            len: texts.len(),
            message: "Scoring service is not available (noop)".to_string(),
        })
    }

    fn labels(&self) -> Option<&LabelTable> {
        None
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// How a frame is cut up for scoring.
#[derive(Debug, Clone)]
pub struct PartitionOptions {
    pub text_column: String,
    pub output_column: String,
    /// Rows per service call.
    pub partition_rows: usize,
    /// Partitions in flight at once.
    pub workers: usize,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        Self {
            text_column: "text".to_string(),
            output_column: "prediction".to_string(),
            partition_rows: 256,
            workers: 1,
        }
    }
}

/// Apply a scoring service to a text column, appending the predictions.
///
/// The whole column is validated before any partition is scored. Partitions
/// run up to `workers` at a time; results are reassembled in partition
/// order, so output row `i` always belongs to input row `i`.
pub async fn score_frame<F>(
    service: &dyn ScoringService,
    frame: &Frame,
    options: &PartitionOptions,
    on_partition: F,
) -> Result<Frame, TextClassError>
where
    F: Fn(usize) + Send + Sync,
{
    let texts = frame.text_column(&options.text_column)?;
    let ranges = partition_ranges(texts.len(), options.partition_rows);
    debug!(
        "Scoring {} rows in {} partitions ({} workers)",
        texts.len(),
        ranges.len(),
        options.workers
    );

    let on_partition = &on_partition;
    let partitions: Vec<Vec<String>> = futures::stream::iter(ranges.into_iter().enumerate())
        .map(|(index, range)| {
            let slice = texts[range.clone()].to_vec();
            async move {
                let labels = service.classify(slice).await.map_err(|e| match e {
                    TextClassError::Inference {
                        chunk,
                        offset,
                        len,
                        message,
                    } => TextClassError::Inference {
                        chunk,
                        offset: range.start + offset,
                        len,
                        message: format!("partition {}: {}", index, message),
                    },
                    other => other,
                })?;
                if labels.len() != range.len() {
                    return Err(TextClassError::Inference {
                        chunk: 0,
                        offset: range.start,
                        len: range.len(),
                        message: format!(
                            "partition {} returned {} labels for {} rows",
                            index,
                            labels.len(),
                            range.len()
                        ),
                    });
                }
                on_partition(range.len());
                Ok(labels)
            }
        })
        .buffered(options.workers.max(1))
        .try_collect()
        .await?;

    let predictions: Vec<Value> = partitions
        .into_iter()
        .flatten()
        .map(Value::Text)
        .collect();
    frame.with_column(&options.output_column, predictions)
}
