//! Batch scoring: model + tokenizer + label table as one callable unit.

use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use candle_core::{Device, Tensor};
use serde::Serialize;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::artifact::{ArtifactManifest, ModelSource};
use crate::config::{ScoringConfig, DEFAULT_BATCH_SIZE, DEFAULT_MAX_LENGTH};
use crate::data::Value;
use crate::inference::backend::{
    download_model, load_sequence_model, select_device, ModelFiles, SequenceModel,
};
use crate::labels::LabelTable;
use crate::TextClassError;

/// Fixed per-unit scoring parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringOptions {
    /// Texts per model invocation.
    pub batch_size: usize,
    /// Token limit per text; longer inputs are truncated.
    pub max_length: usize,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

/// Highest-probability class for one input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
}

/// Result of scoring one chunk in [`ScoringUnit::classify_chunks`].
#[derive(Debug)]
pub struct ChunkOutcome {
    /// Zero-based chunk number.
    pub index: usize,
    /// Input positions covered by this chunk.
    pub range: Range<usize>,
    pub result: Result<Vec<String>, TextClassError>,
}

/// Deployable scoring bundle.
///
/// Stateless across calls: every method takes `&self`, and the batch size and
/// truncation limit are fixed at construction.
pub struct ScoringUnit {
    model: Arc<dyn SequenceModel>,
    tokenizer: Tokenizer,
    labels: LabelTable,
    batch_size: usize,
    max_length: usize,
}

impl std::fmt::Debug for ScoringUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringUnit")
            .field("labels", &self.labels.labels())
            .field("batch_size", &self.batch_size)
            .field("max_length", &self.max_length)
            .finish_non_exhaustive()
    }
}

impl ScoringUnit {
    /// Assemble a unit from already-loaded parts.
    ///
    /// Checks that the parts fit together and configures the tokenizer for
    /// truncation at `min(options.max_length, model.max_input_tokens())` and
    /// batch-longest padding.
    pub fn initialize(
        model: Arc<dyn SequenceModel>,
        mut tokenizer: Tokenizer,
        labels: LabelTable,
        options: ScoringOptions,
    ) -> Result<Self, TextClassError> {
        if options.batch_size == 0 {
            return Err(TextClassError::Config("batch_size must be positive".to_string()));
        }
        if options.max_length == 0 {
            return Err(TextClassError::Config("max_length must be positive".to_string()));
        }
        if labels.len() != model.num_labels() {
            return Err(TextClassError::ModelLoad(format!(
                "Label table has {} labels but model head has {} outputs",
                labels.len(),
                model.num_labels()
            )));
        }

        let tokenizer_vocab = tokenizer.get_vocab_size(true);
        if tokenizer_vocab > model.vocab_size() {
            return Err(TextClassError::ModelLoad(format!(
                "Tokenizer vocabulary ({}) exceeds model embedding table ({})",
                tokenizer_vocab,
                model.vocab_size()
            )));
        }

        let max_length = options.max_length.min(model.max_input_tokens());
        if max_length == 0 {
            return Err(TextClassError::ModelLoad(
                "Model reports no usable input positions".to_string(),
            ));
        }

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| {
                TextClassError::ModelLoad(format!("Failed to configure truncation: {}", e))
            })?;

        let padding = match tokenizer.get_padding() {
            Some(existing) => PaddingParams {
                strategy: PaddingStrategy::BatchLongest,
                ..existing.clone()
            },
            None => PaddingParams {
                strategy: PaddingStrategy::BatchLongest,
                ..Default::default()
            },
        };
        tokenizer.with_padding(Some(padding));

        Ok(Self {
            model,
            tokenizer,
            labels,
            batch_size: options.batch_size,
            max_length,
        })
    }

    /// Load a unit from configuration.
    ///
    /// Resolves the model source, picks the device once, loads weights and
    /// tokenizer, and reads the label table from the model's `config.json`.
    /// Batch size and max length fall back to the artifact manifest when the
    /// config leaves them unset.
    pub fn load(config: &ScoringConfig, store_dir: PathBuf) -> Result<Self, TextClassError> {
        config.validate()?;
        let source = ModelSource::parse(config.model_source()?);

        let files = match &source {
            ModelSource::Hub(repo_id) => {
                info!("Fetching {} from HuggingFace Hub", repo_id);
                download_model(repo_id, config.revision.as_deref())
                    .map_err(|e| TextClassError::ModelLoad(format!("{:#}", e)))?
            }
            ModelSource::Local(dir) => ModelFiles::from_dir(dir)?,
            ModelSource::Run {
                run_id,
                artifact_path,
            } => {
                let dir = crate::artifact::resolve_run(&store_dir, run_id, artifact_path)?;
                ModelFiles::from_dir(&dir)?
            }
        };

        let manifest = match files.config_path.parent() {
            Some(dir) => ArtifactManifest::load(dir)?,
            None => None,
        };

        let labels = LabelTable::from_model_config(&files.read_config()?)
            .map_err(|e| TextClassError::ModelLoad(e.to_string()))?;

        let tokenizer = Tokenizer::from_file(&files.tokenizer_path).map_err(|e| {
            TextClassError::ModelLoad(format!("Failed to load tokenizer: {}", e))
        })?;

        let device = select_device(config.device)?;
        let model: Arc<dyn SequenceModel> = Arc::from(load_sequence_model(&files, device)?);

        let options = ScoringOptions {
            batch_size: config
                .batch_size
                .or(manifest.as_ref().map(|m| m.batch_size))
                .unwrap_or(DEFAULT_BATCH_SIZE),
            max_length: config
                .max_length
                .or(manifest.as_ref().map(|m| m.max_length))
                .unwrap_or(DEFAULT_MAX_LENGTH),
        };

        let unit = Self::initialize(model, tokenizer, labels, options)?;
        info!(
            "Scoring unit ready ({}, {} labels, batch size {}, max length {})",
            source,
            unit.labels.len(),
            unit.batch_size,
            unit.max_length
        );
        Ok(unit)
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Effective truncation limit in tokens.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn device(&self) -> &Device {
        self.model.device()
    }

    /// Predict one label per text, preserving input order and length.
    pub fn classify<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<String>, TextClassError> {
        Ok(self
            .score(texts)?
            .into_iter()
            .map(|p| p.label)
            .collect())
    }

    /// Like [`Self::classify`], also returning the winning probability.
    ///
    /// Stops at the first failing chunk.
    pub fn score<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Prediction>, TextClassError> {
        let mut predictions = Vec::with_capacity(texts.len());
        for (index, chunk) in texts.chunks(self.batch_size).enumerate() {
            let offset = index * self.batch_size;
            predictions.extend(self.score_chunk(index, offset, chunk)?);
        }
        Ok(predictions)
    }

    /// Score every chunk independently, reporting each chunk's outcome.
    ///
    /// A failing chunk does not stop later chunks, and each outcome carries
    /// the input range it covers so the caller can retry just that slice.
    pub fn classify_chunks<S: AsRef<str>>(&self, texts: &[S]) -> Vec<ChunkOutcome> {
        texts
            .chunks(self.batch_size)
            .enumerate()
            .map(|(index, chunk)| {
                let offset = index * self.batch_size;
                ChunkOutcome {
                    index,
                    range: offset..offset + chunk.len(),
                    result: self
                        .score_chunk(index, offset, chunk)
                        .map(|preds| preds.into_iter().map(|p| p.label).collect()),
                }
            })
            .collect()
    }

    /// Classify a column of cells, rejecting non-text cells before any
    /// model call.
    pub fn classify_values(&self, values: &[Value]) -> Result<Vec<String>, TextClassError> {
        let texts = values
            .iter()
            .enumerate()
            .map(|(index, v)| {
                v.as_text().ok_or_else(|| TextClassError::InvalidInput {
                    index,
                    reason: format!("expected text, found {}", v.kind()),
                })
            })
            .collect::<Result<Vec<&str>, _>>()?;
        self.classify(&texts)
    }

    fn score_chunk<S: AsRef<str>>(
        &self,
        index: usize,
        offset: usize,
        chunk: &[S],
    ) -> Result<Vec<Prediction>, TextClassError> {
        let fail = |message: String| TextClassError::Inference {
            chunk: index,
            offset,
            len: chunk.len(),
            message,
        };

        let str_refs: Vec<&str> = chunk.iter().map(|s| s.as_ref()).collect();
        let encodings = self
            .tokenizer
            .encode_batch(str_refs, true)
            .map_err(|e| fail(format!("Tokenization failed: {}", e)))?;

        let truncated = encodings
            .iter()
            .filter(|e| !e.get_overflowing().is_empty())
            .count();
        if truncated > 0 {
            debug!(
                "Chunk {}: truncated {} of {} inputs to {} tokens",
                index,
                truncated,
                chunk.len(),
                self.max_length
            );
        }

        let probs = self
            .forward_probs(&encodings)
            .map_err(|e| fail(e.to_string()))?;
        if probs.len() != chunk.len() {
            return Err(fail(format!(
                "Model returned {} rows for {} inputs",
                probs.len(),
                chunk.len()
            )));
        }

        probs
            .into_iter()
            .map(|row| {
                let (id, score) = argmax(&row)
                    .ok_or_else(|| fail("Model returned an empty probability row".to_string()))?;
                let label = self.labels.label(id).ok_or(TextClassError::UnknownId {
                    id,
                    num_labels: self.labels.len(),
                })?;
                Ok(Prediction {
                    label: label.to_string(),
                    score,
                })
            })
            .collect()
    }

    fn forward_probs(
        &self,
        encodings: &[tokenizers::Encoding],
    ) -> candle_core::Result<Vec<Vec<f32>>> {
        let batch_size = encodings.len();
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let input_ids: Vec<u32> = encodings
            .iter()
            .flat_map(|e| e.get_ids().to_vec())
            .collect();
        let attention_mask: Vec<u32> = encodings
            .iter()
            .flat_map(|e| e.get_attention_mask().to_vec())
            .collect();
        let token_type_ids: Vec<u32> = encodings
            .iter()
            .flat_map(|e| e.get_type_ids().to_vec())
            .collect();

        let device = self.model.device();
        let input_ids = Tensor::from_vec(input_ids, (batch_size, max_len), device)?;
        let attention_mask = Tensor::from_vec(attention_mask, (batch_size, max_len), device)?;
        let token_type_ids = Tensor::from_vec(token_type_ids, (batch_size, max_len), device)?;

        // Forward pass -> [batch, num_labels] logits
        let logits = self
            .model
            .forward(&input_ids, &attention_mask, &token_type_ids)?;

        // Single-label classification: softmax over classes
        let probs = candle_nn::ops::softmax(&logits, 1)?;
        probs.to_vec2::<f32>()
    }
}

/// Index and value of the largest entry. Ties keep the lowest index;
/// NaN never replaces the current best.
fn argmax(row: &[f32]) -> Option<(usize, f32)> {
    row.iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if !(v > b) => best,
            _ => Some((i, v)),
        })
}
