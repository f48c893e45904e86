//! Candle-based sequence classification backend.
//!
//! Pure-Rust ML runtime using candle, with Metal on macOS and CUDA behind the
//! `cuda` feature. Provides [`BertSequenceClassifier`] for BERT checkpoints,
//! [`DistilBertSequenceClassifier`] for DistilBERT checkpoints and
//! [`RobertaSequenceClassifier`] for RoBERTa / XLM-RoBERTa checkpoints, all
//! exposed through the [`SequenceModel`] trait.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{LayerNorm, Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use candle_transformers::models::xlm_roberta::{
    Config as XLMRobertaConfig, XLMRobertaForSequenceClassification,
};
use serde::Deserialize;

use crate::config::DevicePreference;
use crate::TextClassError;

pub const CONFIG_FILE: &str = "config.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Model-type strings accepted in `config.json`.
pub const SUPPORTED_MODEL_TYPES: &[&str] = &["bert", "distilbert", "roberta", "xlm-roberta"];

/// A sequence classifier that maps token ids to per-class logits.
///
/// Implementations own their weights and device. The scoring layer only
/// sees this trait, so tests can substitute deterministic models.
pub trait SequenceModel: Send + Sync {
    /// Run a forward pass.
    ///
    /// All inputs are `[batch, seq_len]` u32 tensors on [`Self::device`].
    /// Returns `[batch, num_labels]` logits.
    fn forward(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        token_type_ids: &Tensor,
    ) -> candle_core::Result<Tensor>;

    fn num_labels(&self) -> usize;

    /// Rows in the token embedding table.
    fn vocab_size(&self) -> usize;

    /// Longest token sequence the position embeddings can hold.
    fn max_input_tokens(&self) -> usize;

    fn device(&self) -> &Device;
}

/// Paths to the three files that make up a checkpoint.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub weights_path: PathBuf,
}

impl ModelFiles {
    /// Locate checkpoint files inside a local directory.
    pub fn from_dir(dir: &Path) -> Result<Self, TextClassError> {
        let files = Self {
            config_path: dir.join(CONFIG_FILE),
            tokenizer_path: dir.join(TOKENIZER_FILE),
            weights_path: dir.join(WEIGHTS_FILE),
        };
        for path in [&files.config_path, &files.tokenizer_path, &files.weights_path] {
            if !path.is_file() {
                return Err(TextClassError::ModelLoad(format!(
                    "Missing checkpoint file {}",
                    path.display()
                )));
            }
        }
        Ok(files)
    }

    /// Read and parse `config.json`.
    pub fn read_config(&self) -> Result<serde_json::Value, TextClassError> {
        let contents = std::fs::read_to_string(&self.config_path).map_err(|e| {
            TextClassError::ModelLoad(format!(
                "Failed to read {}: {}",
                self.config_path.display(),
                e
            ))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            TextClassError::ModelLoad(format!(
                "Failed to parse {}: {}",
                self.config_path.display(),
                e
            ))
        })
    }
}

/// Download model files from HuggingFace Hub.
///
/// Uses `hf_hub::api::sync::Api` which caches at `~/.cache/huggingface/hub/`.
/// Designed to be called from `spawn_blocking` since it performs synchronous I/O.
pub fn download_model(repo_id: &str, revision: Option<&str>) -> Result<ModelFiles> {
    let api = hf_hub::api::sync::Api::new().context("Failed to initialize HuggingFace Hub API")?;
    let repo = match revision {
        Some(rev) => api.repo(hf_hub::Repo::with_revision(
            repo_id.to_string(),
            hf_hub::RepoType::Model,
            rev.to_string(),
        )),
        None => api.model(repo_id.to_string()),
    };

    let config_path = repo
        .get(CONFIG_FILE)
        .context("Failed to download config.json")?;
    let tokenizer_path = repo
        .get(TOKENIZER_FILE)
        .context("Failed to download tokenizer.json")?;
    let weights_path = repo
        .get(WEIGHTS_FILE)
        .context("Failed to download model.safetensors")?;

    Ok(ModelFiles {
        config_path,
        tokenizer_path,
        weights_path,
    })
}

/// Resolve a device preference to a concrete device.
///
/// `Auto` tries Metal (macOS) or CUDA (with the `cuda` feature), probing
/// layer-norm support since BERT/RoBERTa require it, and falls back to CPU.
/// An explicit accelerator that is unavailable is an error.
pub fn select_device(preference: DevicePreference) -> Result<Device, TextClassError> {
    match preference {
        DevicePreference::Cpu => {
            tracing::info!("Using CPU for inference");
            Ok(Device::Cpu)
        }
        DevicePreference::Cuda => {
            let device = Device::new_cuda(0)
                .map_err(|e| TextClassError::ModelLoad(format!("CUDA unavailable: {}", e)))?;
            tracing::info!("Using CUDA GPU for inference");
            Ok(device)
        }
        DevicePreference::Metal => {
            let device = Device::new_metal(0)
                .map_err(|e| TextClassError::ModelLoad(format!("Metal unavailable: {}", e)))?;
            tracing::info!("Using Metal GPU for inference");
            Ok(device)
        }
        DevicePreference::Auto => Ok(auto_device()),
    }
}

fn auto_device() -> Device {
    #[cfg(target_os = "macos")]
    {
        if let Ok(device) = Device::new_metal(0) {
            if supports_layer_norm(&device) {
                tracing::info!("Using Metal GPU for inference");
                return device;
            }
            tracing::warn!("Metal GPU available but layer-norm not supported, falling back to CPU");
        }
    }
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            if supports_layer_norm(&device) {
                tracing::info!("Using CUDA GPU for inference");
                return device;
            }
            tracing::warn!("CUDA GPU available but layer-norm not supported, falling back to CPU");
        }
    }
    tracing::info!("Using CPU for inference");
    Device::Cpu
}

/// Whether a device can run layer-norm (required by every supported encoder).
#[allow(dead_code)]
fn supports_layer_norm(device: &Device) -> bool {
    (|| -> candle_core::Result<()> {
        let weight = Tensor::ones(4, DType::F32, device)?;
        let bias = Tensor::zeros(4, DType::F32, device)?;
        let ln = LayerNorm::new(weight, bias, 1e-5);
        let input = Tensor::randn(0f32, 1.0, (1, 4), device)?;
        let _ = ln.forward(&input)?;
        Ok(())
    })()
    .is_ok()
}

/// Architecture facts read from `config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelShape {
    pub model_type: Option<String>,
    pub vocab_size: usize,
    pub max_position_embeddings: usize,
}

/// Number of labels declared by `id2label`.
fn declared_num_labels(config: &serde_json::Value) -> Result<usize> {
    let id2label = config
        .get("id2label")
        .and_then(|v| v.as_object())
        .context("config.json missing id2label mapping")?;
    if id2label.is_empty() {
        anyhow::bail!("id2label is empty, cannot determine label count");
    }
    Ok(id2label.len())
}

fn load_weights<'a>(files: &ModelFiles, device: &Device) -> Result<VarBuilder<'a>> {
    // SAFETY: the mmap stays valid as long as the file is not modified
    // while the model is in use.
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[&files.weights_path], DType::F32, device)
            .context("Failed to load model weights")?
    };
    Ok(vb)
}

/// BERT encoder with the standard pooler + linear classification head.
///
/// Expects `bert.*` encoder weights, `bert.pooler.dense` and `classifier`,
/// the layout written by `BertForSequenceClassification`.
pub struct BertSequenceClassifier {
    model: BertModel,
    pooler: Linear,
    classifier: Linear,
    device: Device,
    num_labels: usize,
    shape: ModelShape,
}

impl BertSequenceClassifier {
    pub fn new(files: &ModelFiles, device: Device) -> Result<Self> {
        let config_str =
            std::fs::read_to_string(&files.config_path).context("Failed to read model config")?;
        let config: BertConfig =
            serde_json::from_str(&config_str).context("Failed to parse BERT config")?;
        let config_json: serde_json::Value =
            serde_json::from_str(&config_str).context("Failed to parse config as JSON")?;
        let shape: ModelShape = serde_json::from_value(config_json.clone())
            .context("config.json missing vocab_size or max_position_embeddings")?;
        let num_labels = declared_num_labels(&config_json)?;

        let vb = load_weights(files, &device)?;

        let pooler = candle_nn::linear(
            config.hidden_size,
            config.hidden_size,
            vb.pp("bert").pp("pooler").pp("dense"),
        )
        .context("Failed to load bert.pooler.dense")?;
        let classifier = candle_nn::linear(config.hidden_size, num_labels, vb.pp("classifier"))
            .context("Failed to load classifier head")?;
        let model = BertModel::load(vb.pp("bert"), &config)
            .context("Failed to construct BERT model")?;

        Ok(Self {
            model,
            pooler,
            classifier,
            device,
            num_labels,
            shape,
        })
    }
}

impl SequenceModel for BertSequenceClassifier {
    fn forward(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        token_type_ids: &Tensor,
    ) -> candle_core::Result<Tensor> {
        // [batch, seq_len, hidden] -> [CLS] hidden state -> pooled -> logits
        let hidden = self
            .model
            .forward(input_ids, token_type_ids, Some(attention_mask))?;
        let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        self.classifier.forward(&pooled)
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn vocab_size(&self) -> usize {
        self.shape.vocab_size
    }

    fn max_input_tokens(&self) -> usize {
        self.shape.max_position_embeddings
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// DistilBERT encoder with the `pre_classifier` + ReLU + `classifier` head.
///
/// Expects `distilbert.*` encoder weights plus `pre_classifier` and
/// `classifier`, the layout written by `DistilBertForSequenceClassification`.
pub struct DistilBertSequenceClassifier {
    model: DistilBertModel,
    pre_classifier: Linear,
    classifier: Linear,
    device: Device,
    num_labels: usize,
    shape: ModelShape,
}

impl DistilBertSequenceClassifier {
    pub fn new(files: &ModelFiles, device: Device) -> Result<Self> {
        let config_str =
            std::fs::read_to_string(&files.config_path).context("Failed to read model config")?;
        let config: DistilBertConfig =
            serde_json::from_str(&config_str).context("Failed to parse DistilBERT config")?;
        let config_json: serde_json::Value =
            serde_json::from_str(&config_str).context("Failed to parse config as JSON")?;
        let shape: ModelShape = serde_json::from_value(config_json.clone())
            .context("config.json missing vocab_size or max_position_embeddings")?;
        let num_labels = declared_num_labels(&config_json)?;

        let vb = load_weights(files, &device)?;

        let pre_classifier = candle_nn::linear(config.dim, config.dim, vb.pp("pre_classifier"))
            .context("Failed to load pre_classifier")?;
        let classifier = candle_nn::linear(config.dim, num_labels, vb.pp("classifier"))
            .context("Failed to load classifier head")?;
        let model = DistilBertModel::load(vb.pp("distilbert"), &config)
            .context("Failed to construct DistilBERT model")?;

        Ok(Self {
            model,
            pre_classifier,
            classifier,
            device,
            num_labels,
            shape,
        })
    }
}

/// Convert a tokenizer mask (1 = attend) into candle's DistilBERT mask
/// (nonzero = masked out), shaped to broadcast over `[batch, heads, q, k]`.
fn distilbert_padding_mask(attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let (batch, seq_len) = attention_mask.dims2()?;
    attention_mask.eq(0u32)?.reshape((batch, 1, 1, seq_len))
}

impl SequenceModel for DistilBertSequenceClassifier {
    fn forward(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        _token_type_ids: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let mask = distilbert_padding_mask(attention_mask)?;
        let hidden = self.model.forward(input_ids, &mask)?;
        let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
        let pre = self.pre_classifier.forward(&cls)?.relu()?;
        self.classifier.forward(&pre)
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn vocab_size(&self) -> usize {
        self.shape.vocab_size
    }

    fn max_input_tokens(&self) -> usize {
        self.shape.max_position_embeddings
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// RoBERTa-family classifier using candle's XLM-RoBERTa implementation.
pub struct RobertaSequenceClassifier {
    model: XLMRobertaForSequenceClassification,
    device: Device,
    num_labels: usize,
    shape: ModelShape,
}

impl RobertaSequenceClassifier {
    pub fn new(files: &ModelFiles, device: Device) -> Result<Self> {
        let config_str = std::fs::read_to_string(&files.config_path)
            .context("Failed to read classifier config")?;
        let config: XLMRobertaConfig =
            serde_json::from_str(&config_str).context("Failed to parse XLM-RoBERTa config")?;
        let config_json: serde_json::Value =
            serde_json::from_str(&config_str).context("Failed to parse config as JSON")?;
        let shape: ModelShape = serde_json::from_value(config_json.clone())
            .context("config.json missing vocab_size or max_position_embeddings")?;
        let num_labels = declared_num_labels(&config_json)?;

        let vb = load_weights(files, &device)?;
        let model = XLMRobertaForSequenceClassification::new(num_labels, &config, vb)
            .context("Failed to construct classifier model")?;

        Ok(Self {
            model,
            device,
            num_labels,
            shape,
        })
    }
}

impl SequenceModel for RobertaSequenceClassifier {
    fn forward(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        _token_type_ids: &Tensor,
    ) -> candle_core::Result<Tensor> {
        // RoBERTa ignores segment ids
        let token_type_ids = input_ids.zeros_like()?;
        self.model
            .forward(input_ids, attention_mask, &token_type_ids)
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }

    fn vocab_size(&self) -> usize {
        self.shape.vocab_size
    }

    fn max_input_tokens(&self) -> usize {
        // Positions start after padding_idx + 1
        self.shape.max_position_embeddings.saturating_sub(2)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// Load the classifier matching `model_type` in `config.json`.
pub fn load_sequence_model(
    files: &ModelFiles,
    device: Device,
) -> Result<Box<dyn SequenceModel>, TextClassError> {
    let config = files.read_config()?;
    let model_type = config
        .get("model_type")
        .and_then(|v| v.as_str())
        .unwrap_or("bert")
        .to_string();

    let loaded: Result<Box<dyn SequenceModel>> = match model_type.as_str() {
        "bert" => BertSequenceClassifier::new(files, device)
            .map(|m| Box::new(m) as Box<dyn SequenceModel>),
        "distilbert" => DistilBertSequenceClassifier::new(files, device)
            .map(|m| Box::new(m) as Box<dyn SequenceModel>),
        "roberta" | "xlm-roberta" => RobertaSequenceClassifier::new(files, device)
            .map(|m| Box::new(m) as Box<dyn SequenceModel>),
        other => {
            return Err(TextClassError::ModelLoad(format!(
                "Unsupported model_type '{}'. Supported: {}",
                other,
                SUPPORTED_MODEL_TYPES.join(", ")
            )))
        }
    };

    loaded.map_err(|e| TextClassError::ModelLoad(format!("{:#}", e)))
}
