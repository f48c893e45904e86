//! Scoring configuration and its loading rules.
//!
//! Everything the pipeline needs (model source, batch size, columns, device)
//! lives in one [`ScoringConfig`] that is passed explicitly to constructors.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::TextClassError;

/// Batch size used when neither config nor artifact specify one.
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// Token limit used when neither config nor artifact specify one.
pub const DEFAULT_MAX_LENGTH: usize = 512;

const CONFIG_FILE_NAME: &str = "textclass.toml";
const CONFIG_ENV_VAR: &str = "TEXTCLASS_CONFIG";
const DATA_PATH_ENV_VAR: &str = "TEXTCLASS_DATA_PATH";

/// Compute device preference, resolved once when a model is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Use an accelerator when one is usable, else CPU.
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

/// Configuration for model loading and batch scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Hugging Face repo id, local checkpoint directory, or `runs:/<run_id>/<path>`.
    pub model: Option<String>,
    /// Hub revision (branch, tag or commit) for repo ids.
    pub revision: Option<String>,
    /// Root of the local artifact store used by `runs:/` URIs.
    pub store_dir: Option<PathBuf>,
    /// Texts per inference call. Falls back to the artifact manifest, then 8.
    pub batch_size: Option<usize>,
    /// Token limit per text. Falls back to the artifact manifest, then 512.
    pub max_length: Option<usize>,
    pub device: DevicePreference,
    pub text_column: String,
    pub label_column: String,
    pub prediction_column: String,
    /// Rows per partition when scoring frames.
    pub partition_rows: usize,
    /// Partitions scored concurrently.
    pub workers: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            model: None,
            revision: None,
            store_dir: None,
            batch_size: None,
            max_length: None,
            device: DevicePreference::Auto,
            text_column: "text".to_string(),
            label_column: "label".to_string(),
            prediction_column: "prediction".to_string(),
            partition_rows: 256,
            workers: 1,
        }
    }
}

impl ScoringConfig {
    /// Check value ranges.
    pub fn validate(&self) -> Result<(), TextClassError> {
        if self.batch_size == Some(0) {
            return Err(TextClassError::Config("batch_size must be positive".to_string()));
        }
        if self.max_length == Some(0) {
            return Err(TextClassError::Config("max_length must be positive".to_string()));
        }
        if self.partition_rows == 0 {
            return Err(TextClassError::Config(
                "partition_rows must be positive".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(TextClassError::Config("workers must be positive".to_string()));
        }
        Ok(())
    }

    /// Model source, required for anything that loads weights.
    pub fn model_source(&self) -> Result<&str, TextClassError> {
        self.model.as_deref().ok_or_else(|| {
            TextClassError::Config(
                "No model configured; pass --model or set `model` in textclass.toml".to_string(),
            )
        })
    }

    /// Artifact store root, defaulting to `{data_path}/runs`.
    pub fn store_dir_or(&self, data_path: &Path) -> PathBuf {
        self.store_dir
            .clone()
            .unwrap_or_else(|| data_path.join("runs"))
    }
}

/// Resolve the data directory.
///
/// Priority: explicit path > `TEXTCLASS_DATA_PATH` > `./.textclass` (if it
/// exists) > `~/.textclass`.
pub fn resolve_data_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var(DATA_PATH_ENV_VAR).ok().map(PathBuf::from))
        .or_else(|| {
            let local_path = Path::new(".textclass");
            if local_path.is_dir() {
                Some(local_path.to_path_buf())
            } else {
                None
            }
        })
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".textclass"))
                .unwrap_or_else(|| PathBuf::from(".textclass"))
        })
}

/// Load scoring config with priority:
/// 1. `explicit` file (errors are fatal)
/// 2. `{data_path}/textclass.toml` (parse errors fall back with a warning)
/// 3. `TEXTCLASS_CONFIG` env var (JSON)
/// 4. Default
pub fn load_config(
    explicit: Option<&Path>,
    data_path: &Path,
) -> Result<ScoringConfig, TextClassError> {
    if let Some(path) = explicit {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TextClassError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: ScoringConfig = toml::from_str(&contents)?;
        info!("Loaded scoring config from {}", path.display());
        return Ok(config);
    }

    let config_path = data_path.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<ScoringConfig>(&contents) {
                Ok(config) => {
                    info!("Loaded scoring config from {}", config_path.display());
                    return Ok(config);
                }
                Err(e) => {
                    warn!(
                        "Failed to parse {}: {}. Using default.",
                        config_path.display(),
                        e
                    );
                }
            },
            Err(e) => {
                warn!(
                    "Failed to read {}: {}. Using default.",
                    config_path.display(),
                    e
                );
            }
        }
    }

    if let Ok(json) = std::env::var(CONFIG_ENV_VAR) {
        match serde_json::from_str::<ScoringConfig>(&json) {
            Ok(config) => {
                info!("Loaded scoring config from {} env", CONFIG_ENV_VAR);
                return Ok(config);
            }
            Err(e) => {
                warn!("Failed to parse {}: {}. Using default.", CONFIG_ENV_VAR, e);
            }
        }
    }

    Ok(ScoringConfig::default())
}
