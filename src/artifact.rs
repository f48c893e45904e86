//! Local model artifact store.
//!
//! A logged model lives at `<store>/<run_id>/<artifact_path>/` and holds the
//! checkpoint files (with the label table embedded in `config.json`) plus an
//! `artifact.json` manifest. It is addressed as `runs:/<run_id>/<artifact_path>`.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::inference::backend::{ModelFiles, CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_FILE};
use crate::inference::scoring::ScoringOptions;
use crate::labels::LabelTable;
use crate::TextClassError;

pub const MANIFEST_FILE: &str = "artifact.json";
pub const RUN_URI_SCHEME: &str = "runs:/";
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// Where to load a model from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Hugging Face Hub repository id.
    Hub(String),
    /// Local checkpoint directory.
    Local(PathBuf),
    /// Artifact in the local store.
    Run {
        run_id: String,
        artifact_path: String,
    },
}

impl ModelSource {
    /// Classify a model reference string.
    ///
    /// `runs:/<id>/<path>` is a stored artifact, an existing directory is a
    /// local checkpoint, anything else is treated as a hub repo id.
    pub fn parse(s: &str) -> Self {
        if let Some(rest) = s.strip_prefix(RUN_URI_SCHEME) {
            let rest = rest.trim_start_matches('/');
            let (run_id, artifact_path) = rest.split_once('/').unwrap_or((rest, ""));
            return ModelSource::Run {
                run_id: run_id.to_string(),
                artifact_path: artifact_path.trim_end_matches('/').to_string(),
            };
        }
        let path = Path::new(s);
        if path.is_dir() {
            ModelSource::Local(path.to_path_buf())
        } else {
            ModelSource::Hub(s.to_string())
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Hub(repo) => write!(f, "hub:{}", repo),
            ModelSource::Local(dir) => write!(f, "{}", dir.display()),
            ModelSource::Run {
                run_id,
                artifact_path,
            } => write!(f, "{}{}/{}", RUN_URI_SCHEME, run_id, artifact_path),
        }
    }
}

/// Metadata written next to a logged model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub format_version: u32,
    pub run_id: Uuid,
    pub artifact_path: String,
    pub created_at: DateTime<Utc>,
    pub base_model: Option<String>,
    pub model_type: String,
    pub labels: LabelTable,
    pub batch_size: usize,
    pub max_length: usize,
    pub input_example: Option<String>,
}

impl ArtifactManifest {
    /// `runs:/` URI addressing this artifact.
    pub fn model_uri(&self) -> String {
        format!("{}{}/{}", RUN_URI_SCHEME, self.run_id, self.artifact_path)
    }

    /// Read `artifact.json` from a directory, if present.
    pub fn load(dir: &Path) -> Result<Option<Self>, TextClassError> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        let manifest = serde_json::from_str(&contents).map_err(|e| {
            TextClassError::ModelLoad(format!("Invalid {}: {}", path.display(), e))
        })?;
        Ok(Some(manifest))
    }
}

/// Inputs for [`log_model`].
#[derive(Debug, Clone)]
pub struct LogModelRequest {
    /// Directory holding `config.json`, `tokenizer.json`, `model.safetensors`.
    pub checkpoint_dir: PathBuf,
    pub artifact_path: String,
    pub labels: LabelTable,
    pub options: ScoringOptions,
    pub base_model: Option<String>,
    pub input_example: Option<String>,
}

/// Copy a fine-tuned checkpoint into the store under a fresh run id.
///
/// The label table is embedded into the stored `config.json`, replacing any
/// `id2label`/`label2id` the trainer wrote.
pub fn log_model(
    request: &LogModelRequest,
    store_root: &Path,
) -> Result<ArtifactManifest, TextClassError> {
    if request.artifact_path.is_empty() || request.artifact_path.contains("..") {
        return Err(TextClassError::Config(format!(
            "Invalid artifact path '{}'",
            request.artifact_path
        )));
    }

    let files = ModelFiles::from_dir(&request.checkpoint_dir)?;
    let mut config = files.read_config()?;
    let model_type = config
        .get("model_type")
        .and_then(|v| v.as_str())
        .unwrap_or("bert")
        .to_string();

    request
        .labels
        .embed_in_model_config(&mut config)
        .map_err(|e| TextClassError::ModelLoad(e.to_string()))?;

    let run_id = Uuid::new_v4();
    let manifest = ArtifactManifest {
        format_version: MANIFEST_FORMAT_VERSION,
        run_id,
        artifact_path: request.artifact_path.clone(),
        created_at: Utc::now(),
        base_model: request.base_model.clone(),
        model_type,
        labels: request.labels.clone(),
        batch_size: request.options.batch_size,
        max_length: request.options.max_length,
        input_example: request.input_example.clone(),
    };

    let run_dir = store_root.join(run_id.to_string());
    let target = run_dir.join(&request.artifact_path);
    populate_run_dir(&run_dir, || {
        std::fs::create_dir_all(&target)?;
        std::fs::write(
            target.join(CONFIG_FILE),
            serde_json::to_string_pretty(&config)?,
        )?;
        std::fs::copy(&files.tokenizer_path, target.join(TOKENIZER_FILE))?;
        std::fs::copy(&files.weights_path, target.join(WEIGHTS_FILE))?;
        std::fs::write(
            target.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?,
        )?;
        Ok(())
    })?;

    info!(
        "Logged model {} ({} labels) to {}",
        manifest.model_uri(),
        manifest.labels.len(),
        target.display()
    );
    Ok(manifest)
}

/// Run `write` to fill a new run directory, removing the directory if it fails.
///
/// The manifest is written last, so a run dir that survives a crash without
/// one is skipped by [`list_runs`].
fn populate_run_dir(
    run_dir: &Path,
    write: impl FnOnce() -> Result<(), TextClassError>,
) -> Result<(), TextClassError> {
    if let Err(e) = write() {
        if run_dir.exists() {
            if let Err(cleanup) = std::fs::remove_dir_all(run_dir) {
                warn!(
                    "Failed to remove partial run {}: {}",
                    run_dir.display(),
                    cleanup
                );
            }
        }
        return Err(e);
    }
    Ok(())
}

/// Directory of a stored artifact.
pub fn resolve_run(
    store_root: &Path,
    run_id: &str,
    artifact_path: &str,
) -> Result<PathBuf, TextClassError> {
    if run_id.is_empty() || artifact_path.is_empty() {
        return Err(TextClassError::ModelLoad(format!(
            "Run URI must look like {}<run_id>/<artifact_path>",
            RUN_URI_SCHEME
        )));
    }
    let dir = store_root.join(run_id).join(artifact_path);
    if !dir.is_dir() {
        return Err(TextClassError::ModelLoad(format!(
            "No artifact at {}{}/{} (looked in {})",
            RUN_URI_SCHEME,
            run_id,
            artifact_path,
            dir.display()
        )));
    }
    Ok(dir)
}

/// Manifests of every artifact in the store, newest first.
pub fn list_runs(store_root: &Path) -> Result<Vec<ArtifactManifest>, TextClassError> {
    let mut manifests = Vec::new();
    if !store_root.is_dir() {
        return Ok(manifests);
    }
    for run in std::fs::read_dir(store_root)? {
        let run = run?;
        if !run.file_type()?.is_dir() {
            continue;
        }
        for artifact in std::fs::read_dir(run.path())? {
            let artifact = artifact?;
            if let Some(manifest) = ArtifactManifest::load(&artifact.path())? {
                manifests.push(manifest);
            }
        }
    }
    manifests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(manifests)
}
