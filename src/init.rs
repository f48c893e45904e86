//! Shared initialization logic for CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::config::{load_config, resolve_data_path, ScoringConfig};
use crate::inference::{LocalScoringService, PartitionOptions, ScoringService, ScoringUnit};

/// Application context holding resolved paths and configuration.
///
/// The scoring unit is loaded lazily because most commands never touch
/// model weights.
pub struct AppContext {
    pub data_path: PathBuf,
    pub store_dir: PathBuf,
    pub config: ScoringConfig,
}

/// Per-invocation overrides from global CLI flags.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub store_dir: Option<PathBuf>,
    pub model: Option<String>,
    pub batch_size: Option<usize>,
    pub max_length: Option<usize>,
    pub device: Option<crate::config::DevicePreference>,
    pub workers: Option<usize>,
}

impl AppContext {
    /// Initialize application context.
    ///
    /// Data path priority: explicit path > TEXTCLASS_DATA_PATH env > ./.textclass (if exists) > ~/.textclass
    pub fn new(explicit_path: Option<PathBuf>, overrides: ConfigOverrides) -> Result<Self> {
        let data_path = resolve_data_path(explicit_path);
        tracing::info!("Using data path: {}", data_path.display());

        let mut config = load_config(overrides.config_path.as_deref(), &data_path)?;
        if let Some(model) = overrides.model {
            config.model = Some(model);
        }
        if let Some(store_dir) = overrides.store_dir {
            config.store_dir = Some(store_dir);
        }
        if overrides.batch_size.is_some() {
            config.batch_size = overrides.batch_size;
        }
        if overrides.max_length.is_some() {
            config.max_length = overrides.max_length;
        }
        if let Some(device) = overrides.device {
            config.device = device;
        }
        if let Some(workers) = overrides.workers {
            config.workers = workers;
        }
        config.validate()?;

        let store_dir = config.store_dir_or(&data_path);

        Ok(Self {
            data_path,
            store_dir,
            config,
        })
    }

    /// Load the configured model into a scoring service.
    ///
    /// Weight loading is blocking I/O, so it runs on the blocking pool.
    pub async fn scoring_service(&self) -> Result<Arc<LocalScoringService>> {
        tracing::info!("Initializing scoring unit...");
        let config = self.config.clone();
        let store_dir = self.store_dir.clone();
        let unit = tokio::task::spawn_blocking(move || ScoringUnit::load(&config, store_dir))
            .await
            .map_err(|e| anyhow::anyhow!("Task join error: {}", e))??;

        let service = LocalScoringService::new(Arc::new(unit));
        if service.is_available() {
            tracing::info!(
                "Scoring unit loaded ({} labels)",
                service.unit().labels().len()
            );
        }
        Ok(Arc::new(service))
    }

    /// Partitioning for frame scoring from the config.
    pub fn partition_options(&self) -> PartitionOptions {
        PartitionOptions {
            text_column: self.config.text_column.clone(),
            output_column: self.config.prediction_column.clone(),
            partition_rows: self.config.partition_rows,
            workers: self.config.workers,
        }
    }
}
