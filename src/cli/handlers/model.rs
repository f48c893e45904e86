//! Artifact store handlers.

use std::path::Path;

use anyhow::Result;

use crate::artifact::{list_runs, log_model, LogModelRequest};
use crate::cli::output::{
    output_json, print_header, print_hint, print_kv, print_success, print_table, OutputMode,
};
use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_LENGTH};
use crate::inference::ScoringOptions;
use crate::init::AppContext;
use crate::labels::LabelTable;

pub fn handle_log_model(
    ctx: &AppContext,
    checkpoint: &Path,
    labels: &Path,
    artifact_path: &str,
    base_model: Option<String>,
    input_example: Option<String>,
    mode: OutputMode,
) -> Result<()> {
    let labels = LabelTable::load(labels)?;
    let request = LogModelRequest {
        checkpoint_dir: checkpoint.to_path_buf(),
        artifact_path: artifact_path.to_string(),
        labels,
        options: ScoringOptions {
            batch_size: ctx.config.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            max_length: ctx.config.max_length.unwrap_or(DEFAULT_MAX_LENGTH),
        },
        base_model,
        input_example,
    };

    let manifest = log_model(&request, &ctx.store_dir)?;

    match mode {
        OutputMode::Json => output_json(&manifest),
        OutputMode::Human => {
            print_success(&format!("Logged {}", manifest.model_uri()));
            print_kv("model type", &manifest.model_type);
            print_kv("labels", &manifest.labels.labels().join(", "));
            print_kv("batch size", &manifest.batch_size.to_string());
            print_kv("max length", &manifest.max_length.to_string());
            print_hint(&format!(
                "\nScore with: textclass classify --model {} \"some text\"",
                manifest.model_uri()
            ));
        }
    }
    Ok(())
}

pub fn handle_runs(ctx: &AppContext, mode: OutputMode) -> Result<()> {
    let manifests = list_runs(&ctx.store_dir)?;

    match mode {
        OutputMode::Json => output_json(&manifests),
        OutputMode::Human => {
            print_header(&format!("Runs in {}", ctx.store_dir.display()));
            let rows = manifests
                .iter()
                .map(|m| {
                    vec![
                        m.model_uri(),
                        m.model_type.clone(),
                        m.labels.labels().join(", "),
                        m.created_at.format("%Y-%m-%d %H:%M").to_string(),
                    ]
                })
                .collect();
            print_table(&["Model URI", "Type", "Labels", "Created"], rows);
        }
    }
    Ok(())
}
