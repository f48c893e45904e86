//! textclass - label mapping and batch scoring for text classifiers
//!
//! Usage:
//!   textclass labels corpus.tsv --out labels.json     Build the label table
//!   textclass encode corpus.tsv --out encoded.tsv     Replace labels with ids
//!   textclass log-model ./checkpoint --labels labels.json
//!   textclass classify --model runs:/<id>/model "win a prize"
//!   textclass --help                                  Show all commands

use anyhow::Result;
use clap::Parser;

use textclass::cli::output::{print_hint, OutputMode};
use textclass::cli::{retry_hint, Cli};
use textclass::init::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Tracing to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("textclass=info".parse()?),
        )
        .init();

    let mode = OutputMode::from_json_flag(cli.json);
    let ctx = AppContext::new(cli.data_path.clone(), cli.overrides())?;

    let result = textclass::cli::execute(&cli.command, &ctx, mode).await;
    if let Err(ref e) = result {
        if let Some(hint) = retry_hint(e).filter(|_| mode == OutputMode::Human) {
            print_hint(hint);
        }
    }
    result
}
