//! CLI interface for textclass.

pub mod handlers;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use output::OutputMode;

use crate::config::DevicePreference;
use crate::data::{DataSource, Frame, TsvSource};
use crate::init::{AppContext, ConfigOverrides};
use crate::TextClassError;

/// textclass - label mapping and batch scoring for text classifiers
#[derive(Parser)]
#[command(name = "textclass", version, about, long_about = None)]
pub struct Cli {
    /// Override data directory (default: ~/.textclass)
    #[arg(long, env = "TEXTCLASS_DATA_PATH", global = true)]
    pub data_path: Option<PathBuf>,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    pub json: bool,

    /// Scoring config file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Artifact store root (default: <data-path>/runs)
    #[arg(long, env = "TEXTCLASS_STORE", global = true)]
    pub store: Option<PathBuf>,

    /// Model: hub repo id, checkpoint directory, or runs:/<run_id>/<path>
    #[arg(long, env = "TEXTCLASS_MODEL", global = true)]
    pub model: Option<String>,

    /// Texts per inference call
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,

    /// Token limit per text (longer inputs are truncated)
    #[arg(long, global = true)]
    pub max_length: Option<usize>,

    /// Compute device
    #[arg(long, value_enum, global = true)]
    pub device: Option<DevicePreference>,

    /// Partitions scored concurrently
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Config overrides taken from global flags.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config.clone(),
            store_dir: self.store.clone(),
            model: self.model.clone(),
            batch_size: self.batch_size,
            max_length: self.max_length,
            device: self.device,
            workers: self.workers,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the label table of a corpus
    Labels {
        /// Corpus TSV (label, text)
        corpus: PathBuf,
        /// Corpus has a header line
        #[arg(long)]
        header: bool,
        /// Assign ids in lexicographic order instead of first appearance
        #[arg(long)]
        sorted: bool,
        /// Write the table to a labels.json file
        #[arg(long)]
        out: Option<PathBuf>,
        /// Embed the table into an existing model config.json
        #[arg(long)]
        model_config: Option<PathBuf>,
    },

    /// Replace corpus labels with their integer ids
    Encode {
        /// Corpus TSV (label, text)
        corpus: PathBuf,
        /// Corpus has a header line
        #[arg(long)]
        header: bool,
        /// Existing labels.json (default: derive from the corpus)
        #[arg(long)]
        labels: Option<PathBuf>,
        /// Assign ids in lexicographic order when deriving
        #[arg(long)]
        sorted: bool,
        /// Output TSV
        #[arg(long)]
        out: PathBuf,
    },

    /// Shuffle a corpus into train and test files
    Split {
        /// Corpus TSV
        corpus: PathBuf,
        /// Corpus has a header line
        #[arg(long)]
        header: bool,
        /// Train output TSV
        #[arg(long)]
        train: PathBuf,
        /// Test output TSV
        #[arg(long)]
        test: PathBuf,
        /// Fraction of rows for the test split
        #[arg(long, default_value = "0.2")]
        test_fraction: f64,
        /// Shuffle seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Store a fine-tuned checkpoint as a model artifact
    LogModel {
        /// Directory with config.json, tokenizer.json, model.safetensors
        checkpoint: PathBuf,
        /// labels.json produced by `textclass labels`
        #[arg(long)]
        labels: PathBuf,
        /// Artifact path inside the run
        #[arg(long, default_value = "sms_spam_model")]
        artifact_path: String,
        /// Base model the checkpoint was fine-tuned from
        #[arg(long)]
        base_model: Option<String>,
        /// Example input stored with the artifact
        #[arg(long)]
        input_example: Option<String>,
    },

    /// List logged model artifacts
    Runs,

    /// Predict labels for texts or a corpus file
    Classify {
        /// Texts to classify
        texts: Vec<String>,
        /// Corpus TSV to score instead of positional texts
        #[arg(long, conflicts_with = "texts")]
        input: Option<PathBuf>,
        /// Input has a header line
        #[arg(long)]
        header: bool,
        /// Write scored rows here (.jsonl for JSON lines, otherwise TSV)
        #[arg(long, requires = "input")]
        output: Option<PathBuf>,
        /// Show winning class probability
        #[arg(long)]
        scores: bool,
    },

    /// Score a labeled corpus and report accuracy
    Evaluate {
        /// Labeled corpus TSV (label, text)
        input: PathBuf,
        /// Input has a header line
        #[arg(long)]
        header: bool,
    },
}

/// Read a corpus TSV using the configured column names.
pub(crate) fn read_corpus(
    ctx: &AppContext,
    path: &Path,
    header: bool,
) -> anyhow::Result<Frame> {
    let source = if header {
        TsvSource::with_header(path)
    } else {
        TsvSource::headerless(
            path,
            [
                ctx.config.label_column.clone(),
                ctx.config.text_column.clone(),
            ],
        )
    };
    Ok(source.read()?)
}

/// Follow-up advice for a failed command whose cause may be transient.
pub fn retry_hint(err: &anyhow::Error) -> Option<&'static str> {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<TextClassError>())
        .any(TextClassError::is_retryable)
        .then_some("Inference failed for one chunk; re-run the command, or lower --batch-size if the device ran out of memory.")
}

/// Execute a CLI command.
pub async fn execute(command: &Commands, ctx: &AppContext, mode: OutputMode) -> anyhow::Result<()> {
    match command {
        Commands::Labels {
            corpus,
            header,
            sorted,
            out,
            model_config,
        } => handlers::corpus::handle_labels(
            ctx,
            corpus,
            *header,
            *sorted,
            out.as_deref(),
            model_config.as_deref(),
            mode,
        ),
        Commands::Encode {
            corpus,
            header,
            labels,
            sorted,
            out,
        } => handlers::corpus::handle_encode(
            ctx,
            corpus,
            *header,
            labels.as_deref(),
            *sorted,
            out,
            mode,
        ),
        Commands::Split {
            corpus,
            header,
            train,
            test,
            test_fraction,
            seed,
        } => handlers::corpus::handle_split(
            ctx,
            corpus,
            *header,
            train,
            test,
            *test_fraction,
            *seed,
            mode,
        ),
        Commands::LogModel {
            checkpoint,
            labels,
            artifact_path,
            base_model,
            input_example,
        } => handlers::model::handle_log_model(
            ctx,
            checkpoint,
            labels,
            artifact_path,
            base_model.clone(),
            input_example.clone(),
            mode,
        ),
        Commands::Runs => handlers::model::handle_runs(ctx, mode),
        Commands::Classify {
            texts,
            input,
            header,
            output,
            scores,
        } => match input {
            Some(input) => {
                handlers::score::handle_classify_file(ctx, input, *header, output.as_deref(), mode)
                    .await
            }
            None => handlers::score::handle_classify_texts(ctx, texts, *scores, mode).await,
        },
        Commands::Evaluate { input, header } => {
            handlers::score::handle_evaluate(ctx, input, *header, mode).await
        }
    }
}
