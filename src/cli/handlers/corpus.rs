//! Corpus preparation: label tables, label encoding, train/test split.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{output_json, print_header, print_kv, print_success, print_table, OutputMode};
use crate::cli::read_corpus;
use crate::data::{split, DataSink, TsvSink};
use crate::init::AppContext;
use crate::labels::{LabelOrder, LabelTable};

fn label_order(sorted: bool) -> LabelOrder {
    if sorted {
        LabelOrder::Sorted
    } else {
        LabelOrder::FirstSeen
    }
}

pub fn handle_labels(
    ctx: &AppContext,
    corpus: &Path,
    header: bool,
    sorted: bool,
    out: Option<&Path>,
    model_config: Option<&Path>,
    mode: OutputMode,
) -> Result<()> {
    let frame = read_corpus(ctx, corpus, header)?;
    let table = LabelTable::from_column(&frame, &ctx.config.label_column, label_order(sorted))?;

    if let Some(path) = out {
        table.save(path)?;
    }
    if let Some(path) = model_config {
        table.write_into_config_file(path)?;
    }

    match mode {
        OutputMode::Json => output_json(&table),
        OutputMode::Human => {
            print_header(&format!("Labels ({} rows)", frame.len()));
            let rows = table
                .iter()
                .map(|(id, label)| vec![id.to_string(), label.to_string()])
                .collect();
            print_table(&["ID", "Label"], rows);
            if let Some(path) = out {
                print_success(&format!("Wrote {}", path.display()));
            }
            if let Some(path) = model_config {
                print_success(&format!("Updated {}", path.display()));
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct EncodeSummary<'a> {
    rows: usize,
    output: String,
    labels: &'a LabelTable,
}

pub fn handle_encode(
    ctx: &AppContext,
    corpus: &Path,
    header: bool,
    labels: Option<&Path>,
    sorted: bool,
    out: &Path,
    mode: OutputMode,
) -> Result<()> {
    let frame = read_corpus(ctx, corpus, header)?;
    let table = match labels {
        Some(path) => LabelTable::load(path)?,
        None => LabelTable::from_column(&frame, &ctx.config.label_column, label_order(sorted))?,
    };

    let encoded = table.encode_column(&frame, &ctx.config.label_column)?;
    TsvSink::new(out).write(&encoded)?;

    match mode {
        OutputMode::Json => output_json(&EncodeSummary {
            rows: encoded.len(),
            output: out.display().to_string(),
            labels: &table,
        }),
        OutputMode::Human => {
            print_success(&format!(
                "Encoded {} rows with {} labels into {}",
                encoded.len(),
                table.len(),
                out.display()
            ));
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct SplitSummary {
    train_rows: usize,
    test_rows: usize,
    seed: u64,
}

#[allow(clippy::too_many_arguments)]
pub fn handle_split(
    ctx: &AppContext,
    corpus: &Path,
    header: bool,
    train: &Path,
    test: &Path,
    test_fraction: f64,
    seed: u64,
    mode: OutputMode,
) -> Result<()> {
    let frame = read_corpus(ctx, corpus, header)?;
    let (train_frame, test_frame) = split(&frame, test_fraction, seed)?;

    TsvSink::new(train).write(&train_frame)?;
    TsvSink::new(test).write(&test_frame)?;

    match mode {
        OutputMode::Json => output_json(&SplitSummary {
            train_rows: train_frame.len(),
            test_rows: test_frame.len(),
            seed,
        }),
        OutputMode::Human => {
            print_success(&format!("Split {} rows (seed {})", frame.len(), seed));
            print_kv("train", &format!("{} rows -> {}", train_frame.len(), train.display()));
            print_kv("test", &format!("{} rows -> {}", test_frame.len(), test.display()));
        }
    }
    Ok(())
}
