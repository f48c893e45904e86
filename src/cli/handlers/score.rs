//! Scoring handlers: classify texts or files, evaluate against labels.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use crate::cli::output::{
    create_progress, create_spinner, output_json, print_header, print_kv, print_success,
    print_table, truncate_cell, OutputMode,
};
use crate::cli::read_corpus;
use crate::data::jsonl::row_to_json;
use crate::data::{DataSink, Frame, JsonlSink, TsvSink};
use crate::eval::evaluate;
use crate::inference::{score_frame, LocalScoringService};
use crate::init::AppContext;

async fn load_service(ctx: &AppContext, mode: OutputMode) -> Result<Arc<LocalScoringService>> {
    let spinner = create_spinner("Loading model...", mode);
    let service = ctx.scoring_service().await;
    spinner.finish_and_clear();
    service
}

async fn score_with_progress(
    ctx: &AppContext,
    service: &LocalScoringService,
    frame: &Frame,
    mode: OutputMode,
) -> Result<Frame> {
    let bar = create_progress(frame.len(), mode, "Scoring");
    let scored = score_frame(service, frame, &ctx.partition_options(), |rows| {
        bar.inc(rows as u64)
    })
    .await;
    bar.finish_and_clear();
    Ok(scored?)
}

#[derive(Serialize)]
struct TextPrediction<'a> {
    text: &'a str,
    label: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f32>,
}

pub async fn handle_classify_texts(
    ctx: &AppContext,
    texts: &[String],
    scores: bool,
    mode: OutputMode,
) -> Result<()> {
    if texts.is_empty() {
        anyhow::bail!("Nothing to classify. Pass texts or --input <file>");
    }

    let service = load_service(ctx, mode).await?;
    let unit = service.unit().clone();
    let owned = texts.to_vec();
    let predictions = tokio::task::spawn_blocking(move || unit.score(&owned))
        .await
        .map_err(|e| anyhow::anyhow!("Task join error: {}", e))??;

    match mode {
        OutputMode::Json => {
            let items: Vec<TextPrediction> = texts
                .iter()
                .zip(&predictions)
                .map(|(text, p)| TextPrediction {
                    text,
                    label: &p.label,
                    score: scores.then_some(p.score),
                })
                .collect();
            output_json(&items);
        }
        OutputMode::Human => {
            let rows = texts
                .iter()
                .zip(&predictions)
                .map(|(text, p)| {
                    let mut row = vec![truncate_cell(text, 60), p.label.clone()];
                    if scores {
                        row.push(format!("{:.3}", p.score));
                    }
                    row
                })
                .collect();
            if scores {
                print_table(&["Text", "Label", "Score"], rows);
            } else {
                print_table(&["Text", "Label"], rows);
            }
        }
    }
    Ok(())
}

pub async fn handle_classify_file(
    ctx: &AppContext,
    input: &Path,
    header: bool,
    output: Option<&Path>,
    mode: OutputMode,
) -> Result<()> {
    let frame = read_corpus(ctx, input, header)?;
    let service = load_service(ctx, mode).await?;
    let scored = score_with_progress(ctx, &service, &frame, mode).await?;

    if let Some(path) = output {
        let is_jsonl = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jsonl") || e.eq_ignore_ascii_case("json"));
        if is_jsonl {
            JsonlSink::new(path).write(&scored)?;
        } else {
            TsvSink::new(path).write(&scored)?;
        }
        if mode == OutputMode::Human {
            print_success(&format!("Scored {} rows into {}", scored.len(), path.display()));
        }
        return Ok(());
    }

    match mode {
        OutputMode::Json => {
            let rows: Vec<serde_json::Value> = scored
                .rows()
                .iter()
                .map(|row| row_to_json(scored.columns(), row))
                .collect();
            output_json(&rows);
        }
        OutputMode::Human => {
            let texts = scored.text_column(&ctx.config.text_column)?;
            let predictions = scored.text_column(&ctx.config.prediction_column)?;
            let rows = texts
                .iter()
                .zip(&predictions)
                .map(|(text, label)| vec![truncate_cell(text, 60), label.clone()])
                .collect();
            print_table(&["Text", "Prediction"], rows);
        }
    }
    Ok(())
}

pub async fn handle_evaluate(
    ctx: &AppContext,
    input: &Path,
    header: bool,
    mode: OutputMode,
) -> Result<()> {
    let frame = read_corpus(ctx, input, header)?;
    let service = load_service(ctx, mode).await?;
    let scored = score_with_progress(ctx, &service, &frame, mode).await?;

    let predictions = scored.text_column(&ctx.config.prediction_column)?;
    let references = scored.text_column(&ctx.config.label_column)?;
    let report = evaluate(&predictions, &references)?;

    match mode {
        OutputMode::Json => output_json(&report),
        OutputMode::Human => {
            print_header(&format!("Evaluation of {}", input.display()));
            print_kv("rows", &report.total.to_string());
            print_kv(
                "accuracy",
                &format!("{:.4}", report.accuracy).bold().to_string(),
            );
            println!();
            let rows = report
                .per_label
                .iter()
                .map(|(label, stats)| {
                    let recall = if stats.support == 0 {
                        0.0
                    } else {
                        stats.correct as f64 / stats.support as f64
                    };
                    vec![
                        label.clone(),
                        stats.support.to_string(),
                        stats.correct.to_string(),
                        format!("{:.4}", recall),
                    ]
                })
                .collect();
            print_table(&["Label", "Support", "Correct", "Recall"], rows);
        }
    }
    Ok(())
}
