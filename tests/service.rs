//! Integration tests for the async scoring service and frame scoring.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use common::keyword_unit;
use textclass::data::{DataSink, DataSource, Frame, MemoryFrame, Value};
use textclass::inference::{
    score_frame, LocalScoringService, NoopScoringService, PartitionOptions, ScoringService,
};
use textclass::{LabelTable, TextClassError};

fn sms_frame(rows: &[(&str, &str)]) -> Frame {
    Frame::from_rows(
        ["label", "text"],
        rows.iter()
            .map(|(label, text)| vec![Value::from(*label), Value::from(*text)])
            .collect(),
    )
    .unwrap()
}

fn options(partition_rows: usize, workers: usize) -> PartitionOptions {
    PartitionOptions {
        partition_rows,
        workers,
        ..Default::default()
    }
}

/// Echoes each text back, finishing early partitions last.
struct SlowEcho {
    calls: AtomicUsize,
}

#[async_trait]
impl ScoringService for SlowEcho {
    async fn classify(&self, texts: Vec<String>) -> Result<Vec<String>, TextClassError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        for _ in 0..(40usize.saturating_sub(call * 10)) {
            tokio::task::yield_now().await;
        }
        Ok(texts)
    }

    fn labels(&self) -> Option<&LabelTable> {
        None
    }

    fn is_available(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn test_local_service_scores_frame_in_row_order() {
    let (unit, _model) = keyword_unit(2, 512);
    let service = LocalScoringService::new(Arc::new(unit));
    let frame = sms_frame(&[
        ("spam", "Free entry to win a prize"),
        ("ham", "See you at lunch"),
        ("ham", "Hi there"),
        ("spam", "Claim your free money now"),
        ("ham", "lunch now"),
    ]);

    let scored = score_frame(&service, &frame, &options(2, 3), |_| {})
        .await
        .unwrap();

    assert_eq!(scored.columns(), &["label", "text", "prediction"]);
    assert_eq!(
        scored.text_column("prediction").unwrap(),
        scored.text_column("label").unwrap()
    );
}

#[tokio::test]
async fn test_concurrent_partitions_are_reassembled_in_order() {
    let service = SlowEcho {
        calls: AtomicUsize::new(0),
    };
    let rows: Vec<(String, String)> = (0..10)
        .map(|i| ("ham".to_string(), format!("row {}", i)))
        .collect();
    let borrowed: Vec<(&str, &str)> = rows
        .iter()
        .map(|(l, t)| (l.as_str(), t.as_str()))
        .collect();
    let frame = sms_frame(&borrowed);
    let progressed = AtomicUsize::new(0);

    let scored = score_frame(&service, &frame, &options(3, 4), |n| {
        progressed.fetch_add(n, Ordering::SeqCst);
    })
    .await
    .unwrap();

    assert_eq!(
        scored.text_column("prediction").unwrap(),
        scored.text_column("text").unwrap()
    );
    assert_eq!(service.calls.load(Ordering::SeqCst), 4);
    assert_eq!(progressed.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_non_text_cell_fails_before_any_partition() {
    let service = SlowEcho {
        calls: AtomicUsize::new(0),
    };
    let frame = Frame::from_rows(
        ["label", "text"],
        vec![
            vec![Value::from("ham"), Value::from("hi")],
            vec![Value::from("ham"), Value::Int(7)],
        ],
    )
    .unwrap();

    let err = score_frame(&service, &frame, &options(1, 2), |_| {})
        .await
        .unwrap_err();

    assert!(
        matches!(err, TextClassError::InvalidInput { index: 1, .. }),
        "{err:?}"
    );
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_text_column_is_reported() {
    let service = NoopScoringService::new();
    let frame = Frame::new(["label", "body"]);

    let err = score_frame(&service, &frame, &options(4, 1), |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, TextClassError::Data(_)), "{err:?}");
}

#[tokio::test]
async fn test_failing_partition_reports_frame_offset() {
    let (unit, _model) = keyword_unit(2, 512);
    let service = LocalScoringService::new(Arc::new(unit));
    let frame = sms_frame(&[
        ("ham", "hi"),
        ("ham", "see you"),
        ("ham", "lunch"),
        ("ham", "at lunch"),
        ("spam", "free"),
        ("ham", "boom"),
    ]);

    let err = score_frame(&service, &frame, &options(4, 2), |_| {})
        .await
        .unwrap_err();

    match err {
        TextClassError::Inference { offset, len, .. } => {
            // Second partition starts at row 4; its only chunk covers rows 4..6.
            assert_eq!(offset, 4);
            assert_eq!(len, 2);
        }
        other => panic!("expected Inference, got {other:?}"),
    }
}

#[tokio::test]
async fn test_noop_service_is_unavailable() {
    let service = NoopScoringService::new();

    assert!(!service.is_available());
    assert!(service.labels().is_none());
    assert!(service.classify(vec!["hi".to_string()]).await.is_err());
}

#[tokio::test]
async fn test_local_service_empty_batch() {
    let (unit, model) = keyword_unit(2, 512);
    let service = LocalScoringService::new(Arc::new(unit));

    let labels = service.classify(vec![]).await.unwrap();

    assert!(labels.is_empty());
    assert_eq!(model.calls(), 0);
    assert_eq!(service.labels().map(|l| l.len()), Some(2));
}

#[tokio::test]
async fn test_memory_frame_round_trip_through_scoring() {
    let (unit, _model) = keyword_unit(4, 512);
    let service = LocalScoringService::new(Arc::new(unit));
    let source = MemoryFrame::new(sms_frame(&[("spam", "win money"), ("ham", "hi there")]));

    let frame = source.read().unwrap();
    let scored = score_frame(&service, &frame, &options(8, 1), |_| {})
        .await
        .unwrap();
    let sink = MemoryFrame::default();
    sink.write(&scored).unwrap();

    let stored = sink.snapshot().unwrap();
    assert_eq!(
        stored.text_column("prediction").unwrap(),
        vec!["spam".to_string(), "ham".to_string()]
    );
}
