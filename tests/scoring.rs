//! Integration tests for the scoring unit.
//!
//! Tests verify:
//! - Output is one label per input, in input order, across chunk boundaries
//! - Chunks never exceed the batch size
//! - Empty input makes no model calls
//! - Over-length inputs are truncated rather than rejected
//! - Non-text cells fail before inference
//! - Incompatible model, tokenizer and label table are rejected
//! - Per-chunk outcomes keep their input ranges
//! - Tied class scores resolve to the lowest label id

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{ham_spam, keyword_unit, tokenizer, unit_for, KeywordModel};
use textclass::data::Value;
use textclass::inference::{ScoringOptions, ScoringUnit, SequenceModel};
use textclass::{LabelTable, TextClassError};

#[test]
fn test_classify_preserves_order_across_chunks() {
    let (unit, model) = keyword_unit(2, 512);
    let texts = [
        "Free entry to win a prize",
        "See you at lunch",
        "Hi there",
        "Claim your free money now",
    ];

    let labels = unit.classify(&texts).unwrap();

    assert_eq!(labels, vec!["spam", "ham", "ham", "spam"]);
    assert_eq!(model.calls(), 2);
    assert_eq!(model.batch_sizes(), vec![2, 2]);
}

#[test]
fn test_classify_last_chunk_may_be_short() {
    let (unit, model) = keyword_unit(2, 512);
    let texts = ["win", "hi", "money"];

    let labels = unit.classify(&texts).unwrap();

    assert_eq!(labels, vec!["spam", "ham", "spam"]);
    assert_eq!(model.batch_sizes(), vec![2, 1]);
}

#[test]
fn test_classify_empty_input_makes_no_model_calls() {
    let (unit, model) = keyword_unit(8, 512);
    let texts: [&str; 0] = [];

    let labels = unit.classify(&texts).unwrap();

    assert!(labels.is_empty());
    assert_eq!(model.calls(), 0);
}

#[test]
fn test_classify_empty_string_still_gets_a_label() {
    let (unit, _model) = keyword_unit(8, 512);

    let labels = unit.classify(&["", "free"]).unwrap();

    assert_eq!(labels, vec!["ham", "spam"]);
}

#[test]
fn test_score_reports_winning_probability() {
    let (unit, _model) = keyword_unit(8, 512);

    let predictions = unit.score(&["free prize money", "hi"]).unwrap();

    assert_eq!(predictions[0].label, "spam");
    assert_eq!(predictions[1].label, "ham");
    for p in &predictions {
        assert!(p.score > 0.5 && p.score <= 1.0, "score {}", p.score);
    }
}

#[test]
fn test_long_input_is_truncated_to_model_limit() {
    // The model refuses anything longer than 5 tokens; the configured
    // max_length is larger, so the model limit must win.
    let model = Arc::new(KeywordModel::new(5));
    let unit = unit_for(model.clone(), 4, 512);
    assert_eq!(unit.max_length(), 5);

    let long_spam = format!("free {}", "see you at lunch ".repeat(50));
    let long_ham = format!("hi there {} boom", "see you ".repeat(40));

    let labels = unit.classify(&[long_spam.as_str(), long_ham.as_str()]).unwrap();

    // `boom` sits past the cut-off, so it never reaches the model.
    assert_eq!(labels, vec!["spam", "ham"]);
    assert_eq!(model.calls(), 1);
}

#[test]
fn test_configured_max_length_truncates_below_model_limit() {
    let (unit, _model) = keyword_unit(8, 3);
    assert_eq!(unit.max_length(), 3);

    // The spam keyword is the fourth token and gets cut.
    let labels = unit.classify(&["hi there you free"]).unwrap();

    assert_eq!(labels, vec!["ham"]);
}

#[test]
fn test_classify_values_rejects_non_text_before_inference() {
    let (unit, model) = keyword_unit(2, 512);
    let values = vec![
        Value::from("free money"),
        Value::Null,
        Value::from("hi there"),
    ];

    let err = unit.classify_values(&values).unwrap_err();

    match err {
        TextClassError::InvalidInput { index, .. } => assert_eq!(index, 1),
        other => panic!("expected InvalidInput, got {other:?}"),
    }
    assert_eq!(model.calls(), 0);
}

#[test]
fn test_classify_values_accepts_text_cells() {
    let (unit, _model) = keyword_unit(2, 512);
    let values = vec![Value::from("win"), Value::from("lunch")];

    assert_eq!(unit.classify_values(&values).unwrap(), vec!["spam", "ham"]);
}

#[test]
fn test_failing_chunk_reports_position() {
    let (unit, _model) = keyword_unit(2, 512);
    let texts = ["hi", "free", "see you", "boom"];

    let err = unit.classify(&texts).unwrap_err();

    match err {
        TextClassError::Inference {
            chunk, offset, len, ..
        } => {
            assert_eq!(chunk, 1);
            assert_eq!(offset, 2);
            assert_eq!(len, 2);
        }
        other => panic!("expected Inference, got {other:?}"),
    }
}

#[test]
fn test_classify_chunks_continues_past_failure() {
    let (unit, model) = keyword_unit(2, 512);
    let texts = ["hi", "boom", "free", "lunch", "money"];

    let outcomes = unit.classify_chunks(&texts);

    assert_eq!(outcomes.len(), 3);
    assert_eq!(model.calls(), 3);

    assert_eq!(outcomes[0].range, 0..2);
    assert!(outcomes[0].result.is_err());

    assert_eq!(outcomes[1].index, 1);
    assert_eq!(outcomes[1].range, 2..4);
    assert_eq!(
        outcomes[1].result.as_ref().unwrap(),
        &vec!["spam".to_string(), "ham".to_string()]
    );

    assert_eq!(outcomes[2].range, 4..5);
    assert_eq!(outcomes[2].result.as_ref().unwrap(), &vec!["spam".to_string()]);
}

#[test]
fn test_initialize_rejects_label_count_mismatch() {
    let model = Arc::new(KeywordModel::new(64));
    let labels = LabelTable::build(["ham", "spam", "phishing"]).unwrap();

    let err = ScoringUnit::initialize(model, tokenizer(), labels, ScoringOptions::default())
        .unwrap_err();

    assert!(matches!(err, TextClassError::ModelLoad(_)), "{err:?}");
}

#[test]
fn test_initialize_rejects_zero_batch_size() {
    let model = Arc::new(KeywordModel::new(64));
    let options = ScoringOptions {
        batch_size: 0,
        max_length: 512,
    };

    let err = ScoringUnit::initialize(model, tokenizer(), ham_spam(), options).unwrap_err();

    assert!(matches!(err, TextClassError::Config(_)), "{err:?}");
}

#[test]
fn test_initialize_rejects_vocabulary_larger_than_model() {
    struct TinyVocab(KeywordModel);

    impl SequenceModel for TinyVocab {
        fn forward(
            &self,
            ids: &candle_core::Tensor,
            mask: &candle_core::Tensor,
            types: &candle_core::Tensor,
        ) -> candle_core::Result<candle_core::Tensor> {
            self.0.forward(ids, mask, types)
        }
        fn num_labels(&self) -> usize {
            2
        }
        fn vocab_size(&self) -> usize {
            4
        }
        fn max_input_tokens(&self) -> usize {
            64
        }
        fn device(&self) -> &candle_core::Device {
            self.0.device()
        }
    }

    let model = Arc::new(TinyVocab(KeywordModel::new(64)));
    let err = ScoringUnit::initialize(model, tokenizer(), ham_spam(), ScoringOptions::default())
        .unwrap_err();

    assert!(matches!(err, TextClassError::ModelLoad(_)), "{err:?}");
}

#[test]
fn test_unit_exposes_labels_and_batch_size() {
    let (unit, _model) = keyword_unit(3, 128);

    assert_eq!(unit.batch_size(), 3);
    assert_eq!(unit.max_length(), 64);
    assert_eq!(unit.labels().labels(), &["ham".to_string(), "spam".to_string()]);
}

#[test]
fn test_tied_logits_pick_lowest_label_id() {
    // Untrained head: every class gets the same logit.
    struct FlatModel(KeywordModel);

    impl SequenceModel for FlatModel {
        fn forward(
            &self,
            ids: &candle_core::Tensor,
            _mask: &candle_core::Tensor,
            _types: &candle_core::Tensor,
        ) -> candle_core::Result<candle_core::Tensor> {
            let (batch, _) = ids.dims2()?;
            candle_core::Tensor::zeros((batch, 2), candle_core::DType::F32, self.0.device())
        }
        fn num_labels(&self) -> usize {
            2
        }
        fn vocab_size(&self) -> usize {
            self.0.vocab_size()
        }
        fn max_input_tokens(&self) -> usize {
            64
        }
        fn device(&self) -> &candle_core::Device {
            self.0.device()
        }
    }

    let model = Arc::new(FlatModel(KeywordModel::new(64)));
    let unit =
        ScoringUnit::initialize(model, tokenizer(), ham_spam(), ScoringOptions::default()).unwrap();

    assert_eq!(unit.classify(&["hi there"]).unwrap(), vec!["ham"]);
    let scored = unit.score(&["free money"]).unwrap();
    assert_eq!(scored[0].label, "ham");
    assert!((scored[0].score - 0.5).abs() < 1e-6);
}
