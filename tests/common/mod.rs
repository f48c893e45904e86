//! Shared fixtures: a tiny word-level tokenizer and a deterministic
//! keyword model, so scoring can be tested without downloading weights.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

use textclass::inference::{ScoringOptions, ScoringUnit, SequenceModel};
use textclass::LabelTable;

pub const VOCAB: &[&str] = &[
    "[PAD]", "[UNK]", "free", "win", "prize", "money", "hi", "there", "see", "you", "at",
    "lunch", "now", "boom",
];

/// Token ids that push the keyword model towards `spam`.
pub const SPAM_WORDS: &[&str] = &["free", "win", "prize", "money"];

pub fn token_id(word: &str) -> u32 {
    VOCAB
        .iter()
        .position(|w| *w == word)
        .expect("word is in the fixture vocabulary") as u32
}

/// Lowercasing, whitespace-splitting word-level tokenizer over [`VOCAB`].
pub fn tokenizer() -> Tokenizer {
    let vocab: serde_json::Map<String, serde_json::Value> = VOCAB
        .iter()
        .enumerate()
        .map(|(id, w)| (w.to_string(), serde_json::Value::from(id)))
        .collect();
    let json = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": { "type": "Lowercase" },
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": "[UNK]"
        }
    });
    Tokenizer::from_bytes(json.to_string().as_bytes()).expect("fixture tokenizer parses")
}

pub fn ham_spam() -> LabelTable {
    LabelTable::build(["ham", "spam"]).expect("distinct labels")
}

/// Two-class model: a row is `spam` when it contains any spam keyword.
///
/// Refuses sequences longer than `max_tokens`, and fails whole batches that
/// contain the `boom` token.
pub struct KeywordModel {
    device: Device,
    max_tokens: usize,
    calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
}

impl KeywordModel {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            device: Device::Cpu,
            max_tokens,
            calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }
}

impl SequenceModel for KeywordModel {
    fn forward(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        _token_type_ids: &Tensor,
    ) -> candle_core::Result<Tensor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (batch, seq_len) = input_ids.dims2()?;
        self.batch_sizes.lock().unwrap().push(batch);
        if seq_len > self.max_tokens {
            candle_core::bail!("sequence of {} tokens exceeds {}", seq_len, self.max_tokens);
        }

        let ids = input_ids.to_vec2::<u32>()?;
        let mask = attention_mask.to_vec2::<u32>()?;
        let spam_ids: Vec<u32> = SPAM_WORDS.iter().map(|w| token_id(w)).collect();
        let boom = token_id("boom");

        let mut logits = Vec::with_capacity(batch * 2);
        for (row, row_mask) in ids.iter().zip(&mask) {
            let live = row.iter().zip(row_mask).filter(|(_, m)| **m == 1).map(|(id, _)| *id);
            let mut hits = 0.0f32;
            for id in live {
                if id == boom {
                    candle_core::bail!("poisoned input");
                }
                if spam_ids.contains(&id) {
                    hits += 1.0;
                }
            }
            logits.push(1.0);
            logits.push(2.0 * hits);
        }
        Tensor::from_vec(logits, (batch, 2), &self.device)
    }

    fn num_labels(&self) -> usize {
        2
    }

    fn vocab_size(&self) -> usize {
        VOCAB.len()
    }

    fn max_input_tokens(&self) -> usize {
        self.max_tokens
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// Scoring unit over `model`.
pub fn unit_for(model: Arc<KeywordModel>, batch_size: usize, max_length: usize) -> ScoringUnit {
    ScoringUnit::initialize(
        model,
        tokenizer(),
        ham_spam(),
        ScoringOptions {
            batch_size,
            max_length,
        },
    )
    .expect("fixture unit initializes")
}

/// Scoring unit over [`KeywordModel`], returning the model for call counts.
pub fn keyword_unit(batch_size: usize, max_length: usize) -> (ScoringUnit, Arc<KeywordModel>) {
    let model = Arc::new(KeywordModel::new(64));
    (unit_for(model.clone(), batch_size, max_length), model)
}
