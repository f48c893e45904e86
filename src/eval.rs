//! Accuracy of predicted labels against reference labels.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::TextClassError;

/// Per-label counts, keyed by the reference label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelStats {
    /// Rows whose reference is this label.
    pub support: usize,
    /// Of those, rows predicted correctly.
    pub correct: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub per_label: BTreeMap<String, LabelStats>,
}

/// Compare predictions to references position by position.
pub fn evaluate<P, R>(predictions: &[P], references: &[R]) -> Result<Evaluation, TextClassError>
where
    P: AsRef<str>,
    R: AsRef<str>,
{
    if predictions.len() != references.len() {
        return Err(TextClassError::InvalidInput {
            index: predictions.len().min(references.len()),
            reason: format!(
                "{} predictions for {} references",
                predictions.len(),
                references.len()
            ),
        });
    }

    let mut per_label: BTreeMap<String, LabelStats> = BTreeMap::new();
    let mut correct = 0;
    for (pred, reference) in predictions.iter().zip(references) {
        let stats = per_label.entry(reference.as_ref().to_string()).or_default();
        stats.support += 1;
        if pred.as_ref() == reference.as_ref() {
            stats.correct += 1;
            correct += 1;
        }
    }

    let total = references.len();
    let accuracy = if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    };

    Ok(Evaluation {
        total,
        correct,
        accuracy,
        per_label,
    })
}
