//! Bidirectional mapping between class label strings and dense class IDs.
//!
//! A [`LabelTable`] is built once from the distinct labels of a corpus, the
//! position of each label in that enumeration becoming its ID. It is
//! read-only afterwards and travels with the model in `config.json` as the
//! Hugging Face `id2label` / `label2id` pair.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::{Frame, Value};
use crate::TextClassError;

/// Enumeration order used when deriving a table from a corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelOrder {
    /// Order of first appearance in the corpus.
    #[default]
    FirstSeen,
    /// Lexicographic order, independent of row order.
    Sorted,
}

/// Bijection between label strings and IDs `0..len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LabelTableRepr", into = "LabelTableRepr")]
pub struct LabelTable {
    labels: Vec<String>,
    ids: HashMap<String, usize>,
}

impl LabelTable {
    /// Build a table from an already de-duplicated enumeration.
    ///
    /// The ID of each label is its position in `distinct_labels`.
    pub fn build<S: Into<String>>(
        distinct_labels: impl IntoIterator<Item = S>,
    ) -> Result<Self, TextClassError> {
        let mut labels = Vec::new();
        let mut ids = HashMap::new();
        for label in distinct_labels {
            let label = label.into();
            if ids.contains_key(&label) {
                return Err(TextClassError::DuplicateLabel { label });
            }
            ids.insert(label.clone(), labels.len());
            labels.push(label);
        }
        Ok(Self { labels, ids })
    }

    /// Derive a table from every label value observed in a corpus.
    ///
    /// Repeated values collapse to one entry, so this only fails if
    /// [`LabelTable::build`] does.
    pub fn from_corpus<S: AsRef<str>>(
        observed: impl IntoIterator<Item = S>,
        order: LabelOrder,
    ) -> Result<Self, TextClassError> {
        let mut seen = HashSet::new();
        let mut distinct: Vec<String> = Vec::new();
        for label in observed {
            let label = label.as_ref();
            if seen.insert(label.to_string()) {
                distinct.push(label.to_string());
            }
        }
        if order == LabelOrder::Sorted {
            distinct.sort();
        }
        Self::build(distinct)
    }

    /// Derive a table from a text column of a frame.
    pub fn from_column(
        frame: &Frame,
        column: &str,
        order: LabelOrder,
    ) -> Result<Self, TextClassError> {
        let labels = frame.text_column(column)?;
        Self::from_corpus(labels, order)
    }

    /// Number of labels (`K`).
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in ID order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// `(id, label)` pairs in ID order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.labels.iter().enumerate().map(|(i, l)| (i, l.as_str()))
    }

    pub fn id(&self, label: &str) -> Option<usize> {
        self.ids.get(label).copied()
    }

    pub fn label(&self, id: usize) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    /// Translate label strings to IDs.
    ///
    /// Fails on the first label that is not in the table; there is no
    /// fallback ID.
    pub fn encode<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>, TextClassError> {
        labels
            .iter()
            .map(|l| {
                let l = l.as_ref();
                self.id(l).ok_or_else(|| TextClassError::UnknownLabel {
                    label: l.to_string(),
                })
            })
            .collect()
    }

    /// Translate IDs back to label strings.
    pub fn decode(&self, ids: &[usize]) -> Result<Vec<String>, TextClassError> {
        ids.iter()
            .map(|&id| {
                self.label(id)
                    .map(str::to_string)
                    .ok_or(TextClassError::UnknownId {
                        id,
                        num_labels: self.len(),
                    })
            })
            .collect()
    }

    /// Replace a text label column with integer IDs.
    pub fn encode_column(&self, frame: &Frame, column: &str) -> Result<Frame, TextClassError> {
        let labels = frame.text_column(column)?;
        let ids = self.encode(&labels)?;
        frame.with_column(column, ids.into_iter().map(|id| Value::Int(id as i64)).collect())
    }

    /// Read the table from a model `config.json` document.
    pub fn from_model_config(config: &serde_json::Value) -> Result<Self, TextClassError> {
        let id2label = config.get("id2label").cloned().ok_or_else(|| {
            TextClassError::InvalidLabelTable("config is missing id2label".to_string())
        })?;
        let label2id = config.get("label2id").cloned();

        let repr = LabelTableRepr {
            id2label: serde_json::from_value(id2label).map_err(|e| {
                TextClassError::InvalidLabelTable(format!("id2label is malformed: {}", e))
            })?,
            label2id: match label2id {
                Some(v) => serde_json::from_value(v).map_err(|e| {
                    TextClassError::InvalidLabelTable(format!("label2id is malformed: {}", e))
                })?,
                None => BTreeMap::new(),
            },
        };
        Self::try_from(repr)
    }

    /// Write `id2label`, `label2id` and `num_labels` into a model config document.
    pub fn embed_in_model_config(&self, config: &mut serde_json::Value) -> Result<(), TextClassError> {
        let obj = config.as_object_mut().ok_or_else(|| {
            TextClassError::InvalidLabelTable("model config is not a JSON object".to_string())
        })?;
        let repr = LabelTableRepr::from(self.clone());
        obj.insert("id2label".to_string(), serde_json::to_value(&repr.id2label)?);
        obj.insert("label2id".to_string(), serde_json::to_value(&repr.label2id)?);
        obj.insert("num_labels".to_string(), serde_json::Value::from(self.len()));
        Ok(())
    }

    /// Update a `config.json` file in place with this table.
    pub fn write_into_config_file(&self, path: &Path) -> Result<(), TextClassError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: serde_json::Value = serde_json::from_str(&contents)?;
        self.embed_in_model_config(&mut config)?;
        std::fs::write(path, serde_json::to_string_pretty(&config)?)?;
        info!(
            "Embedded {} labels into {}",
            self.len(),
            path.display()
        );
        Ok(())
    }

    /// Load a standalone `labels.json` file.
    pub fn load(path: &Path) -> Result<Self, TextClassError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TextClassError::Io(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            TextClassError::InvalidLabelTable(format!("{}: {}", path.display(), e))
        })
    }

    /// Persist as a standalone `labels.json` file.
    pub fn save(&self, path: &Path) -> Result<(), TextClassError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Serialized form matching Hugging Face model configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LabelTableRepr {
    id2label: BTreeMap<String, String>,
    #[serde(default)]
    label2id: BTreeMap<String, usize>,
}

impl From<LabelTable> for LabelTableRepr {
    fn from(table: LabelTable) -> Self {
        let id2label = table
            .labels
            .iter()
            .enumerate()
            .map(|(id, label)| (id.to_string(), label.clone()))
            .collect();
        Self {
            id2label,
            label2id: table.ids.into_iter().collect(),
        }
    }
}

impl TryFrom<LabelTableRepr> for LabelTable {
    type Error = TextClassError;

    fn try_from(repr: LabelTableRepr) -> Result<Self, Self::Error> {
        let mut entries: Vec<(usize, String)> = repr
            .id2label
            .into_iter()
            .map(|(key, label)| {
                key.parse::<usize>()
                    .map(|id| (id, label))
                    .map_err(|_| {
                        TextClassError::InvalidLabelTable(format!(
                            "id2label key '{}' is not a non-negative integer",
                            key
                        ))
                    })
            })
            .collect::<Result<_, _>>()?;
        entries.sort_by_key(|(id, _)| *id);

        for (expected, (id, _)) in entries.iter().enumerate() {
            if *id != expected {
                return Err(TextClassError::InvalidLabelTable(format!(
                    "id2label ids must be contiguous from 0; expected {}, found {}",
                    expected, id
                )));
            }
        }

        let table = LabelTable::build(entries.into_iter().map(|(_, label)| label)).map_err(
            |e| match e {
                TextClassError::DuplicateLabel { label } => TextClassError::InvalidLabelTable(
                    format!("label '{}' is mapped to more than one id", label),
                ),
                other => other,
            },
        )?;

        if !repr.label2id.is_empty() {
            if repr.label2id.len() != table.len() {
                return Err(TextClassError::InvalidLabelTable(format!(
                    "label2id has {} entries but id2label has {}",
                    repr.label2id.len(),
                    table.len()
                )));
            }
            for (label, id) in &repr.label2id {
                if table.id(label) != Some(*id) {
                    return Err(TextClassError::InvalidLabelTable(format!(
                        "label2id['{}'] = {} does not invert id2label",
                        label, id
                    )));
                }
            }
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ham_spam() -> LabelTable {
        LabelTable::build(["ham", "spam"]).unwrap()
    }

    #[test]
    fn test_build_assigns_positional_ids() {
        let table = ham_spam();
        assert_eq!(table.id("ham"), Some(0));
        assert_eq!(table.id("spam"), Some(1));
        assert_eq!(table.label(1), Some("spam"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_encode_decode_ham_spam_scenario() {
        let table = ham_spam();
        let ids = table.encode(&["spam", "ham", "spam"]).unwrap();
        assert_eq!(ids, vec![1, 0, 1]);
        assert_eq!(table.decode(&[1, 0, 1]).unwrap(), vec!["spam", "ham", "spam"]);
    }

    #[test]
    fn test_encode_unknown_label_fails() {
        let err = ham_spam().encode(&["ham", "eggs"]).unwrap_err();
        match err {
            TextClassError::UnknownLabel { label } => assert_eq!(label, "eggs"),
            other => panic!("expected UnknownLabel, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_out_of_range_fails() {
        let err = ham_spam().decode(&[0, 2]).unwrap_err();
        assert!(matches!(
            err,
            TextClassError::UnknownId {
                id: 2,
                num_labels: 2
            }
        ));
    }

    #[test]
    fn test_build_rejects_duplicates() {
        let err = LabelTable::build(["ham", "spam", "ham"]).unwrap_err();
        assert!(matches!(err, TextClassError::DuplicateLabel { .. }));
    }

    #[test]
    fn test_empty_table() {
        let table = LabelTable::build(Vec::<String>::new()).unwrap();
        assert!(table.is_empty());
        assert!(table.encode::<&str>(&[]).unwrap().is_empty());
        assert!(table.decode(&[0]).is_err());
    }

    #[test]
    fn test_from_corpus_first_seen_and_sorted() {
        let observed = ["spam", "ham", "ham", "spam", "eggs"];
        let first_seen = LabelTable::from_corpus(observed, LabelOrder::FirstSeen).unwrap();
        assert_eq!(first_seen.labels(), &["spam", "ham", "eggs"]);

        let sorted = LabelTable::from_corpus(observed, LabelOrder::Sorted).unwrap();
        assert_eq!(sorted.labels(), &["eggs", "ham", "spam"]);
    }

    #[test]
    fn test_encode_column_replaces_labels_with_ids() {
        let frame = Frame::from_rows(
            ["label", "text"],
            vec![
                vec!["spam".into(), "win".into()],
                vec!["ham".into(), "hi".into()],
            ],
        )
        .unwrap();
        let encoded = ham_spam().encode_column(&frame, "label").unwrap();
        assert_eq!(encoded.rows()[0][0], Value::Int(1));
        assert_eq!(encoded.rows()[1][0], Value::Int(0));
        assert_eq!(encoded.rows()[1][1], Value::from("hi"));
    }

    #[test]
    fn test_serializes_in_hugging_face_shape() {
        let value = serde_json::to_value(ham_spam()).unwrap();
        assert_eq!(
            value,
            json!({
                "id2label": {"0": "ham", "1": "spam"},
                "label2id": {"ham": 0, "spam": 1}
            })
        );
    }

    #[test]
    fn test_deserialize_orders_by_numeric_id() {
        // Lexicographic key order would put "10" before "2"
        let id2label: serde_json::Map<String, serde_json::Value> = (0..12)
            .map(|i| (i.to_string(), json!(format!("class_{}", i))))
            .collect();
        let table: LabelTable = serde_json::from_value(json!({ "id2label": id2label })).unwrap();
        assert_eq!(table.label(2), Some("class_2"));
        assert_eq!(table.label(10), Some("class_10"));
    }

    #[test]
    fn test_deserialize_rejects_gaps() {
        let result: Result<LabelTable, _> =
            serde_json::from_value(json!({"id2label": {"0": "ham", "2": "spam"}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_rejects_non_integer_keys() {
        let result: Result<LabelTable, _> =
            serde_json::from_value(json!({"id2label": {"zero": "ham"}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_rejects_inconsistent_inverse() {
        let result: Result<LabelTable, _> = serde_json::from_value(json!({
            "id2label": {"0": "ham", "1": "spam"},
            "label2id": {"ham": 1, "spam": 0}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_rejects_label_mapped_twice() {
        let result: Result<LabelTable, _> =
            serde_json::from_value(json!({"id2label": {"0": "ham", "1": "ham"}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_model_config_embedding() {
        let mut config = json!({"model_type": "bert", "vocab_size": 30522});
        ham_spam().embed_in_model_config(&mut config).unwrap();
        assert_eq!(config["num_labels"], 2);
        assert_eq!(config["id2label"]["1"], "spam");

        let table = LabelTable::from_model_config(&config).unwrap();
        assert_eq!(table, ham_spam());
    }

    #[test]
    fn test_from_model_config_without_labels() {
        let err = LabelTable::from_model_config(&json!({"model_type": "bert"})).unwrap_err();
        assert!(matches!(err, TextClassError::InvalidLabelTable(_)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_decode_inverts_encode(
                labels in proptest::collection::hash_set("[a-z]{1,12}", 1..20),
                picks in proptest::collection::vec(any::<prop::sample::Index>(), 0..50),
            ) {
                let distinct: Vec<String> = labels.into_iter().collect();
                let table = LabelTable::build(distinct.clone()).unwrap();
                let sample: Vec<String> = picks
                    .iter()
                    .map(|idx| distinct[idx.index(distinct.len())].clone())
                    .collect();

                let ids = table.encode(&sample).unwrap();
                prop_assert_eq!(table.decode(&ids).unwrap(), sample);
            }

            #[test]
            fn prop_from_corpus_matches_build_of_first_seen(
                observed in proptest::collection::vec("[a-c]{1,2}", 0..40),
            ) {
                let table = LabelTable::from_corpus(&observed, LabelOrder::FirstSeen).unwrap();
                let mut distinct: Vec<String> = Vec::new();
                for label in &observed {
                    if !distinct.contains(label) {
                        distinct.push(label.clone());
                    }
                }
                prop_assert_eq!(table, LabelTable::build(distinct).unwrap());
            }

            #[test]
            fn prop_ids_are_contiguous_inverses(
                labels in proptest::collection::hash_set(".{0,8}", 0..30),
            ) {
                let distinct: Vec<String> = labels.into_iter().collect();
                let table = LabelTable::build(distinct.clone()).unwrap();

                prop_assert_eq!(table.len(), distinct.len());
                for (id, label) in table.iter() {
                    prop_assert_eq!(table.id(label), Some(id));
                }
                for label in &distinct {
                    let id = table.id(label).unwrap();
                    prop_assert!(id < table.len());
                    prop_assert_eq!(table.label(id), Some(label.as_str()));
                }
            }

            #[test]
            fn prop_serde_preserves_table(
                labels in proptest::collection::hash_set("[a-zA-Z0-9_]{1,10}", 0..25),
            ) {
                let table = LabelTable::build(labels).unwrap();
                let json = serde_json::to_string(&table).unwrap();
                let back: LabelTable = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(back, table);
            }
        }
    }
}
