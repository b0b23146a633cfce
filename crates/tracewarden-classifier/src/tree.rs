//! Decision-tree model and evaluator.
//!
//! # Design
//! - The model is loaded through [`TreeSource`] on every analysis; nothing is cached.
//! - Invariants are checked once after decoding, so evaluation never indexes out of bounds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, ClassifierResult};

/// Feature marker carried by leaf nodes.
pub const LEAF_FEATURE: &str = "leaf";

/// Class index for benign traffic.
pub const BENIGN_CLASS: usize = 0;

/// Label returned for class indices outside [`ATTACK_CLASSES`].
pub const UNKNOWN_LABEL: &str = "UNKNOWN";

/// Class labels indexed by the model's output position.
pub const ATTACK_CLASSES: [&str; 5] = [
    "BENIGN",
    "Intra_UPF_UE_DoS",
    "DDoS",
    "GTP_ENCAPSULATION",
    "GTP_ENCAPSULATION",
];

/// Map a class index to its label.
#[must_use]
pub fn class_label(index: usize) -> &'static str {
    ATTACK_CLASSES.get(index).copied().unwrap_or(UNKNOWN_LABEL)
}

/// One node of a binary decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeNode {
    /// Optional node number emitted by the exporter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<u64>,
    /// Feature name, or `"leaf"`.
    pub feature: String,
    /// Split threshold; `value <= threshold` goes left.
    #[serde(default)]
    pub threshold: f64,
    /// Class probability rows; only the first row is used.
    #[serde(default)]
    pub value: Vec<Vec<f64>>,
    /// `[left, right]` for internal nodes, empty for leaves.
    #[serde(default)]
    pub children: Vec<Self>,
}

impl DecisionTreeNode {
    /// Whether evaluation stops at this node.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.feature == LEAF_FEATURE || self.children.is_empty()
    }

    /// Check the structural invariants of the whole tree.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifierError::MalformedTree`] for an internal node without
    /// exactly two children or a leaf without a non-empty probability row.
    pub fn validate(&self) -> ClassifierResult<()> {
        let mut pending = vec![(self, 0_usize)];
        while let Some((node, depth)) = pending.pop() {
            if node.is_leaf() {
                if node.value.first().is_none_or(Vec::is_empty) {
                    return Err(ClassifierError::MalformedTree {
                        reason: "leaf_without_probabilities",
                        depth,
                    });
                }
                continue;
            }
            if node.children.len() != 2 {
                return Err(ClassifierError::MalformedTree {
                    reason: "internal_node_without_two_children",
                    depth,
                });
            }
            pending.extend(node.children.iter().map(|child| (child, depth + 1)));
        }
        Ok(())
    }

    /// Classify one flow record, returning the class index and label.
    ///
    /// Missing features route left; missing or unparsable fields read as `0.0`.
    /// Ties between probabilities resolve to the lowest index.
    #[must_use]
    pub fn classify(&self, record: &[&str], header: &HashMap<String, usize>) -> (usize, &'static str) {
        let mut node = self;
        while node.feature != LEAF_FEATURE {
            let [left, right] = node.children.as_slice() else {
                break;
            };
            node = match header.get(&node.feature) {
                None => left,
                Some(index) => {
                    let value = record
                        .get(*index)
                        .and_then(|field| field.trim().parse::<f64>().ok())
                        .unwrap_or(0.0);
                    if value <= node.threshold { left } else { right }
                }
            };
        }
        let class = node.value.first().map_or(BENIGN_CLASS, |row| argmax(row));
        (class, class_label(class))
    }
}

fn argmax(row: &[f64]) -> usize {
    let mut best = BENIGN_CLASS;
    let mut best_probability = 0.0;
    for (index, probability) in row.iter().copied().enumerate() {
        if probability > best_probability {
            best_probability = probability;
            best = index;
        }
    }
    best
}

/// Source of decision-tree models.
pub trait TreeSource: Send + Sync {
    /// Load and validate the current model.
    ///
    /// # Errors
    ///
    /// Returns an error when the model cannot be read, decoded, or validated.
    fn load(&self) -> ClassifierResult<DecisionTreeNode>;
}

/// Loads the model from a JSON file on every call.
#[derive(Debug, Clone)]
pub struct FileTreeSource {
    path: PathBuf,
}

impl FileTreeSource {
    /// Read the model from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Model location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TreeSource for FileTreeSource {
    fn load(&self) -> ClassifierResult<DecisionTreeNode> {
        let bytes = std::fs::read(&self.path)
            .map_err(|source| ClassifierError::io("read_decision_tree", &self.path, source))?;
        let tree: DecisionTreeNode =
            serde_json::from_slice(&bytes).map_err(|source| ClassifierError::TreeDecode {
                path: self.path.clone(),
                source,
            })?;
        tree.validate()?;
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracewarden_test_support::fixtures::{leaf, sample_tree, split, write_tree};

    fn header(columns: &str) -> HashMap<String, usize> {
        columns
            .split(',')
            .enumerate()
            .map(|(index, name)| (name.to_string(), index))
            .collect()
    }

    fn decode(value: serde_json::Value) -> anyhow::Result<DecisionTreeNode> {
        let tree: DecisionTreeNode = serde_json::from_value(value)?;
        tree.validate()?;
        Ok(tree)
    }

    #[test]
    fn single_split_routes_by_threshold() -> anyhow::Result<()> {
        let tree = decode(sample_tree())?;
        let columns = header("src_ip,dst_ip,bytes,threshold_feat");
        assert_eq!(
            tree.classify(&["a", "b", "1", "10"], &columns),
            (1, "Intra_UPF_UE_DoS")
        );
        assert_eq!(tree.classify(&["a", "b", "1", "1"], &columns), (0, "BENIGN"));
        assert_eq!(tree.classify(&["a", "b", "1", "5"], &columns), (0, "BENIGN"));
        Ok(())
    }

    #[test]
    fn missing_feature_goes_left_and_bad_values_read_as_zero() -> anyhow::Result<()> {
        let tree = decode(sample_tree())?;
        assert_eq!(tree.classify(&["10"], &header("other")).0, 0);

        let columns = header("threshold_feat,extra");
        assert_eq!(tree.classify(&["not-a-number"], &columns).0, 0);
        assert_eq!(tree.classify(&[], &columns).0, 0);

        let negative = decode(split("threshold_feat", -1.0, leaf(&[1.0]), leaf(&[0.0, 1.0])))?;
        assert_eq!(negative.classify(&["garbage"], &columns).0, 1);
        Ok(())
    }

    #[test]
    fn ties_and_unmapped_indices() -> anyhow::Result<()> {
        let columns = header("x");
        let tie = decode(leaf(&[0.2, 0.4, 0.4]))?;
        assert_eq!(tie.classify(&["0"], &columns), (1, "Intra_UPF_UE_DoS"));

        let all_zero = decode(leaf(&[0.0, 0.0]))?;
        assert_eq!(all_zero.classify(&["0"], &columns), (0, "BENIGN"));

        let unmapped = decode(leaf(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]))?;
        assert_eq!(unmapped.classify(&["0"], &columns), (6, UNKNOWN_LABEL));

        assert_eq!(class_label(3), class_label(4));
        Ok(())
    }

    #[test]
    fn validation_rejects_broken_shapes() {
        let one_child = serde_json::json!({
            "feature": "x",
            "threshold": 1.0,
            "children": [leaf(&[1.0])],
            "value": [],
        });
        let tree: Result<DecisionTreeNode, _> = serde_json::from_value(one_child);
        assert!(matches!(
            tree.map(|t| t.validate()),
            Ok(Err(ClassifierError::MalformedTree {
                reason: "internal_node_without_two_children",
                depth: 0
            }))
        ));

        let empty_leaf = split("x", 1.0, leaf(&[]), leaf(&[1.0]));
        assert!(matches!(
            decode(empty_leaf).err().and_then(|err| err.downcast::<ClassifierError>().ok()),
            Some(ClassifierError::MalformedTree { depth: 1, .. })
        ));
    }

    #[test]
    fn file_source_reports_decode_and_io_errors() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = FileTreeSource::new(dir.path().join("absent.json"));
        assert!(matches!(missing.load(), Err(ClassifierError::Io { .. })));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, b"{not json")?;
        assert!(matches!(
            FileTreeSource::new(&garbage).load(),
            Err(ClassifierError::TreeDecode { .. })
        ));

        let good = write_tree(&dir.path().join("utils/decision_tree.json"), &sample_tree())?;
        let source = FileTreeSource::new(good);
        assert_eq!(source.load()?.children.len(), 2);
        Ok(())
    }
}
