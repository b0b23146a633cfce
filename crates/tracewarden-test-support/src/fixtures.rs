//! Decision-tree and flow CSV fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Value, json};

/// Header used by the single-split example tree.
pub const SAMPLE_HEADER: &str = "src_ip,dst_ip,bytes,threshold_feat";

/// Leaf node JSON carrying one probability row.
#[must_use]
pub fn leaf(probabilities: &[f64]) -> Value {
    json!({
        "feature": "leaf",
        "threshold": 0.0,
        "children": [],
        "value": [probabilities],
    })
}

/// Internal node JSON splitting on `feature <= threshold`.
#[must_use]
pub fn split(feature: &str, threshold: f64, left: Value, right: Value) -> Value {
    json!({
        "feature": feature,
        "threshold": threshold,
        "children": [left, right],
        "value": [],
    })
}

/// Root splits `threshold_feat <= 5.0`; left is benign, right is class 1.
#[must_use]
pub fn sample_tree() -> Value {
    split(
        "threshold_feat",
        5.0,
        leaf(&[0.9, 0.1]),
        leaf(&[0.1, 0.9]),
    )
}

/// Serialize `tree` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error when the directory or file cannot be written.
pub fn write_tree(path: &Path, tree: &Value) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let body = serde_json::to_vec_pretty(tree).context("failed to encode tree")?;
    fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// Write a flow CSV made of `header` followed by `rows`, one per line.
///
/// # Errors
///
/// Returns an error when the directory or file cannot be written.
pub fn write_flow_csv(dir: &Path, name: &str, header: &str, rows: &[&str]) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut body = String::from(header);
    body.push('\n');
    for row in rows {
        body.push_str(row);
        body.push('\n');
    }
    let path = dir.join(name);
    fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Two-row flow file matching [`sample_tree`]: one benign row, one attack row.
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn write_sample_flows(dir: &Path, name: &str) -> Result<PathBuf> {
    write_flow_csv(
        dir,
        name,
        SAMPLE_HEADER,
        &["10.0.0.1,10.0.0.2,100,10", "10.0.0.3,10.0.0.4,200,1"],
    )
}
