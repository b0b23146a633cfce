//! Per-file flow analysis.
//!
//! # Design
//! - A path is claimed in [`AnalyzedFileCache`] before any work starts; a second
//!   call for the same path is a no-op even when the first one failed.
//! - Analysis is synchronous; async callers run it on the blocking pool.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::error::{ClassifierError, ClassifierResult};
use crate::log::{DetectionLog, DetectionRecord};
use crate::tree::{BENIGN_CLASS, TreeSource};

/// Process-lifetime record of flow files that have been claimed for analysis.
#[derive(Debug, Clone, Default)]
pub struct AnalyzedFileCache {
    inner: Arc<Mutex<HashSet<PathBuf>>>,
}

impl AnalyzedFileCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path`; returns `false` when it was already claimed.
    ///
    /// Relative paths are keyed by their absolute form, so both spellings share one entry.
    pub fn try_claim(&self, path: &Path) -> bool {
        self.lock().insert(Self::key(path))
    }

    /// Whether `path` has been claimed.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains(&Self::key(path))
    }

    /// Number of claimed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been claimed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn key(path: &Path) -> PathBuf {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("analyzed file cache lock poisoned; continuing");
                poisoned.into_inner()
            }
        }
    }
}

/// Statistics produced by one analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSummary {
    /// Basename of the analyzed flow file.
    pub file: String,
    /// Rows classified.
    pub total_flows: u64,
    /// Rows classified as a non-benign class.
    pub attack_flows: u64,
    /// Share of attack rows in percent.
    pub attack_percentage: f64,
    /// Per-label attack counts.
    pub attack_types: BTreeMap<String, u64>,
    /// Whether the share exceeded the alert threshold.
    pub alert: bool,
}

/// Result of an analysis request.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// The path had already been claimed; nothing was done.
    AlreadyAnalyzed,
    /// The file was classified and logged.
    Analyzed(AnalysisSummary),
}

/// Classifies flow CSV files and records the result in the detection log.
#[derive(Clone)]
pub struct FlowAnalyzer {
    trees: Arc<dyn TreeSource>,
    cache: AnalyzedFileCache,
    log: DetectionLog,
    alert_threshold_pct: f64,
}

impl FlowAnalyzer {
    /// Build an analyzer over a model source, a shared cache, and a detection log.
    #[must_use]
    pub fn new(
        trees: Arc<dyn TreeSource>,
        cache: AnalyzedFileCache,
        log: DetectionLog,
        alert_threshold_pct: f64,
    ) -> Self {
        Self {
            trees,
            cache,
            log,
            alert_threshold_pct,
        }
    }

    /// Cache shared with other analyzers.
    #[must_use]
    pub const fn cache(&self) -> &AnalyzedFileCache {
        &self.cache
    }

    /// Analyze `path` once per process lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error when the model cannot be loaded, the file cannot be
    /// read or has no header, or the detection log cannot be written.
    pub fn analyze(&self, path: &Path) -> ClassifierResult<AnalysisOutcome> {
        if !self.cache.try_claim(path) {
            debug!(path = %path.display(), "flow file already analyzed");
            return Ok(AnalysisOutcome::AlreadyAnalyzed);
        }
        info!(path = %path.display(), "analyzing flow file");

        let tree = self.trees.load()?;
        let bytes =
            std::fs::read(path).map_err(|source| ClassifierError::io("read_flow_file", path, source))?;
        let body = String::from_utf8_lossy(&bytes);
        let mut lines = body.lines();
        let header_line = lines
            .next()
            .filter(|line| !line.trim().is_empty())
            .ok_or_else(|| ClassifierError::MissingHeader {
                path: path.to_path_buf(),
            })?;
        let header: HashMap<String, usize> = header_line
            .split(',')
            .enumerate()
            .map(|(index, name)| (name.trim().to_string(), index))
            .collect();

        let mut total_flows = 0_u64;
        let mut attack_flows = 0_u64;
        let mut attack_types: BTreeMap<String, u64> = BTreeMap::new();
        for line in lines.filter(|line| !line.trim().is_empty()) {
            total_flows += 1;
            let record: Vec<&str> = line.split(',').collect();
            let (class, label) = tree.classify(&record, &header);
            if class != BENIGN_CLASS {
                attack_flows += 1;
                *attack_types.entry(label.to_string()).or_default() += 1;
            }
        }

        let attack_percentage = percentage(attack_flows, total_flows);
        let file = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());

        info!(
            file = %file,
            total_flows,
            attack_flows,
            attack_percentage = format_args!("{attack_percentage:.2}"),
            "flow file analyzed"
        );
        for (label, count) in &attack_types {
            info!(
                file = %file,
                attack_type = %label,
                count,
                share = format_args!("{:.2}", percentage(*count, total_flows)),
                "attack type detected"
            );
        }

        self.log.append(&DetectionRecord {
            timestamp: Local::now(),
            file: file.clone(),
            total_flows,
            attack_flows,
            attack_percentage,
            attack_types: attack_types.clone(),
        })?;

        let alert = attack_percentage > self.alert_threshold_pct;
        if alert {
            warn!(
                alert = true,
                file = %file,
                attack_percentage = format_args!("{attack_percentage:.2}"),
                threshold_pct = self.alert_threshold_pct,
                "HIGH ATTACK PERCENTAGE DETECTED"
            );
        }

        Ok(AnalysisOutcome::Analyzed(AnalysisSummary {
            file,
            total_flows,
            attack_flows,
            attack_percentage,
            attack_types,
            alert,
        }))
    }
}

#[allow(clippy::cast_precision_loss)]
fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{DecisionTreeNode, FileTreeSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracewarden_test_support::fixtures::{
        SAMPLE_HEADER, sample_tree, write_flow_csv, write_sample_flows,
    };

    struct CountingSource {
        tree: DecisionTreeNode,
        loads: AtomicUsize,
    }

    impl TreeSource for CountingSource {
        fn load(&self) -> ClassifierResult<DecisionTreeNode> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.tree.clone())
        }
    }

    fn counting_source() -> anyhow::Result<Arc<CountingSource>> {
        Ok(Arc::new(CountingSource {
            tree: serde_json::from_value(sample_tree())?,
            loads: AtomicUsize::new(0),
        }))
    }

    #[test]
    fn sample_file_yields_half_attack() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let flows = write_sample_flows(dir.path(), "sample_Flow.csv")?;
        let log = DetectionLog::new(dir.path().join("logs/attack_detection.log"));
        let analyzer = FlowAnalyzer::new(counting_source()?, AnalyzedFileCache::new(), log.clone(), 30.0);

        let AnalysisOutcome::Analyzed(summary) = analyzer.analyze(&flows)? else {
            anyhow::bail!("expected a fresh analysis");
        };
        assert_eq!(summary.total_flows, 2);
        assert_eq!(summary.attack_flows, 1);
        assert!((summary.attack_percentage - 50.0).abs() < f64::EPSILON);
        assert!(summary.alert);
        assert_eq!(summary.attack_types.get("Intra_UPF_UE_DoS"), Some(&1));

        let body = std::fs::read_to_string(log.path())?;
        assert!(body.contains(",sample_Flow.csv,2,1,50.00,Intra_UPF_UE_DoS:1"));
        Ok(())
    }

    #[test]
    fn second_analysis_of_same_path_skips_model_load() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let flows = write_sample_flows(dir.path(), "once_Flow.csv")?;
        let source = counting_source()?;
        let analyzer = FlowAnalyzer::new(
            source.clone(),
            AnalyzedFileCache::new(),
            DetectionLog::new(dir.path().join("log")),
            30.0,
        );

        assert!(matches!(analyzer.analyze(&flows)?, AnalysisOutcome::Analyzed(_)));
        assert_eq!(analyzer.analyze(&flows)?, AnalysisOutcome::AlreadyAnalyzed);
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_to_string(dir.path().join("log"))?.lines().count(), 1);
        Ok(())
    }

    #[test]
    fn header_only_file_reports_zero_without_alert() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let flows = write_flow_csv(dir.path(), "empty_Flow.csv", SAMPLE_HEADER, &["", "  "])?;
        let log = DetectionLog::new(dir.path().join("detections.log"));
        let analyzer = FlowAnalyzer::new(counting_source()?, AnalyzedFileCache::new(), log.clone(), 30.0);

        let AnalysisOutcome::Analyzed(summary) = analyzer.analyze(&flows)? else {
            anyhow::bail!("expected a fresh analysis");
        };
        assert_eq!(summary.total_flows, 0);
        assert!(!summary.alert);
        assert!(std::fs::read_to_string(log.path())?.ends_with(",empty_Flow.csv,0,0,0.00,\n"));
        Ok(())
    }

    #[test]
    fn threshold_is_strict() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let flows = write_sample_flows(dir.path(), "edge_Flow.csv")?;
        let analyzer = FlowAnalyzer::new(
            counting_source()?,
            AnalyzedFileCache::new(),
            DetectionLog::new(dir.path().join("log")),
            50.0,
        );
        let AnalysisOutcome::Analyzed(summary) = analyzer.analyze(&flows)? else {
            anyhow::bail!("expected a fresh analysis");
        };
        assert!(!summary.alert);
        Ok(())
    }

    #[test]
    fn failures_abort_only_the_file_and_keep_the_claim() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let flows = write_sample_flows(dir.path(), "model_Flow.csv")?;
        let analyzer = FlowAnalyzer::new(
            Arc::new(FileTreeSource::new(dir.path().join("missing.json"))),
            AnalyzedFileCache::new(),
            DetectionLog::new(dir.path().join("log")),
            30.0,
        );
        assert!(matches!(analyzer.analyze(&flows), Err(ClassifierError::Io { .. })));
        assert!(analyzer.cache().contains(&flows));
        assert_eq!(analyzer.analyze(&flows)?, AnalysisOutcome::AlreadyAnalyzed);

        let empty = dir.path().join("blank_Flow.csv");
        std::fs::write(&empty, b"")?;
        let fresh = FlowAnalyzer::new(
            counting_source()?,
            AnalyzedFileCache::new(),
            DetectionLog::new(dir.path().join("log")),
            30.0,
        );
        assert!(matches!(
            fresh.analyze(&empty),
            Err(ClassifierError::MissingHeader { .. })
        ));
        Ok(())
    }

    #[test]
    fn percentage_handles_zero_total() {
        assert!(percentage(0, 0).abs() < f64::EPSILON);
        assert!((percentage(1, 3) - 33.333_333_333_333_33).abs() < 1e-9);
    }

    #[test]
    fn relative_and_absolute_spellings_share_one_claim() -> anyhow::Result<()> {
        let cache = AnalyzedFileCache::new();
        let relative = Path::new("flow_output/a_Flow.csv");
        assert!(cache.try_claim(relative));
        let absolute = std::env::current_dir()?.join(relative);
        assert!(cache.contains(&absolute));
        assert!(!cache.try_claim(&absolute));
        assert_eq!(cache.len(), 1);
        Ok(())
    }
}
