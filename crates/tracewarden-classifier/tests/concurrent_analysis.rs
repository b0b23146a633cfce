use std::sync::Arc;
use std::thread;

use tracewarden_classifier::{
    AnalysisOutcome, AnalyzedFileCache, DetectionLog, FileTreeSource, FlowAnalyzer,
};
use tracewarden_test_support::fixtures::{sample_tree, write_sample_flows, write_tree};
use tracewarden_test_support::workspace::PipelineWorkspace;

const FILES: usize = 16;

#[test]
fn concurrent_analyses_write_one_line_each() -> anyhow::Result<()> {
    let workspace = PipelineWorkspace::new()?;
    write_tree(&workspace.model_path(), &sample_tree())?;
    let analyzer = FlowAnalyzer::new(
        Arc::new(FileTreeSource::new(workspace.model_path())),
        AnalyzedFileCache::new(),
        DetectionLog::new(workspace.detection_log_path()),
        30.0,
    );

    let mut paths = Vec::with_capacity(FILES);
    for index in 0..FILES {
        paths.push(write_sample_flows(
            &workspace.flow_dir(),
            &format!("capture_{index}.pcap_Flow.csv"),
        )?);
    }

    let handles: Vec<_> = paths
        .iter()
        .cloned()
        .chain(paths.iter().cloned())
        .map(|path| {
            let analyzer = analyzer.clone();
            thread::spawn(move || analyzer.analyze(&path))
        })
        .collect();

    let mut fresh = 0;
    for handle in handles {
        let outcome = handle
            .join()
            .map_err(|_| anyhow::anyhow!("analysis thread panicked"))??;
        if matches!(outcome, AnalysisOutcome::Analyzed(_)) {
            fresh += 1;
        }
    }
    assert_eq!(fresh, FILES);

    let lines = workspace.detection_log_lines()?;
    assert_eq!(lines.len(), FILES);
    for line in &lines {
        let fields: Vec<&str> = line.splitn(6, ',').collect();
        assert_eq!(fields.len(), 6, "malformed line: {line}");
        assert_eq!(fields[2], "2");
        assert_eq!(fields[3], "1");
        assert_eq!(fields[4], "50.00");
    }
    assert_eq!(analyzer.cache().len(), FILES);
    Ok(())
}
