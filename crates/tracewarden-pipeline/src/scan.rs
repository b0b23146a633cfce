//! Flat directory scans shared by the collector and the output monitor.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{PipelineError, PipelineResult};

/// Regular files directly under `dir` whose name ends with `suffix`, sorted.
///
/// A missing directory yields an empty list.
pub(crate) fn files_with_suffix(
    operation: &'static str,
    dir: &Path,
    suffix: &str,
) -> PipelineResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|source| PipelineError::Walkdir {
            operation,
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file()
            && entry.file_name().to_string_lossy().ends_with(suffix)
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Run [`files_with_suffix`] on the blocking pool.
pub(crate) async fn files_with_suffix_async(
    operation: &'static str,
    dir: &Path,
    suffix: &str,
) -> PipelineResult<Vec<PathBuf>> {
    let dir = dir.to_path_buf();
    let suffix = suffix.to_string();
    tokio::task::spawn_blocking(move || files_with_suffix(operation, &dir, &suffix))
        .await
        .map_err(|err| PipelineError::Task {
            operation,
            detail: err.to_string(),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_matching_files_only_at_top_level() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("b.pcap"), b"")?;
        std::fs::write(dir.path().join("a.pcap"), b"")?;
        std::fs::write(dir.path().join("notes.txt"), b"")?;
        std::fs::create_dir_all(dir.path().join("nested"))?;
        std::fs::write(dir.path().join("nested").join("c.pcap"), b"")?;

        let files = files_with_suffix("test_scan", dir.path(), ".pcap")?;
        assert_eq!(
            files,
            vec![dir.path().join("a.pcap"), dir.path().join("b.pcap")]
        );
        Ok(())
    }

    #[test]
    fn missing_directory_is_empty() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(files_with_suffix("test_scan", &dir.path().join("absent"), ".csv")?.is_empty());
        Ok(())
    }
}
