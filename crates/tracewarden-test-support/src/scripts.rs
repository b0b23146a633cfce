//! Executable shell scripts standing in for the external capture tools.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Write an executable `/bin/sh` script named `name` under `dir`.
///
/// # Errors
///
/// Returns an error when the script cannot be written or made executable.
pub fn write_script(dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n"))
        .with_context(|| format!("failed to write {}", path.display()))?;
    let mut permissions = fs::metadata(&path)?.permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions)
        .with_context(|| format!("failed to chmod {}", path.display()))?;
    Ok(path)
}

/// Strip tool stand-in: copies `-r <in>` to `-w <out>`.
///
/// # Errors
///
/// Returns an error when the script cannot be written.
pub fn copying_strip_tool(dir: &Path) -> Result<PathBuf> {
    write_script(dir, "strip.sh", r#"cp "$2" "$4""#)
}

/// Flow tool stand-in: writes `<input basename>_Flow.csv` into the output dir using `body`.
///
/// # Errors
///
/// Returns an error when the script cannot be written.
pub fn flow_tool_writing(dir: &Path, body: &str) -> Result<PathBuf> {
    let script = format!(
        "name=$(basename \"$1\")\nprintf '%s\\n' '{}' > \"$2/${{name}}_Flow.csv\"",
        body.replace('\'', "")
    );
    write_script(dir, "flow.sh", &script)
}

/// Tool stand-in that exits with status 1 without producing output.
///
/// # Errors
///
/// Returns an error when the script cannot be written.
pub fn failing_tool(dir: &Path, name: &str) -> Result<PathBuf> {
    write_script(dir, name, "exit 1")
}

/// Tool stand-in that sleeps past any reasonable test deadline.
///
/// # Errors
///
/// Returns an error when the script cannot be written.
pub fn hanging_tool(dir: &Path, name: &str) -> Result<PathBuf> {
    write_script(dir, name, "sleep 30")
}
