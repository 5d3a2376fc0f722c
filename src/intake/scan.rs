use glob::{glob, Pattern};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::error::{PipelineError, Result};

/// Lists the raw extracts directly inside `raw_dir` with the given extension.
///
/// Subdirectories are not searched. Spreadsheet owner files (`~$name.xlsx`)
/// left behind by an open editor are ignored. The result is sorted by path.
#[tracing::instrument(level = "debug", skip(raw_dir), fields(dir = %raw_dir.display()))]
pub fn scan_raw_dir(raw_dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !raw_dir.is_dir() {
        error!(dir = %raw_dir.display(), "raw directory does not exist");
        return Err(PipelineError::RawDirectoryMissing {
            path: raw_dir.to_path_buf(),
        });
    }

    let pattern = format!(
        "{}/*.{}",
        Pattern::escape(&raw_dir.to_string_lossy()),
        Pattern::escape(extension)
    );
    let entries = glob(&pattern).map_err(|e| {
        PipelineError::Config(format!("invalid raw file pattern `{}`: {}", pattern, e))
    })?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                debug!("cannot read glob entry: {}", e);
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let is_owner_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with("~$"));
        if is_owner_file {
            debug!(file = %path.display(), "skipping editor owner file");
            continue;
        }
        files.push(path);
    }
    files.sort();

    if files.is_empty() {
        error!(dir = %raw_dir.display(), "no data files found");
        return Err(PipelineError::NoRawFiles {
            path: raw_dir.to_path_buf(),
            extension: extension.to_string(),
        });
    }

    info!("{} data files present in {}", files.len(), raw_dir.display());
    Ok(files)
}
