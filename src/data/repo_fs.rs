//! Filesystem access to a directory of patient record files.

use std::fs;
use std::path::{Path, PathBuf};

use crate::common::error::{EvalError, EvalResult};
use crate::common::json;

use super::domain::RawRecord;

/// Directory of `*.json` patient records.
#[derive(Clone, Debug)]
pub struct RecordDir {
    root: PathBuf,
}

impl RecordDir {
    /// Open a record directory; a missing or non-directory path is fatal for the invocation.
    pub fn open(root: impl AsRef<Path>) -> EvalResult<Self> {
        let root = root.as_ref().to_path_buf();
        let meta = fs::metadata(&root).map_err(|source| EvalError::DirectoryUnavailable {
            path: root.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(EvalError::DirectoryUnavailable {
                path: root.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "not a directory"),
            });
        }
        Ok(Self { root })
    }

    /// All JSON files directly inside the directory, sorted lexicographically.
    pub fn json_files(&self) -> EvalResult<Vec<PathBuf>> {
        let unavailable = |source: std::io::Error| EvalError::DirectoryUnavailable {
            path: self.root.clone(),
            source,
        };
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(unavailable)? {
            let path = entry.map_err(unavailable)?.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Load one record file.
pub fn load_record(path: &Path) -> EvalResult<RawRecord> {
    json::load(path)
}

/// Identifier used for a file in reports: its file name.
pub fn identifier_for(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
