use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Dataset, FactRow};

/// Reads consolidated fact rows from JSON-lines files (`*.jsonl`).
///
/// Files are read in sorted path order, rows in file order, so the resulting
/// Dataset order is reproducible. Blank lines are skipped.
#[derive(Debug, Default)]
pub struct DataLoader {
    limit: Option<usize>,
}

impl DataLoader {
    pub fn new() -> Self { Self::default() }

    /// Stop after `limit` rows.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self { self.limit = Some(limit); self }

    pub fn load_directory(&self, data_dir: &Path) -> Result<Dataset> {
        if !data_dir.exists() {
            return Err(Error::NotFound(format!("input directory {}", data_dir.display())));
        }
        let files = list_jsonl_files(data_dir);
        if files.is_empty() {
            info!(dir = %data_dir.display(), "no .jsonl files found");
            return Ok(Dataset::default());
        }
        let mut rows = Vec::new();
        for (file_index, file_path) in files.iter().enumerate() {
            debug!(file = %file_path.display(), "reading {}/{}", file_index + 1, files.len());
            if self.read_file(file_path, &mut rows)? { break; }
        }
        info!(files = files.len(), rows = rows.len(), "loaded fact rows");
        Ok(Dataset::new(rows))
    }

    pub fn load_file(&self, path: &Path) -> Result<Dataset> {
        let mut rows = Vec::new();
        self.read_file(path, &mut rows)?;
        Ok(Dataset::new(rows))
    }

    /// Appends rows from one file; returns true once the limit is reached.
    fn read_file(&self, path: &Path, rows: &mut Vec<FactRow>) -> Result<bool> {
        let content = fs::read_to_string(path)?;
        for (line_no, line) in content.lines().enumerate() {
            if self.limit.is_some_and(|l| rows.len() >= l) { return Ok(true); }
            let line = line.trim();
            if line.is_empty() { continue; }
            let row: FactRow = serde_json::from_str(line).map_err(|e| Error::InvalidInput {
                path: path.display().to_string(),
                line: line_no + 1,
                message: e.to_string(),
            })?;
            if row.id.is_empty() {
                return Err(Error::InvalidInput {
                    path: path.display().to_string(),
                    line: line_no + 1,
                    message: "id must not be empty".into(),
                });
            }
            rows.push(row);
        }
        Ok(self.limit.is_some_and(|l| rows.len() >= l))
    }
}

fn list_jsonl_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("jsonl"))
        .collect();
    files.sort();
    files
}
