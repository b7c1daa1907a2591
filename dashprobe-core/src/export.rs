//! Merge per-tab CSV exports into a single multi-sheet spreadsheet.

use crate::error::{Error, Result};
use anyhow::Context;
use rust_xlsxwriter::Workbook;
use std::path::{Path, PathBuf};

/// XLSX limit on worksheet names.
const MAX_SHEET_NAME: usize = 31;

fn truncate_sheet_name(stem: &str) -> String {
    stem.chars().take(MAX_SHEET_NAME).collect()
}

/// Merge every `*.csv` in `dir` into one workbook at `dest`, one sheet per
/// file, named after the file stem.
///
/// The workbook is written to a temporary sibling path and atomically
/// renamed over `dest`, so a partially-written output is never visible
/// under the final name. Fails with [`Error::NoExportsFound`] when the
/// directory holds no CSV files.
pub fn merge_exports(dir: &Path, dest: &Path) -> Result<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading export dir {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(Error::NoExportsFound(dir.to_path_buf()));
    }

    let mut workbook = Workbook::new();
    for path in &files {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sheet".to_string());
        let sheet_name = truncate_sheet_name(&stem);

        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(&sheet_name)
            .map_err(|e| anyhow::anyhow!("invalid sheet name '{sheet_name}': {e}"))?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("reading {}", path.display()))?;

        for (row, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("parsing {}", path.display()))?;
            for (col, field) in record.iter().enumerate() {
                worksheet
                    .write_string(row as u32, col as u16, field)
                    .map_err(|e| anyhow::anyhow!("writing cell: {e}"))?;
            }
        }
        tracing::debug!(file = %path.display(), sheet = %sheet_name, "added sheet");
    }

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = dest.with_extension("xlsx.tmp");
    workbook
        .save(&tmp)
        .map_err(|e| anyhow::anyhow!("writing workbook {}: {e}", tmp.display()))?;
    std::fs::rename(&tmp, dest)?;

    tracing::info!(dest = %dest.display(), sheets = files.len(), "merged exports");
    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_name_is_truncated_to_limit() {
        let long = "a".repeat(40);
        assert_eq!(truncate_sheet_name(&long).len(), MAX_SHEET_NAME);
        assert_eq!(truncate_sheet_name("Receita Mensal"), "Receita Mensal");
    }
}
