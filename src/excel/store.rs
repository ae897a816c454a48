//! Workbook store - load, persist and reload master workbooks
//!
//! The store is the only component that touches spreadsheet files. Formulas
//! that depend on freshly written cells are recomputed while persisting (on
//! a copy, never on the caller's workbook), so their values only become
//! visible after `persist` followed by `reload`. Every other formula keeps
//! the result cached in the file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::excel::exporter::WorkbookExporter;
use crate::excel::importer::WorkbookImporter;
use crate::excel::recalc::Recalculator;
use crate::excel::workbook::Workbook;

/// Where a workbook is loaded from
#[derive(Debug, Clone, Copy)]
pub enum WorkbookSource<'a> {
    Path(&'a Path),
    Buffer(&'a [u8]),
}

#[derive(Debug, Clone)]
pub struct WorkbookStore {
    recalculate: bool,
}

impl Default for WorkbookStore {
    fn default() -> Self {
        Self { recalculate: true }
    }
}

impl WorkbookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that persists formula cells with whatever value they already hold
    pub fn without_recalculation() -> Self {
        Self { recalculate: false }
    }

    pub fn load(&self, source: WorkbookSource<'_>) -> EngineResult<Workbook> {
        match source {
            WorkbookSource::Path(path) => {
                if !path.is_file() {
                    return Err(EngineError::WorkbookLoad {
                        path: path.to_path_buf(),
                        reason: "file not found".to_string(),
                    });
                }
                WorkbookImporter::new(path).import()
            }
            WorkbookSource::Buffer(bytes) => WorkbookImporter::import_buffer(bytes),
        }
    }

    pub fn load_path(&self, path: &Path) -> EngineResult<Workbook> {
        self.load(WorkbookSource::Path(path))
    }

    pub fn load_buffer(&self, bytes: &[u8]) -> EngineResult<Workbook> {
        self.load(WorkbookSource::Buffer(bytes))
    }

    /// Write the whole workbook to `path` as xlsx
    ///
    /// Bytes go to a sibling temp file first and are renamed over the
    /// target, so a failed write leaves the previous file intact.
    pub fn persist(&self, workbook: &Workbook, path: &Path) -> EngineResult<()> {
        let mut snapshot = workbook.clone();
        if self.recalculate {
            let report = Recalculator::new().recalculate(&mut snapshot);
            debug!(
                evaluated = report.evaluated,
                kept_cached = report.kept_cached,
                cyclic = report.cyclic,
                untouched = report.untouched,
                "recalculated workbook formulas"
            );
        }

        let bytes = WorkbookExporter::new(&snapshot)
            .to_buffer()
            .map_err(|e| write_error(path, e))?;

        let tmp = temp_sibling(path);
        if let Err(e) = fs::write(&tmp, &bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(write_error(path, e));
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(write_error(path, e));
        }

        info!(path = %path.display(), bytes = bytes.len(), "persisted workbook");
        Ok(())
    }

    /// Load a persisted workbook again to observe recalculated values
    pub fn reload(&self, path: &Path) -> EngineResult<Workbook> {
        self.load_path(path)
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook.xlsx".to_string());
    path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()))
}

fn write_error(path: &Path, e: impl std::fmt::Display) -> EngineError {
    EngineError::WorkbookWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::workbook::{CellValue, Workbook};
    use tempfile::TempDir;

    fn sample_workbook() -> Workbook {
        let mut wb = Workbook::new();
        let sheet = wb.add_sheet("CALCULO AFORO");
        sheet.set_number("C10", 90.0).unwrap();
        sheet.set_number("C19", 180.0).unwrap();
        sheet.set_formula("B47", "=C10+C19").unwrap();
        sheet.set_text("B5", "AULAS").unwrap();
        wb.add_sheet("CONSOLIDADO").set_number("D64", 2.0).unwrap();
        wb
    }

    #[test]
    fn test_persist_and_reload_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MATRIZ.xlsx");
        let store = WorkbookStore::new();

        store.persist(&sample_workbook(), &path).unwrap();
        let reloaded = store.reload(&path).unwrap();

        assert_eq!(reloaded.sheet_names(), vec!["CALCULO AFORO", "CONSOLIDADO"]);
        let sheet = reloaded.sheet("CALCULO AFORO").unwrap();
        assert_eq!(sheet.number("C10").unwrap(), 90.0);
        assert_eq!(
            sheet.cell("B5").unwrap().unwrap().value,
            CellValue::Text("AULAS".to_string())
        );
        assert_eq!(reloaded.sheet("CONSOLIDADO").unwrap().number("D64").unwrap(), 2.0);
    }

    #[test]
    fn test_formula_result_visible_only_after_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MATRIZ.xlsx");
        let store = WorkbookStore::new();
        let workbook = sample_workbook();

        // In memory the formula has no value yet
        assert_eq!(workbook.sheet("CALCULO AFORO").unwrap().number_opt("B47").unwrap(), None);

        store.persist(&workbook, &path).unwrap();
        assert_eq!(workbook.sheet("CALCULO AFORO").unwrap().number_opt("B47").unwrap(), None);

        let reloaded = store.reload(&path).unwrap();
        let cell = reloaded.sheet("CALCULO AFORO").unwrap().cell("B47").unwrap().unwrap();
        assert_eq!(cell.value, CellValue::Number(270.0));
        assert_eq!(cell.formula.as_deref(), Some("C10+C19"));
    }

    #[test]
    fn test_persist_without_recalculation_keeps_cached_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MATRIZ.xlsx");
        let store = WorkbookStore::without_recalculation();

        store.persist(&sample_workbook(), &path).unwrap();
        let reloaded = store.reload(&path).unwrap();
        let cell = reloaded.sheet("CALCULO AFORO").unwrap().cell("B47").unwrap().unwrap();
        assert!(cell.is_formula());
        assert_ne!(cell.value, CellValue::Number(270.0));
    }

    #[test]
    fn test_load_from_buffer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upload.xlsx");
        let store = WorkbookStore::new();
        store.persist(&sample_workbook(), &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let workbook = store.load_buffer(&bytes).unwrap();
        assert_eq!(workbook.first_sheet().unwrap().name(), "CALCULO AFORO");
    }

    #[test]
    fn test_load_missing_path() {
        let store = WorkbookStore::new();
        let err = store.load_path(Path::new("/nonexistent/master.xlsx")).unwrap_err();
        assert!(matches!(err, EngineError::WorkbookLoad { .. }));
    }

    #[test]
    fn test_persist_into_missing_directory_fails() {
        let store = WorkbookStore::new();
        let err = store
            .persist(&sample_workbook(), Path::new("/nonexistent/dir/master.xlsx"))
            .unwrap_err();
        assert!(matches!(err, EngineError::WorkbookWrite { .. }));
    }

    #[test]
    fn test_persist_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MATRIZ.xlsx");
        WorkbookStore::new().persist(&sample_workbook(), &path).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
