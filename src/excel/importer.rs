//! Workbook importer - spreadsheet file/buffer → in-memory `Workbook`

use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::excel::cell_ref::{CellRef, MAX_COL};
use crate::excel::workbook::{Cell, CellValue, Workbook};

/// Label used in load errors for workbooks that came from a byte buffer
const BUFFER_ORIGIN: &str = "<uploaded buffer>";

/// Reads xlsx/xls/xlsb/ods containers into a `Workbook`
pub struct WorkbookImporter {
    origin: PathBuf,
}

impl WorkbookImporter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            origin: path.as_ref().to_path_buf(),
        }
    }

    /// Import the workbook at the importer's path
    pub fn import(&self) -> EngineResult<Workbook> {
        let sheets = open_workbook_auto(&self.origin).map_err(|e| self.load_error(e))?;
        self.read_sheets(sheets)
    }

    /// Import a workbook held in memory (e.g. an HTTP upload)
    pub fn import_buffer(bytes: &[u8]) -> EngineResult<Workbook> {
        let importer = Self::new(BUFFER_ORIGIN);
        let sheets = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| importer.load_error(e))?;
        importer.read_sheets(sheets)
    }

    fn read_sheets<RS: Read + Seek>(&self, mut sheets: Sheets<RS>) -> EngineResult<Workbook> {
        let mut workbook = Workbook::new();

        for sheet_name in sheets.sheet_names() {
            let values = sheets
                .worksheet_range(&sheet_name)
                .map_err(|e| self.load_error(e))?;
            // Not every container exposes formulas; values alone are still usable
            let formulas = sheets.worksheet_formula(&sheet_name).ok();

            let sheet = workbook.add_sheet(&sheet_name);
            let mut value_count = 0usize;
            let mut formula_count = 0usize;

            for (pos, data) in absolute_cells(&values) {
                let value = convert_data(data);
                if value.is_empty() {
                    continue;
                }
                sheet.insert(
                    pos,
                    Cell {
                        value,
                        formula: None,
                    },
                );
                value_count += 1;
            }

            if let Some(formulas) = formulas.as_ref() {
                for (pos, formula) in absolute_cells(formulas) {
                    let formula = formula.trim();
                    if formula.is_empty() {
                        continue;
                    }
                    let cached = sheet.value_at(pos);
                    sheet.insert(pos, Cell::formula(formula, cached));
                    formula_count += 1;
                }
            }

            debug!(
                sheet = %sheet_name,
                values = value_count,
                formulas = formula_count,
                "imported sheet"
            );
        }

        Ok(workbook)
    }

    fn load_error(&self, e: impl std::fmt::Display) -> EngineError {
        EngineError::WorkbookLoad {
            path: self.origin.clone(),
            reason: e.to_string(),
        }
    }
}

/// Iterate the non-default cells of a calamine range with absolute positions
fn absolute_cells<T>(range: &Range<T>) -> impl Iterator<Item = (CellRef, &T)>
where
    T: calamine::CellType,
{
    let (row0, col0) = range.start().unwrap_or((0, 0));
    range.used_cells().filter_map(move |(r, c, value)| {
        let col = col0 as usize + c;
        if col > MAX_COL as usize {
            return None;
        }
        Some((CellRef::new(row0 + r as u32, col as u16), value))
    })
}

/// Convert a calamine cell into a `CellValue`
fn convert_data(data: &Data) -> CellValue {
    match data {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
        Data::Empty => CellValue::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_data() {
        assert_eq!(convert_data(&Data::Int(4)), CellValue::Number(4.0));
        assert_eq!(convert_data(&Data::Float(1.5)), CellValue::Number(1.5));
        assert_eq!(
            convert_data(&Data::String("AULAS".to_string())),
            CellValue::Text("AULAS".to_string())
        );
        assert_eq!(convert_data(&Data::Bool(true)), CellValue::Bool(true));
        assert_eq!(convert_data(&Data::Empty), CellValue::Empty);
    }

    #[test]
    fn test_import_missing_file_is_load_error() {
        let result = WorkbookImporter::new("/nonexistent/MATRIZ.xlsx").import();
        assert!(matches!(result, Err(EngineError::WorkbookLoad { .. })));
    }

    #[test]
    fn test_import_garbage_buffer_is_load_error() {
        let result = WorkbookImporter::import_buffer(b"definitely not a zip container");
        match result {
            Err(EngineError::WorkbookLoad { path, .. }) => {
                assert_eq!(path, PathBuf::from(BUFFER_ORIGIN));
            }
            other => panic!("expected WorkbookLoad, got {:?}", other),
        }
    }
}
