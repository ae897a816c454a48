//! Workbook exporter - in-memory `Workbook` → .xlsx bytes

use rust_xlsxwriter::{Formula, Workbook as XlsxWorkbook, XlsxError};

use crate::excel::workbook::{Cell, CellValue, Sheet, Workbook};

/// Serializes a `Workbook` as an xlsx container
///
/// Formula cells are written with their current value as the cached result,
/// so whatever the recalculation pass produced is what readers observe.
pub struct WorkbookExporter<'a> {
    workbook: &'a Workbook,
}

impl<'a> WorkbookExporter<'a> {
    pub fn new(workbook: &'a Workbook) -> Self {
        Self { workbook }
    }

    pub fn to_buffer(&self) -> Result<Vec<u8>, XlsxError> {
        let mut xlsx = XlsxWorkbook::new();

        for sheet in self.workbook.sheets() {
            self.export_sheet(&mut xlsx, sheet)?;
        }

        // xlsx requires at least one worksheet
        if self.workbook.sheets().is_empty() {
            xlsx.add_worksheet();
        }

        xlsx.save_to_buffer()
    }

    fn export_sheet(&self, xlsx: &mut XlsxWorkbook, sheet: &Sheet) -> Result<(), XlsxError> {
        let worksheet = xlsx.add_worksheet();
        worksheet.set_name(sheet.name())?;

        for (pos, cell) in sheet.cells() {
            let (row, col) = (pos.row, pos.col);
            match cell {
                Cell {
                    formula: Some(formula),
                    value,
                } => {
                    let mut excel_formula = Formula::new(format!("={}", formula));
                    if let Some(result) = cached_result(value) {
                        excel_formula = excel_formula.set_result(result);
                    }
                    worksheet.write_formula(row, col, excel_formula)?;
                }
                Cell {
                    formula: None,
                    value,
                } => match value {
                    CellValue::Number(n) => {
                        worksheet.write_number(row, col, *n)?;
                    }
                    CellValue::Text(s) => {
                        worksheet.write_string(row, col, s)?;
                    }
                    CellValue::Bool(b) => {
                        worksheet.write_boolean(row, col, *b)?;
                    }
                    CellValue::Empty => {}
                },
            }
        }

        Ok(())
    }
}

/// Cached formula result in the textual form xlsx stores it
fn cached_result(value: &CellValue) -> Option<String> {
    match value {
        CellValue::Empty => None,
        CellValue::Number(n) => Some(format_number(*n)),
        CellValue::Text(s) => Some(s.clone()),
        CellValue::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
    }
}

/// Shortest representation that parses back to the same f64
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(41.0), "41");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(1.2), "1.2");
        assert_eq!(format_number(0.1 + 0.2).parse::<f64>().unwrap(), 0.1 + 0.2);
    }

    #[test]
    fn test_cached_result() {
        assert_eq!(cached_result(&CellValue::Empty), None);
        assert_eq!(cached_result(&CellValue::Number(20.0)), Some("20".to_string()));
        assert_eq!(
            cached_result(&CellValue::Text("n/a".to_string())),
            Some("n/a".to_string())
        );
    }

    #[test]
    fn test_export_empty_workbook() {
        let workbook = Workbook::new();
        let bytes = WorkbookExporter::new(&workbook).to_buffer().unwrap();
        // xlsx is a zip container
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_export_rejects_invalid_sheet_name() {
        let mut workbook = Workbook::new();
        workbook.add_sheet("bad[name]");
        assert!(WorkbookExporter::new(&workbook).to_buffer().is_err());
    }
}
