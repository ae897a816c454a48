//! Spreadsheet access for the engine
//!
//! This module provides the workbook round-trip used by every calculation:
//! - Import: spreadsheet file/buffer → in-memory `Workbook` (calamine)
//! - Recalculation: formulas downstream of edited cells re-evaluated (f64) before writing
//! - Export: `Workbook` → .xlsx (rust_xlsxwriter)

pub mod cell_ref;
mod exporter;
pub mod formula;
mod importer;
mod recalc;
mod store;
mod workbook;

pub use cell_ref::{CellCoordinate, CellRef};
pub use exporter::WorkbookExporter;
pub use importer::WorkbookImporter;
pub use recalc::{RecalcReport, Recalculator};
pub use store::{WorkbookSource, WorkbookStore};
pub use workbook::{Cell, CellValue, Sheet, Workbook};
