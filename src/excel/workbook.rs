//! In-memory workbook model
//!
//! A `Workbook` is an ordered list of sparse sheets. Cells keep their last
//! known value and, for formula cells, the formula text (without the leading
//! `=`). The model never evaluates anything itself: values that depend on
//! formulas only change when the workbook goes through a persist/reload cycle.
//!
//! Sheets remember which cells were set since they were loaded; the
//! recalculation pass only re-evaluates formulas that depend on those cells.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{EngineError, EngineResult};
use crate::excel::cell_ref::CellRef;

/// A single cell value as read from (or written to) a spreadsheet
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl CellValue {
    /// Numeric view of the value; numeric text is accepted, everything else is `None`
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            CellValue::Bool(_) | CellValue::Empty => None,
        }
    }

    /// Text view of the value, `None` when empty
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Number(n) => Some(n.to_string()),
            CellValue::Text(s) if s.is_empty() => None,
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty) || matches!(self, CellValue::Text(s) if s.is_empty())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Empty => "empty",
            CellValue::Number(_) => "numeric",
            CellValue::Text(_) => "text",
            CellValue::Bool(_) => "boolean",
        }
    }
}

/// A cell: its (cached) value plus the formula that produces it, if any
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cell {
    pub value: CellValue,
    pub formula: Option<String>,
}

impl Cell {
    pub fn number(value: f64) -> Self {
        Self {
            value: CellValue::Number(value),
            formula: None,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: CellValue::Text(value.into()),
            formula: None,
        }
    }

    /// A formula cell with an optional cached value
    pub fn formula(formula: impl Into<String>, cached: CellValue) -> Self {
        let formula = formula.into();
        let formula = formula.strip_prefix('=').unwrap_or(&formula).to_string();
        Self {
            value: cached,
            formula: Some(formula),
        }
    }

    pub fn is_formula(&self) -> bool {
        self.formula.is_some()
    }
}

/// One worksheet
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    name: String,
    cells: BTreeMap<CellRef, Cell>,
    edited: BTreeSet<CellRef>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
            edited: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> impl Iterator<Item = (&CellRef, &Cell)> {
        self.cells.iter()
    }

    pub fn get(&self, pos: CellRef) -> Option<&Cell> {
        self.cells.get(&pos)
    }

    pub fn get_mut(&mut self, pos: CellRef) -> Option<&mut Cell> {
        self.cells.get_mut(&pos)
    }

    pub fn cell(&self, reference: &str) -> EngineResult<Option<&Cell>> {
        Ok(self.get(CellRef::parse(reference)?))
    }

    /// Store a cell as loaded from a file; the cell is not marked as edited
    pub fn insert(&mut self, pos: CellRef, cell: Cell) {
        self.cells.insert(pos, cell);
    }

    /// Replace a cell and mark it edited
    pub fn put(&mut self, pos: CellRef, cell: Cell) {
        self.cells.insert(pos, cell);
        self.edited.insert(pos);
    }

    pub fn mark_edited(&mut self, pos: CellRef) {
        self.edited.insert(pos);
    }

    /// Cells set through this sheet since it was created or loaded
    pub fn edited_cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        self.edited.iter().copied()
    }

    /// Overwrite the cell with a plain number, dropping any formula it held
    pub fn set_number_at(&mut self, pos: CellRef, value: f64) {
        self.put(pos, Cell::number(value));
    }

    pub fn set_number(&mut self, reference: &str, value: f64) -> EngineResult<()> {
        self.set_number_at(CellRef::parse(reference)?, value);
        Ok(())
    }

    pub fn set_text(&mut self, reference: &str, value: impl Into<String>) -> EngineResult<()> {
        self.put(CellRef::parse(reference)?, Cell::text(value));
        Ok(())
    }

    pub fn set_formula(&mut self, reference: &str, formula: impl Into<String>) -> EngineResult<()> {
        self.put(
            CellRef::parse(reference)?,
            Cell::formula(formula, CellValue::Empty),
        );
        Ok(())
    }

    pub fn number_opt_at(&self, pos: CellRef) -> Option<f64> {
        self.get(pos).and_then(|cell| cell.value.as_number())
    }

    /// Numeric value, 0 when the cell is absent, empty or not numeric
    pub fn number_at(&self, pos: CellRef) -> f64 {
        self.number_opt_at(pos).unwrap_or(0.0)
    }

    pub fn number_opt(&self, reference: &str) -> EngineResult<Option<f64>> {
        Ok(self.number_opt_at(CellRef::parse(reference)?))
    }

    pub fn number(&self, reference: &str) -> EngineResult<f64> {
        Ok(self.number_at(CellRef::parse(reference)?))
    }

    pub fn text_at(&self, pos: CellRef) -> Option<String> {
        self.get(pos).and_then(|cell| cell.value.as_text())
    }

    pub fn value_at(&self, pos: CellRef) -> CellValue {
        self.get(pos).map(|cell| cell.value.clone()).unwrap_or_default()
    }
}

/// An ordered collection of sheets
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sheet, or return the existing one with the same name
    pub fn add_sheet(&mut self, name: &str) -> &mut Sheet {
        let idx = match self.sheet_index(name) {
            Some(idx) => idx,
            None => {
                self.sheets.push(Sheet::new(name));
                self.sheets.len() - 1
            }
        };
        &mut self.sheets[idx]
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name == name)
    }

    pub fn sheet_by_index(&self, idx: usize) -> Option<&Sheet> {
        self.sheets.get(idx)
    }

    pub fn sheet_by_index_mut(&mut self, idx: usize) -> Option<&mut Sheet> {
        self.sheets.get_mut(idx)
    }

    pub fn first_sheet(&self) -> Option<&Sheet> {
        self.sheets.first()
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheet_index(name).is_some()
    }

    pub fn sheet(&self, name: &str) -> EngineResult<&Sheet> {
        match self.sheet_index(name) {
            Some(idx) => Ok(&self.sheets[idx]),
            None => Err(self.sheet_not_found(name)),
        }
    }

    pub fn sheet_mut(&mut self, name: &str) -> EngineResult<&mut Sheet> {
        match self.sheet_index(name) {
            Some(idx) => Ok(&mut self.sheets[idx]),
            None => Err(self.sheet_not_found(name)),
        }
    }

    fn sheet_not_found(&self, name: &str) -> EngineError {
        EngineError::SheetNotFound {
            name: name.to_string(),
            available_sheets: self.sheet_names(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_defaults_to_zero() {
        let sheet = Sheet::new("CALCULO AFORO");
        assert_eq!(sheet.number("B47").unwrap(), 0.0);
        assert_eq!(sheet.number_opt("B47").unwrap(), None);
    }

    #[test]
    fn test_text_cells_read_as_numbers_when_numeric() {
        let mut sheet = Sheet::new("S");
        sheet.set_text("A1", " 12.5 ").unwrap();
        sheet.set_text("A2", "AULAS").unwrap();
        assert_eq!(sheet.number("A1").unwrap(), 12.5);
        assert_eq!(sheet.number("A2").unwrap(), 0.0);
        assert_eq!(sheet.number_opt("A2").unwrap(), None);
    }

    #[test]
    fn test_set_number_overwrites_formula() {
        let mut sheet = Sheet::new("S");
        sheet.set_formula("D64", "=D4").unwrap();
        assert!(sheet.cell("D64").unwrap().unwrap().is_formula());

        sheet.set_number("D64", 3.0).unwrap();
        let cell = sheet.cell("D64").unwrap().unwrap();
        assert!(!cell.is_formula());
        assert_eq!(cell.value, CellValue::Number(3.0));
    }

    #[test]
    fn test_formula_strips_leading_equals() {
        let cell = Cell::formula("=SUM(A1:A3)", CellValue::Empty);
        assert_eq!(cell.formula.as_deref(), Some("SUM(A1:A3)"));
    }

    #[test]
    fn test_sheet_not_found_carries_names() {
        let mut wb = Workbook::new();
        wb.add_sheet("CONSOLIDADO");
        wb.add_sheet("CALCULO AFORO");

        match wb.sheet("COSTO INFRA") {
            Err(EngineError::SheetNotFound {
                name,
                available_sheets,
            }) => {
                assert_eq!(name, "COSTO INFRA");
                assert_eq!(available_sheets, vec!["CONSOLIDADO", "CALCULO AFORO"]);
            }
            other => panic!("expected SheetNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_add_sheet_is_idempotent() {
        let mut wb = Workbook::new();
        wb.add_sheet("A").set_number("A1", 1.0).unwrap();
        wb.add_sheet("A");
        assert_eq!(wb.sheets().len(), 1);
        assert_eq!(wb.sheet("A").unwrap().number("A1").unwrap(), 1.0);
    }

    #[test]
    fn test_setters_mark_cells_edited_but_insert_does_not() {
        let mut sheet = Sheet::new("COSTO INFRA");
        sheet.insert(CellRef::new(36, 9), Cell::number(1000.0));
        assert_eq!(sheet.edited_cells().count(), 0);

        sheet.set_number("J38", 100.0).unwrap();
        sheet.set_formula("J42", "J40+J41").unwrap();
        let edited: Vec<String> = sheet.edited_cells().map(|p| p.to_string()).collect();
        assert_eq!(edited, vec!["J38", "J42"]);
    }

    #[test]
    fn test_label_text_view() {
        assert_eq!(CellValue::Number(5.0).as_text(), Some("5".to_string()));
        assert_eq!(CellValue::Text(String::new()).as_text(), None);
        assert!(CellValue::Text(String::new()).is_empty());
    }
}
