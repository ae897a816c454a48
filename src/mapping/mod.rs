//! Cell coordinate mapping
//!
//! Mapping sets associate domain field names with spreadsheet cells. They
//! are plain data: a layout change in the master workbook is handled by
//! editing a table (built-in or YAML), never by touching the engine.
//!
//! Profiles tie mapping sets together into one calculation variant: which
//! sets are written, which workbook they target, whether the native
//! aggregator runs and which cells are projected into the result.

pub mod builtin;
mod registry;

pub use registry::MappingRegistry;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::excel::cell_ref::{is_row_span, letter_to_column_index, CellCoordinate, CellRef};
use crate::types::Level;

//==============================================================================
// Targets
//==============================================================================

/// Where a mapped field is written or read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellTarget {
    /// A single cell
    Cell { sheet: String, cell: String },
    /// The same column over an inclusive, one-based row range
    Rows {
        sheet: String,
        column: String,
        start: u32,
        end: u32,
    },
}

impl CellTarget {
    pub fn cell(sheet: &str, cell: &str) -> Self {
        CellTarget::Cell {
            sheet: sheet.to_string(),
            cell: cell.to_string(),
        }
    }

    pub fn rows(sheet: &str, column: &str, start: u32, end: u32) -> Self {
        CellTarget::Rows {
            sheet: sheet.to_string(),
            column: column.to_string(),
            start,
            end,
        }
    }

    pub fn sheet(&self) -> &str {
        match self {
            CellTarget::Cell { sheet, .. } | CellTarget::Rows { sheet, .. } => sheet,
        }
    }

    /// All cell positions covered by the target
    pub fn positions(&self) -> EngineResult<Vec<CellRef>> {
        match self {
            CellTarget::Cell { cell, .. } => Ok(vec![CellRef::parse(cell)?]),
            CellTarget::Rows {
                column, start, end, ..
            } => {
                let col = letter_to_column_index(column)
                    .ok_or_else(|| EngineError::InvalidCellRef(column.clone()))?;
                if !is_row_span(*start, *end) {
                    return Err(EngineError::InvalidCellRef(format!(
                        "{}{}:{}{}",
                        column, start, column, end
                    )));
                }
                Ok((*start..=*end).map(|row| CellRef::new(row - 1, col)).collect())
            }
        }
    }

    /// The target as a single coordinate, when it is one
    pub fn coordinate(&self) -> Option<CellCoordinate> {
        match self {
            CellTarget::Cell { sheet, cell } => {
                Some(CellCoordinate::new(sheet.clone(), cell.clone()))
            }
            CellTarget::Rows { .. } => None,
        }
    }
}

//==============================================================================
// Mapping Sets
//==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub field: String,
    #[serde(flatten)]
    pub target: CellTarget,
}

impl FieldMapping {
    pub fn new(field: &str, target: CellTarget) -> Self {
        Self {
            field: field.to_string(),
            target,
        }
    }
}

/// A named table of field → target associations; field names are unique
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingSet {
    name: String,
    fields: Vec<FieldMapping>,
}

impl MappingSet {
    pub fn new(name: impl Into<String>, fields: Vec<FieldMapping>) -> EngineResult<Self> {
        let name = name.into();
        let mut seen = HashSet::new();
        for mapping in &fields {
            if !seen.insert(mapping.field.as_str()) {
                return Err(EngineError::Mapping(format!(
                    "duplicate field '{}' in mapping set '{}'",
                    mapping.field, name
                )));
            }
            mapping.target.positions().map_err(|e| {
                EngineError::Mapping(format!(
                    "field '{}' in mapping set '{}': {}",
                    mapping.field, name, e
                ))
            })?;
        }
        Ok(Self { name, fields })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    /// Target of a field; unknown fields are simply absent
    pub fn resolve(&self, field: &str) -> Option<&CellTarget> {
        self.fields
            .iter()
            .find(|m| m.field == field)
            .map(|m| &m.target)
    }
}

//==============================================================================
// Profiles
//==============================================================================

/// Which configured master workbook a profile targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkbookKind {
    Project,
    Matriz,
}

/// Rows of one level's room-type table (columns B, C and E)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRange {
    pub level: Level,
    pub sheet: String,
    pub start: u32,
    pub end: u32,
}

impl LevelRange {
    pub fn new(level: Level, sheet: &str, start: u32, end: u32) -> Self {
        Self {
            level,
            sheet: sheet.to_string(),
            start,
            end,
        }
    }

    pub fn row_count(&self) -> usize {
        (self.end.saturating_sub(self.start) + 1) as usize
    }

    pub fn label(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

/// Rows whose column-B label becomes a result key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledRowsSpec {
    pub sheet: String,
    pub start: u32,
    pub end: u32,
    #[serde(default = "default_label_column")]
    pub label_column: String,
    #[serde(default = "default_quantity_column")]
    pub quantity_column: String,
    #[serde(default = "default_area_column")]
    pub area_column: String,
}

fn default_label_column() -> String {
    "B".to_string()
}

fn default_quantity_column() -> String {
    "D".to_string()
}

fn default_area_column() -> String {
    "E".to_string()
}

/// What a profile reads back after reload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSpec {
    /// Output key (`result_data.area_total`, `stairs.paso`) → cell
    #[serde(default)]
    pub outputs: BTreeMap<String, CellCoordinate>,
    /// Spreadsheet classroom count per level
    #[serde(default)]
    pub level_aulas: BTreeMap<Level, CellCoordinate>,
    #[serde(default)]
    pub result_data: bool,
    /// Emit classroom/construction/toilet/stair blocks
    #[serde(default)]
    pub details: bool,
    #[serde(default)]
    pub labeled_rows: Option<LabeledRowsSpec>,
}

/// One calculation variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub workbook: WorkbookKind,
    /// Mapping sets written, in order
    pub writes: Vec<String>,
    /// Level room-type tables (room rows are written here, aggregation reads here)
    #[serde(default)]
    pub level_ranges: Vec<LevelRange>,
    #[serde(default)]
    pub aggregate: bool,
    #[serde(default)]
    pub extraction: ExtractionSpec,
}

impl Profile {
    pub fn level_range(&self, level: Level) -> Option<&LevelRange> {
        self.level_ranges.iter().find(|r| r.level == level)
    }
}
