//! Native classroom-count aggregation
//!
//! Mirrors the workbook's ceiling-division formula so classroom counts can
//! be computed (or checked) without relying on spreadsheet recalculation.
//! For each row: `D = B * C` students, `F = E * B` capacity; the row adds
//! `ceil(D / F)` classrooms when `F > 0`. The ceiling is taken per row,
//! before summing.

use serde::Serialize;

use crate::error::EngineResult;
use crate::excel::cell_ref::MAX_ROW_NUMBER;
use crate::excel::{CellRef, Sheet, Workbook};
use crate::mapping::LevelRange;

/// Column B: number of physical rooms the row represents
pub const ROOM_COUNT_COLUMN: u16 = 1;
/// Column C: students assigned per room
pub const OCCUPANCY_COLUMN: u16 = 2;
/// Column E: m² required per student
pub const AREA_PER_PERSON_COLUMN: u16 = 4;

/// One row's share of the total
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowContribution {
    /// One-based row number
    pub row: u32,
    pub students: f64,
    pub capacity: f64,
    /// `None` when the row was skipped (`capacity <= 0`)
    pub aulas: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    pub total: f64,
    pub rows: Vec<RowContribution>,
}

pub struct CapacityAggregator;

impl CapacityAggregator {
    /// Aggregate the inclusive one-based row range `start..=end` of `sheet`
    pub fn aggregate(sheet: &Sheet, start: u32, end: u32) -> Aggregation {
        let mut total = 0.0;
        let mut rows = Vec::new();

        for row in start.max(1)..=end.min(MAX_ROW_NUMBER) {
            let idx = row - 1;
            let room_count = sheet.number_at(CellRef::new(idx, ROOM_COUNT_COLUMN));
            let occupancy = sheet.number_at(CellRef::new(idx, OCCUPANCY_COLUMN));
            let area_per_person = sheet.number_at(CellRef::new(idx, AREA_PER_PERSON_COLUMN));

            let students = room_count * occupancy;
            let capacity = area_per_person * room_count;

            let aulas = if capacity > 0.0 {
                let aulas = ceil_div(students, capacity);
                total += aulas;
                Some(aulas)
            } else {
                None
            };

            rows.push(RowContribution {
                row,
                students,
                capacity,
                aulas,
            });
        }

        Aggregation { total, rows }
    }

    /// Aggregate a level's room-type rows
    pub fn aggregate_range(workbook: &Workbook, range: &LevelRange) -> EngineResult<Aggregation> {
        let sheet = workbook.sheet(&range.sheet)?;
        Ok(Self::aggregate(sheet, range.start, range.end))
    }
}

/// `ceil(numerator / denominator)`, ignoring binary noise below 1e-9
fn ceil_div(numerator: f64, denominator: f64) -> f64 {
    let quotient = numerator / denominator;
    ((quotient * 1e9).round() / 1e9).ceil()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Level;

    fn sheet_with_rows(rows: &[(u32, f64, f64, f64)]) -> Sheet {
        let mut sheet = Sheet::new("CALCULO AFORO");
        for (row, rooms, occupancy, area) in rows {
            sheet.set_number(&format!("B{}", row), *rooms).unwrap();
            sheet.set_number(&format!("C{}", row), *occupancy).unwrap();
            sheet.set_number(&format!("E{}", row), *area).unwrap();
        }
        sheet
    }

    #[test]
    fn test_reference_example_totals_41() {
        let sheet = sheet_with_rows(&[
            (1, 2.0, 30.0, 1.5),
            (2, 1.0, 25.0, 1.2),
            (3, 0.0, 10.0, 1.0),
        ]);
        let result = CapacityAggregator::aggregate(&sheet, 1, 3);

        assert_eq!(result.total, 41.0);
        assert_eq!(result.rows[0].aulas, Some(20.0));
        assert_eq!(result.rows[1].aulas, Some(21.0));
        assert_eq!(result.rows[2].aulas, None);
    }

    #[test]
    fn test_ceiling_is_per_row() {
        // Each row needs 1.5 classrooms: per-row ceiling gives 2 + 2, not ceil(3.0) = 3
        let sheet = sheet_with_rows(&[(1, 1.0, 3.0, 2.0), (2, 1.0, 3.0, 2.0)]);
        assert_eq!(CapacityAggregator::aggregate(&sheet, 1, 2).total, 4.0);
    }

    #[test]
    fn test_zero_area_rows_are_skipped() {
        let sheet = sheet_with_rows(&[(1, 3.0, 30.0, 0.0)]);
        let result = CapacityAggregator::aggregate(&sheet, 1, 1);
        assert_eq!(result.total, 0.0);
        assert_eq!(result.rows[0].capacity, 0.0);
    }

    #[test]
    fn test_empty_rows_contribute_nothing() {
        let sheet = Sheet::new("CALCULO AFORO");
        let result = CapacityAggregator::aggregate(&sheet, 11, 13);
        assert_eq!(result.total, 0.0);
        assert_eq!(result.rows.len(), 3);
    }

    #[test]
    fn test_rows_past_sheet_end_are_not_visited() {
        let sheet = Sheet::new("CALCULO AFORO");
        let result = CapacityAggregator::aggregate(&sheet, MAX_ROW_NUMBER - 1, u32::MAX);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[1].row, MAX_ROW_NUMBER);
    }

    #[test]
    fn test_exact_quotients_do_not_round_up() {
        // 0.1 * 3 style noise must not push an exact quotient to the next integer
        let sheet = sheet_with_rows(&[(1, 3.0, 0.7, 0.1)]);
        let result = CapacityAggregator::aggregate(&sheet, 1, 1);
        assert_eq!(result.rows[0].aulas, Some(7.0));
    }

    #[test]
    fn test_aggregate_range_missing_sheet() {
        let workbook = Workbook::new();
        let range = LevelRange::new(Level::Inicial, "CALCULO AFORO", 11, 13);
        assert!(CapacityAggregator::aggregate_range(&workbook, &range).is_err());
    }
}
