//! Result projection - reads computed cells of a reloaded workbook back
//! into typed result blocks

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{EngineError, EngineResult};
use crate::excel::cell_ref::{letter_to_column_index, MAX_ROW_NUMBER};
use crate::excel::{CellRef, Workbook};
use crate::mapping::{ExtractionSpec, LabeledRowsSpec, MappingSet};
use crate::types::{
    ClassroomMeasurements, ConstructionInfo, EquipmentCosts, InfrastructureCosts, LabeledResults,
    LabeledRow, Level, ResultData, Stairs, ToiletRatio, ToiletsPerStudent,
};

/// Values reported when a detail cell is absent from the workbook
pub mod defaults {
    pub const MODULE_LENGTH_M: f64 = 4.2;
    pub const MODULE_WIDTH_M: f64 = 2.4;
    pub const MODULE_AREA_M2: f64 = 10.08;

    pub const FLOORS: f64 = 2.0;

    pub const TOILET_INICIAL_NINOS: f64 = 15.0;
    pub const TOILET_INICIAL_NINAS: f64 = 15.0;
    pub const TOILET_PRIMARIA_NINOS: f64 = 60.0;
    pub const TOILET_PRIMARIA_NINAS: f64 = 30.0;
    pub const TOILET_SECUNDARIA_NINOS: f64 = 60.0;
    pub const TOILET_SECUNDARIA_NINAS: f64 = 30.0;

    pub const STAIR_RISER_CM: f64 = 17.0;
    pub const STAIR_TREAD_CM: f64 = 28.0;
    pub const STAIR_WIDTH_M: f64 = 1.2;
}

/// Reads the outputs a profile's extraction names
pub struct Projector<'a> {
    workbook: &'a Workbook,
    spec: &'a ExtractionSpec,
}

impl<'a> Projector<'a> {
    pub fn new(workbook: &'a Workbook, spec: &'a ExtractionSpec) -> Self {
        Self { workbook, spec }
    }

    /// Output value, or `fallback` when the key is unmapped or the cell absent.
    ///
    /// A mapped cell on a sheet the workbook lacks is a layout mismatch and
    /// surfaces as `SheetNotFound`.
    fn value(&self, key: &str, fallback: f64) -> EngineResult<f64> {
        Ok(self.value_opt(key)?.unwrap_or(fallback))
    }

    fn value_opt(&self, key: &str) -> EngineResult<Option<f64>> {
        let Some(coordinate) = self.spec.outputs.get(key) else {
            return Ok(None);
        };
        let sheet = self.workbook.sheet(&coordinate.sheet)?;
        Ok(sheet.number_opt_at(coordinate.position()?))
    }

    pub fn result_data(&self) -> EngineResult<ResultData> {
        Ok(ResultData {
            aforo_maximo: self.value("result_data.aforo_maximo", 0.0)?,
            area_parcial: self.value("result_data.area_parcial", 0.0)?,
            area_total: self.value("result_data.area_total", 0.0)?,
            aulas: self.value("result_data.aulas", 0.0)?,
            circulacion: self.value("result_data.circulacion", 0.0)?,
        })
    }

    pub fn classroom_measurements(&self) -> EngineResult<ClassroomMeasurements> {
        Ok(ClassroomMeasurements {
            modulo_largo: self.value(
                "classroom_measurements.modulo_largo",
                defaults::MODULE_LENGTH_M,
            )?,
            modulo_ancho: self.value(
                "classroom_measurements.modulo_ancho",
                defaults::MODULE_WIDTH_M,
            )?,
            area_modulo: self.value(
                "classroom_measurements.area_modulo",
                defaults::MODULE_AREA_M2,
            )?,
        })
    }

    pub fn construction_info(&self) -> EngineResult<ConstructionInfo> {
        Ok(ConstructionInfo {
            pisos: self.value("construction_info.pisos", defaults::FLOORS)?,
            area_techada: self.value("construction_info.area_techada", 0.0)?,
            area_libre: self.value("construction_info.area_libre", 0.0)?,
        })
    }

    pub fn toilets_per_student(&self) -> EngineResult<ToiletsPerStudent> {
        let ratio = |level: &str, ninos: f64, ninas: f64| -> EngineResult<ToiletRatio> {
            Ok(ToiletRatio {
                ninos: self.value(&format!("toilets_per_student.{}.ninos", level), ninos)?,
                ninas: self.value(&format!("toilets_per_student.{}.ninas", level), ninas)?,
            })
        };

        Ok(ToiletsPerStudent {
            inicial: ratio(
                "inicial",
                defaults::TOILET_INICIAL_NINOS,
                defaults::TOILET_INICIAL_NINAS,
            )?,
            primaria: ratio(
                "primaria",
                defaults::TOILET_PRIMARIA_NINOS,
                defaults::TOILET_PRIMARIA_NINAS,
            )?,
            secundaria: ratio(
                "secundaria",
                defaults::TOILET_SECUNDARIA_NINOS,
                defaults::TOILET_SECUNDARIA_NINAS,
            )?,
        })
    }

    pub fn stairs(&self) -> EngineResult<Stairs> {
        Ok(Stairs {
            contrapaso: self.value("stairs.contrapaso", defaults::STAIR_RISER_CM)?,
            paso: self.value("stairs.paso", defaults::STAIR_TREAD_CM)?,
            ancho: self.value("stairs.ancho", defaults::STAIR_WIDTH_M)?,
        })
    }

    /// Spreadsheet classroom count of a level; `None` when unmapped or absent
    pub fn level_aulas(&self, level: Level) -> EngineResult<Option<f64>> {
        let Some(coordinate) = self.spec.level_aulas.get(&level) else {
            return Ok(None);
        };
        let sheet = self.workbook.sheet(&coordinate.sheet)?;
        Ok(sheet.number_opt_at(coordinate.position()?))
    }

    pub fn labeled_rows(&self, rows: &LabeledRowsSpec) -> EngineResult<LabeledResults> {
        labeled_rows(self.workbook, rows)
    }
}

//==============================================================================
// Labeled rows
//==============================================================================

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

fn non_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9_]").expect("valid key regex"))
}

/// `"Aula de Innovación (Sec.)"` → `"aula_de_innovacin_sec"`
pub fn normalize_label(label: &str) -> String {
    let lowered = label.to_lowercase();
    let underscored = whitespace_re().replace_all(&lowered, "_");
    non_key_re().replace_all(&underscored, "").into_owned()
}

/// Rows keyed by their normalized label; unlabeled rows are skipped
pub fn labeled_rows(workbook: &Workbook, rows: &LabeledRowsSpec) -> EngineResult<LabeledResults> {
    let sheet = workbook.sheet(&rows.sheet)?;
    let column = |letters: &str| {
        letter_to_column_index(letters)
            .ok_or_else(|| EngineError::InvalidCellRef(letters.to_string()))
    };
    let label_col = column(&rows.label_column)?;
    let quantity_col = column(&rows.quantity_column)?;
    let area_col = column(&rows.area_column)?;

    let mut results = BTreeMap::new();
    for row in rows.start.max(1)..=rows.end.min(MAX_ROW_NUMBER) {
        let idx = row - 1;
        let Some(label) = sheet.text_at(CellRef::new(idx, label_col)) else {
            continue;
        };
        let key = normalize_label(&label);
        if key.is_empty() {
            continue;
        }
        results.insert(
            key,
            LabeledRow {
                cantidad: sheet.number_at(CellRef::new(idx, quantity_col)),
                m2_total: sheet.number_at(CellRef::new(idx, area_col)),
                label,
            },
        );
    }
    Ok(results)
}

//==============================================================================
// Mapping set reads
//==============================================================================

/// Numeric value of every field in `set` (absent cells read as 0).
///
/// Row-span targets read their first cell. With `lenient`, fields on a
/// missing sheet read as 0 instead of failing.
pub fn read_set(
    workbook: &Workbook,
    set: &MappingSet,
    lenient: bool,
) -> EngineResult<BTreeMap<String, f64>> {
    let mut values = BTreeMap::new();
    for mapping in set.fields() {
        let sheet = match workbook.sheet(mapping.target.sheet()) {
            Ok(sheet) => sheet,
            Err(EngineError::SheetNotFound { .. }) if lenient => {
                values.insert(mapping.field.clone(), 0.0);
                continue;
            }
            Err(e) => return Err(e),
        };
        let value = match mapping.target.positions()?.first() {
            Some(pos) => sheet.number_at(*pos),
            None => 0.0,
        };
        values.insert(mapping.field.clone(), value);
    }
    Ok(values)
}

fn get(values: &BTreeMap<String, f64>, field: &str) -> f64 {
    values.get(field).copied().unwrap_or(0.0)
}

pub fn infrastructure_costs(values: &BTreeMap<String, f64>) -> InfrastructureCosts {
    InfrastructureCosts {
        costo_directo: get(values, "costo_directo"),
        gastos_generales: get(values, "gastos_generales"),
        utilidad: get(values, "utilidad"),
        subtotal: get(values, "subtotal"),
        igv: get(values, "igv"),
        presupuesto_total: get(values, "presupuesto_total"),
    }
}

pub fn equipment_costs(values: &BTreeMap<String, f64>) -> EquipmentCosts {
    EquipmentCosts {
        presupuesto_total: get(values, "presupuesto_total"),
    }
}
