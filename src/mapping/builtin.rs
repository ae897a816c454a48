//! Built-in mapping sets and profiles for the IDEAS PRODESIGN / MATRIZ layouts

use std::collections::BTreeMap;

use crate::excel::cell_ref::CellCoordinate;
use crate::mapping::{
    CellTarget, ExtractionSpec, FieldMapping, LabeledRowsSpec, LevelRange, Profile, WorkbookKind,
};
use crate::types::Level;

pub const SHEET_CONSOLIDADO: &str = "CONSOLIDADO";
pub const SHEET_CALCULO_AFORO: &str = "CALCULO AFORO";
pub const SHEET_COSTO_INFRA: &str = "COSTO INFRA";
pub const SHEET_COSTO_EQUIPAMIENTO: &str = "COSTO EQUIPAMIENTO";

pub const SET_CONSOLIDATED_SUMMARY: &str = "consolidated-summary";
pub const SET_ORIGIN_CELLS: &str = "origin-cells";
pub const SET_CAPACITY_INSERTION: &str = "capacity-insertion";
pub const SET_CAPACITY_ROWS: &str = "capacity-rows";
pub const SET_COSTOS_INFRAESTRUCTURA: &str = "costos-infraestructura";
pub const SET_COSTOS_EQUIPAMIENTO: &str = "costos-equipamiento";

pub const PROFILE_PROJECT_SUMMARY: &str = "project-summary";
pub const PROFILE_MATRIZ_BASIC: &str = "matriz-basic";
pub const PROFILE_MATRIZ_DETAILED: &str = "matriz-detailed";

fn cells(sheet: &str, table: &[(&str, &str)]) -> Vec<FieldMapping> {
    table
        .iter()
        .map(|(field, cell)| FieldMapping::new(field, CellTarget::cell(sheet, cell)))
        .collect()
}

/// Classroom and amenity counts, CONSOLIDADO D64..D86
pub(crate) fn consolidated_summary() -> Vec<FieldMapping> {
    cells(
        SHEET_CONSOLIDADO,
        &[
            ("aulas_inicial_ciclo1", "D64"),
            ("aulas_inicial_ciclo2", "D65"),
            ("aula_psicomotricidad", "D66"),
            ("aulas_primaria", "D67"),
            ("aulas_secundaria", "D68"),
            ("sum_inicial", "D69"),
            ("biblioteca", "D70"),
            // primaria + secundaria share one row
            ("innovacion_secundaria", "D71"),
            ("taller_creativo_secundaria", "D72"),
            ("taller_ept", "D73"),
            ("laboratorio", "D74"),
            ("sum_prim_sec", "D75"),
            ("direccion_admin", "D76"),
            ("sala_reuniones", "D77"),
            ("sala_profesores", "D78"),
            ("sshh_admin", "D79"),
            ("cocina", "D80"),
            ("sshh_cocina", "D81"),
            ("depositos", "D82"),
            ("canchas_deportivas", "D83"),
            ("quiosco", "D84"),
            ("topico", "D85"),
            ("lactario", "D86"),
        ],
    )
}

/// Upstream cells the consolidated rows reference
pub(crate) fn origin_cells() -> Vec<FieldMapping> {
    cells(
        SHEET_CONSOLIDADO,
        &[
            ("aulas_inicial_ciclo1", "D4"),
            ("aulas_inicial_ciclo2", "D5"),
            ("aula_psicomotricidad", "D8"),
            ("sum_inicial", "D9"),
            ("topico", "D16"),
            ("lactario", "D17"),
            ("aulas_primaria", "D26"),
            ("aulas_secundaria", "D43"),
            ("biblioteca", "D46"),
            ("cocina", "D56"),
        ],
    )
}

/// One occupancy cell per level
pub(crate) fn capacity_insertion() -> Vec<FieldMapping> {
    cells(
        SHEET_CALCULO_AFORO,
        &[
            ("aforo_inicial", "C10"),
            ("aforo_primaria", "C19"),
            ("aforo_secundaria", "C28"),
        ],
    )
}

fn level_ranges() -> Vec<LevelRange> {
    vec![
        LevelRange::new(Level::Inicial, SHEET_CALCULO_AFORO, 11, 13),
        LevelRange::new(Level::Primaria, SHEET_CALCULO_AFORO, 20, 25),
        LevelRange::new(Level::Secundaria, SHEET_CALCULO_AFORO, 29, 33),
    ]
}

/// Occupancy fanned out over each level's room-type rows (column C)
pub(crate) fn capacity_rows() -> Vec<FieldMapping> {
    level_ranges()
        .into_iter()
        .map(|range| {
            FieldMapping::new(
                &range.level.aforo_field(),
                CellTarget::rows(&range.sheet, "C", range.start, range.end),
            )
        })
        .collect()
}

pub(crate) fn costos_infraestructura() -> Vec<FieldMapping> {
    cells(
        SHEET_COSTO_INFRA,
        &[
            ("costo_directo", "J37"),
            ("gastos_generales", "J38"),
            ("utilidad", "J39"),
            ("subtotal", "J40"),
            ("igv", "J41"),
            ("presupuesto_total", "J42"),
        ],
    )
}

pub(crate) fn costos_equipamiento() -> Vec<FieldMapping> {
    cells(SHEET_COSTO_EQUIPAMIENTO, &[("presupuesto_total", "J42")])
}

fn aforo_outputs(table: &[(&str, &str)]) -> BTreeMap<String, CellCoordinate> {
    table
        .iter()
        .map(|(key, cell)| (key.to_string(), CellCoordinate::new(SHEET_CALCULO_AFORO, *cell)))
        .collect()
}

fn result_data_outputs() -> BTreeMap<String, CellCoordinate> {
    aforo_outputs(&[
        ("result_data.aforo_maximo", "B47"),
        ("result_data.area_parcial", "L45"),
        ("result_data.area_total", "B46"),
        ("result_data.aulas", "B5"),
        ("result_data.circulacion", "B45"),
    ])
}

fn detail_outputs() -> BTreeMap<String, CellCoordinate> {
    aforo_outputs(&[
        ("classroom_measurements.modulo_largo", "O5"),
        ("classroom_measurements.modulo_ancho", "O6"),
        ("classroom_measurements.area_modulo", "O7"),
        ("construction_info.pisos", "O10"),
        ("construction_info.area_techada", "O11"),
        ("construction_info.area_libre", "O12"),
        ("toilets_per_student.inicial.ninos", "R5"),
        ("toilets_per_student.inicial.ninas", "S5"),
        ("toilets_per_student.primaria.ninos", "R6"),
        ("toilets_per_student.primaria.ninas", "S6"),
        ("toilets_per_student.secundaria.ninos", "R7"),
        ("toilets_per_student.secundaria.ninas", "S7"),
        ("stairs.contrapaso", "O15"),
        ("stairs.paso", "O16"),
        ("stairs.ancho", "O17"),
    ])
}

fn level_aulas(table: [(Level, &str); 3]) -> BTreeMap<Level, CellCoordinate> {
    table
        .into_iter()
        .map(|(level, cell)| (level, CellCoordinate::new(SHEET_CALCULO_AFORO, cell)))
        .collect()
}

pub(crate) fn profiles() -> Vec<Profile> {
    vec![
        Profile {
            name: PROFILE_PROJECT_SUMMARY.to_string(),
            workbook: WorkbookKind::Project,
            writes: vec![
                SET_CONSOLIDATED_SUMMARY.to_string(),
                SET_ORIGIN_CELLS.to_string(),
            ],
            level_ranges: Vec::new(),
            aggregate: false,
            extraction: ExtractionSpec {
                labeled_rows: Some(LabeledRowsSpec {
                    sheet: SHEET_CONSOLIDADO.to_string(),
                    start: 64,
                    end: 86,
                    label_column: "B".to_string(),
                    quantity_column: "D".to_string(),
                    area_column: "E".to_string(),
                }),
                ..Default::default()
            },
        },
        Profile {
            name: PROFILE_MATRIZ_BASIC.to_string(),
            workbook: WorkbookKind::Matriz,
            writes: vec![SET_CAPACITY_INSERTION.to_string()],
            level_ranges: Vec::new(),
            aggregate: false,
            extraction: ExtractionSpec {
                outputs: result_data_outputs(),
                level_aulas: level_aulas([
                    (Level::Inicial, "D10"),
                    (Level::Primaria, "D19"),
                    (Level::Secundaria, "D28"),
                ]),
                result_data: true,
                ..Default::default()
            },
        },
        Profile {
            name: PROFILE_MATRIZ_DETAILED.to_string(),
            workbook: WorkbookKind::Matriz,
            writes: vec![SET_CAPACITY_ROWS.to_string()],
            level_ranges: level_ranges(),
            aggregate: true,
            extraction: ExtractionSpec {
                outputs: result_data_outputs()
                    .into_iter()
                    .chain(detail_outputs())
                    .collect(),
                level_aulas: level_aulas([
                    (Level::Inicial, "G14"),
                    (Level::Primaria, "G26"),
                    (Level::Secundaria, "G34"),
                ]),
                result_data: true,
                details: true,
                labeled_rows: None,
            },
        },
    ]
}
