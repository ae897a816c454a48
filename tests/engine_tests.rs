//! Engine integration tests: write → persist → reload → extract against
//! fixture workbooks on disk

mod common;

use aforo_engine::core::{CapacityAggregator, EngineConfig};
use aforo_engine::excel::WorkbookStore;
use aforo_engine::mapping::MappingRegistry;
use aforo_engine::types::{AulasSource, CalculationRequest, CapacityRecord, InputRecord, RoomRow};
use aforo_engine::{EngineError, Level};
use common::{Fixture, CALCULO_AFORO, CONSOLIDADO, COSTO_INFRA};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::thread;

fn request(value: serde_json::Value) -> CalculationRequest {
    CalculationRequest::from_json(value).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// PARTIAL UPDATE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_unmapped_and_null_fields_leave_cells_untouched() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let result = engine
        .calculate(
            "project-summary",
            Some(request(json!({
                "biblioteca": 2,
                "cocina": null,
                "topico": "",
                "piscina_olimpica": 5
            }))),
        )
        .unwrap();

    // biblioteca lives in the consolidated rows and the origin cells
    assert_eq!(result.updated_cells, 2);

    let workbook = fixture.reload_project();
    let sheet = workbook.sheet(CONSOLIDADO).unwrap();
    assert_eq!(sheet.number("D70").unwrap(), 2.0);
    assert_eq!(sheet.number("D46").unwrap(), 2.0);
    assert_eq!(sheet.number("D80").unwrap(), 1.0);
    assert_eq!(sheet.number_opt("D85").unwrap(), None);
}

#[test]
fn test_numeric_strings_are_written() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    engine
        .calculate("project-summary", Some(request(json!({ "cocina": "3" }))))
        .unwrap();

    let workbook = fixture.reload_project();
    assert_eq!(workbook.sheet(CONSOLIDADO).unwrap().number("D80").unwrap(), 3.0);
}

// ═══════════════════════════════════════════════════════════════════════════
// ROUND-TRIP & RECALCULATION TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_written_values_round_trip() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    engine
        .calculate(
            "matriz-basic",
            Some(request(json!({
                "aforo_inicial": 37,
                "aforo_primaria": 123.456,
                "aforo_secundaria": 0.1
            }))),
        )
        .unwrap();

    let workbook = fixture.reload_matriz();
    let sheet = workbook.sheet(CALCULO_AFORO).unwrap();
    assert_eq!(sheet.number("C10").unwrap(), 37.0);
    let primaria = sheet.number("C19").unwrap();
    assert!((primaria - 123.456).abs() <= 123.456 * 1e-9);
    let secundaria = sheet.number("C28").unwrap();
    assert!((secundaria - 0.1).abs() <= 0.1 * 1e-9);
}

#[test]
fn test_dependent_formulas_visible_after_reload() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let result = engine
        .calculate(
            "matriz-basic",
            Some(CalculationRequest::from(CapacityRecord::from_aforos(
                50.0, 120.0, 100.0,
            ))),
        )
        .unwrap();

    let data = result.result_data.unwrap();
    assert_eq!(data.aforo_maximo, 270.0);
    assert_eq!(data.area_total, 405.0);
    assert_eq!(result.levels[&Level::Inicial].aulas, 2.0);
    assert_eq!(result.levels[&Level::Primaria].aulas, 4.0);
    assert_eq!(result.levels[&Level::Secundaria].aulas, 4.0);
    assert_eq!(result.levels[&Level::Primaria].aforo, 120.0);

    // the formula itself survives the round trip
    let workbook = fixture.reload_matriz();
    let cell = workbook.sheet(CALCULO_AFORO).unwrap().cell("B47").unwrap().unwrap();
    assert_eq!(cell.formula.as_deref(), Some("C10+C19+C28"));
}

#[test]
fn test_untouched_formulas_keep_exact_cached_values() {
    let fixture = Fixture::new();
    let mut book = common::project_book(true);
    let idx = book.sheet_index(COSTO_INFRA).unwrap();
    let infra = book.sheet_by_index_mut(idx).unwrap();
    infra.set_number("J40", 1234567.89).unwrap();
    infra.set_number("J41", 222222.22).unwrap();
    common::write(&book, &fixture.project);

    let engine = fixture.engine();
    let before = engine.infrastructure_costs().unwrap().presupuesto_total;
    assert!((before - 1456790.11).abs() < 1e-6);

    engine
        .calculate("project-summary", Some(request(json!({ "biblioteca": 1234.56 }))))
        .unwrap();

    let after = engine.infrastructure_costs().unwrap().presupuesto_total;
    assert_eq!(after.to_bits(), before.to_bits());

    // the written row is recalculated in f64
    let workbook = fixture.reload_project();
    let sheet = workbook.sheet(CONSOLIDADO).unwrap();
    assert_eq!(sheet.number("E70").unwrap(), 1234.56 * 60.0);
    assert_eq!(sheet.number("E67").unwrap(), 360.0);
}

#[test]
fn test_stale_values_without_recalculation() {
    let fixture = Fixture::new();
    let engine = fixture
        .engine()
        .with_store(WorkbookStore::without_recalculation());

    let result = engine
        .calculate(
            "matriz-basic",
            Some(CalculationRequest::from(CapacityRecord::from_aforos(
                50.0, 120.0, 100.0,
            ))),
        )
        .unwrap();

    assert_ne!(result.result_data.unwrap().aforo_maximo, 270.0);
}

#[test]
fn test_labeled_rows_follow_recalculation() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let result = engine
        .calculate(
            "project-summary",
            Some(request(json!({ "aulas_inicial_ciclo1": 3 }))),
        )
        .unwrap();

    let rows = result.calculated_results.unwrap();
    let ciclo1 = &rows["aulas_inicial_ciclo_i"];
    assert_eq!(ciclo1.cantidad, 3.0);
    assert_eq!(ciclo1.m2_total, 180.0);
    assert_eq!(ciclo1.label, "Aulas Inicial Ciclo I");
    assert_eq!(rows["biblioteca"].cantidad, 1.0);
    // rows without a label are not reported
    assert_eq!(rows.len(), 5);
}

#[test]
fn test_sequential_identical_requests_are_idempotent() {
    let fixture = Fixture::new();
    let engine = fixture.engine();
    let input = json!({ "inicial": 50, "primaria": 120, "secundaria": 100 });

    let first = engine.calculate("matriz-basic", Some(request(input.clone()))).unwrap();
    let second = engine.calculate("matriz-basic", Some(request(input))).unwrap();
    assert_eq!(first, second);
}

// ═══════════════════════════════════════════════════════════════════════════
// DETAILED PROFILE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_detail_blocks_fall_back_to_defaults() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let result = engine
        .calculate("matriz-detailed", Some(request(json!({}))))
        .unwrap();

    assert_eq!(result.stairs.as_ref().unwrap().paso, 28.0);
    assert_eq!(result.stairs.as_ref().unwrap().contrapaso, 17.0);
    assert_eq!(result.toilets_per_student.as_ref().unwrap().primaria.ninos, 60.0);
    assert_eq!(result.classroom_measurements.as_ref().unwrap().area_modulo, 10.08);
    assert_eq!(result.construction_info.as_ref().unwrap().pisos, 2.0);
}

#[test]
fn test_room_rows_aggregate_natively() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let result = engine
        .calculate(
            "matriz-detailed",
            Some(request(json!({
                "primaria": {
                    "aforo": 90,
                    "rooms": [
                        { "room_count": 2, "occupancy_per_room": 30, "area_per_person": 1.5 },
                        { "room_count": 1, "occupancy_per_room": 25, "area_per_person": 1.2 },
                        { "room_count": 0, "occupancy_per_room": 10, "area_per_person": 1.0 }
                    ]
                }
            }))),
        )
        .unwrap();

    let primaria = result.levels[&Level::Primaria];
    assert_eq!(primaria.aulas, 41.0);
    let check = result
        .aggregate_checks
        .iter()
        .find(|c| c.level == Level::Primaria)
        .unwrap();
    assert_eq!(check.native, 41.0);
    assert_eq!(check.spreadsheet, None);
    assert_eq!(check.source, AulasSource::Native);

    // the same rows read straight from the persisted workbook
    let workbook = fixture.reload_matriz();
    let sheet = workbook.sheet(CALCULO_AFORO).unwrap();
    assert_eq!(CapacityAggregator::aggregate(sheet, 20, 25).total, 41.0);
}

#[test]
fn test_spreadsheet_count_wins_over_native() {
    let fixture = Fixture::new();
    let mut book = common::matriz_book();
    book.sheet_mut(CALCULO_AFORO)
        .unwrap()
        .set_number("G26", 40.0)
        .unwrap();
    common::write(&book, &fixture.matriz);
    let engine = fixture.engine();

    let mut req = CalculationRequest::default();
    req.rooms.insert(
        Level::Primaria,
        vec![RoomRow::new(2.0, 30.0, 1.5), RoomRow::new(1.0, 25.0, 1.2)],
    );
    let result = engine.calculate("matriz-detailed", Some(req)).unwrap();

    assert_eq!(result.levels[&Level::Primaria].aulas, 40.0);
    let check = result
        .aggregate_checks
        .iter()
        .find(|c| c.level == Level::Primaria)
        .unwrap();
    assert!(!check.consistent);
    assert_eq!(check.source, AulasSource::Spreadsheet);
}

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_missing_cost_sheet_reports_available_sheets() {
    let fixture = Fixture::with_costs(false);
    let engine = fixture.engine();

    match engine.infrastructure_costs().unwrap_err() {
        EngineError::SheetNotFound {
            name,
            available_sheets,
        } => {
            assert_eq!(name, "COSTO INFRA");
            assert_eq!(available_sheets, vec![CONSOLIDADO.to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_cost_report_treats_missing_sheets_as_zero() {
    let fixture = Fixture::with_costs(false);
    let report = fixture.engine().cost_report().unwrap();
    assert_eq!(report.total_general, 0.0);
    assert_eq!(report.infraestructura.presupuesto_total, 0.0);
}

#[test]
fn test_cost_reports() {
    let fixture = Fixture::new();
    let engine = fixture.engine();

    let infra = engine.infrastructure_costs().unwrap();
    assert_eq!(infra.costo_directo, 1000.0);
    assert_eq!(infra.presupuesto_total, 1357.0);
    assert_eq!(engine.equipment_costs().unwrap().presupuesto_total, 500.0);
    assert_eq!(engine.cost_report().unwrap().total_general, 1857.0);
}

#[test]
fn test_missing_workbook_is_load_error() {
    let fixture = Fixture::new();
    let engine = aforo_engine::core::CalculationEngine::new(
        EngineConfig::new(fixture.dir.path().join("nope.xlsx"), &fixture.matriz),
        MappingRegistry::builtin(),
    );
    assert!(matches!(
        engine.calculate("project-summary", Some(InputRecord::new().into())),
        Err(EngineError::WorkbookLoad { .. })
    ));
}

#[test]
fn test_unknown_profile() {
    let fixture = Fixture::new();
    assert!(matches!(
        fixture.engine().calculate("matriz-2019", Some(request(json!({})))),
        Err(EngineError::UnknownProfile(_))
    ));
}

// ═══════════════════════════════════════════════════════════════════════════
// SNAPSHOT & UPLOAD TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_project_snapshot() {
    let fixture = Fixture::new();
    let snapshot = fixture.engine().project_snapshot().unwrap();
    assert_eq!(snapshot.len(), 10);
    assert_eq!(snapshot["aulas_primaria"], 6.0);
    assert_eq!(snapshot["lactario"], 0.0);
}

#[test]
fn test_template_upload() {
    let fixture = Fixture::new();
    let bytes = common::template_bytes(50.0, 120.0, 100.0);

    let result = fixture
        .engine()
        .calculate_upload("matriz-basic", Some(&bytes))
        .unwrap();
    assert_eq!(result.result_data.unwrap().aforo_maximo, 270.0);
    assert_eq!(result.levels[&Level::Secundaria].aforo, 100.0);
}

// ═══════════════════════════════════════════════════════════════════════════
// CONCURRENCY TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_concurrent_requests_on_one_workbook() {
    let fixture = Fixture::new();
    let engine = Arc::new(fixture.engine());

    let handles: Vec<_> = (1..=4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let value = f64::from(i) * 10.0;
                let result = engine
                    .calculate(
                        "matriz-basic",
                        Some(CalculationRequest::from(CapacityRecord::from_aforos(
                            value, value, value,
                        ))),
                    )
                    .unwrap();
                // each request observes exactly its own writes
                assert_eq!(result.result_data.unwrap().aforo_maximo, value * 3.0);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let workbook = fixture.reload_matriz();
    let sheet = workbook.sheet(CALCULO_AFORO).unwrap();
    let inicial = sheet.number("C10").unwrap();
    assert_eq!(sheet.number("B47").unwrap(), inicial * 3.0);
}
