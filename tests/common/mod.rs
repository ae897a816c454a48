//! Fixture workbooks shared by the integration tests

#![allow(dead_code)]

use aforo_engine::core::{CalculationEngine, EngineConfig};
use aforo_engine::excel::{Workbook, WorkbookExporter, WorkbookStore};
use aforo_engine::mapping::MappingRegistry;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const CONSOLIDADO: &str = "CONSOLIDADO";
pub const CALCULO_AFORO: &str = "CALCULO AFORO";
pub const COSTO_INFRA: &str = "COSTO INFRA";
pub const COSTO_EQUIPAMIENTO: &str = "COSTO EQUIPAMIENTO";

/// Project summary workbook: labeled consolidated rows, origin cells, budgets
pub fn project_book(with_costs: bool) -> Workbook {
    let mut workbook = Workbook::new();

    let sheet = workbook.add_sheet(CONSOLIDADO);
    let rows = [
        (64, "Aulas Inicial Ciclo I", 2.0),
        (65, "Aulas Inicial Ciclo II", 3.0),
        (67, "Aulas Primaria", 6.0),
        (70, "Biblioteca", 1.0),
        (80, "Cocina", 1.0),
    ];
    for (row, label, count) in rows {
        sheet.set_text(&format!("B{}", row), label).unwrap();
        sheet.set_number(&format!("D{}", row), count).unwrap();
        sheet
            .set_formula(&format!("E{}", row), format!("D{}*60", row))
            .unwrap();
    }
    sheet.set_number("D4", 2.0).unwrap();
    sheet.set_number("D26", 6.0).unwrap();
    sheet.set_number("D46", 1.0).unwrap();
    sheet.set_number("D56", 1.0).unwrap();

    if with_costs {
        let infra = workbook.add_sheet(COSTO_INFRA);
        for (cell, value) in [
            ("J37", 1000.0),
            ("J38", 100.0),
            ("J39", 50.0),
            ("J40", 1150.0),
            ("J41", 207.0),
        ] {
            infra.set_number(cell, value).unwrap();
        }
        infra.set_formula("J42", "J40+J41").unwrap();

        workbook
            .add_sheet(COSTO_EQUIPAMIENTO)
            .set_number("J42", 500.0)
            .unwrap();
    }
    workbook
}

/// Capacity matrix workbook with the occupancy cells and their formulas
pub fn matriz_book() -> Workbook {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_sheet(CALCULO_AFORO);
    for cell in ["C10", "C19", "C28"] {
        sheet.set_number(cell, 0.0).unwrap();
    }
    sheet.set_formula("B47", "C10+C19+C28").unwrap();
    sheet.set_formula("B46", "B47*1.5").unwrap();
    sheet.set_formula("D10", "C10/25").unwrap();
    sheet.set_formula("D19", "C19/30").unwrap();
    sheet.set_formula("D28", "C28/25").unwrap();
    workbook
}

pub fn write(workbook: &Workbook, path: &Path) {
    WorkbookStore::new().persist(workbook, path).unwrap();
}

pub fn to_xlsx(workbook: &Workbook) -> Vec<u8> {
    WorkbookExporter::new(workbook).to_buffer().unwrap()
}

/// Capacity template with occupancy in B3:B5
pub fn template_bytes(inicial: f64, primaria: f64, secundaria: f64) -> Vec<u8> {
    let mut template = Workbook::new();
    let sheet = template.add_sheet("Plantilla");
    sheet.set_text("A3", "Inicial").unwrap();
    sheet.set_number("B3", inicial).unwrap();
    sheet.set_text("A4", "Primaria").unwrap();
    sheet.set_number("B4", primaria).unwrap();
    sheet.set_text("A5", "Secundaria").unwrap();
    sheet.set_number("B5", secundaria).unwrap();
    to_xlsx(&template)
}

pub struct Fixture {
    pub dir: TempDir,
    pub project: PathBuf,
    pub matriz: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_costs(true)
    }

    pub fn with_costs(with_costs: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("IDEAS_PRODESIGN.xlsx");
        let matriz = dir.path().join("MATRIZ_PLATAFORMA_MASTER.xlsx");
        write(&project_book(with_costs), &project);
        write(&matriz_book(), &matriz);
        Self {
            dir,
            project,
            matriz,
        }
    }

    pub fn engine(&self) -> CalculationEngine {
        CalculationEngine::new(
            EngineConfig::new(&self.project, &self.matriz),
            MappingRegistry::builtin(),
        )
    }

    pub fn reload_project(&self) -> Workbook {
        WorkbookStore::new().load_path(&self.project).unwrap()
    }

    pub fn reload_matriz(&self) -> Workbook {
        WorkbookStore::new().load_path(&self.matriz).unwrap()
    }
}
