use crate::core::{CalculationEngine, CapacityAggregator, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::excel::cell_ref::is_row_span;
use crate::excel::WorkbookStore;
use crate::mapping::MappingRegistry;
use crate::types::{CalculationRequest, CalculationResult};
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Which budget `costs` reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CostKind {
    Infraestructura,
    Equipamiento,
    Completo,
}

/// Format a number for display, removing unnecessary decimal places
pub fn format_number(n: f64) -> String {
    let rounded = (n * 1e6).round() / 1e6;
    format!("{:.6}", rounded)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

fn print_json<T: Serialize>(value: &T) -> EngineResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Build an engine from workbook paths and an optional YAML registry
pub fn build_engine(
    project_workbook: PathBuf,
    matriz_workbook: PathBuf,
    mappings: Option<&Path>,
) -> EngineResult<CalculationEngine> {
    let registry = match mappings {
        Some(path) => MappingRegistry::load(path)?,
        None => MappingRegistry::builtin(),
    };
    Ok(CalculationEngine::new(
        EngineConfig::new(project_workbook, matriz_workbook),
        registry,
    ))
}

/// Read a JSON input document
pub fn read_input(input: &Path) -> EngineResult<CalculationRequest> {
    if !input.is_file() {
        return Err(EngineError::MissingInput(format!(
            "input file not found: {}",
            input.display()
        )));
    }
    let content = fs::read_to_string(input)?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| EngineError::InvalidInput(format!("malformed JSON: {}", e)))?;
    CalculationRequest::from_json(value)
}

/// Execute the calculate command
pub fn calculate(
    engine: &CalculationEngine,
    profile: &str,
    input: &Path,
    json: bool,
) -> EngineResult<()> {
    let request = read_input(input)?;
    if !json {
        println!("{}", "🏫 Aforo - Calculating".bold().green());
        println!("   Profile: {}", profile.bright_yellow().bold());
        println!("   Input:   {}", input.display());
        println!("   Fields:  {}", request.fields.len());
        println!();
    }

    let result = engine.calculate(profile, Some(request))?;
    if json {
        return print_json(&result);
    }
    print_result(&result);
    Ok(())
}

/// Execute the read-matriz command
pub fn read_matriz(
    engine: &CalculationEngine,
    profile: &str,
    template: &Path,
    json: bool,
) -> EngineResult<()> {
    let bytes = fs::read(template).map_err(|e| EngineError::WorkbookLoad {
        path: template.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !json {
        println!("{}", "🏫 Aforo - Reading capacity template".bold().green());
        println!("   Template: {}", template.display());
        println!("   Profile:  {}", profile.bright_yellow().bold());
        println!();
    }

    let result = engine.calculate_upload(profile, Some(&bytes))?;
    if json {
        return print_json(&result);
    }
    print_result(&result);
    Ok(())
}

fn print_result(result: &CalculationResult) {
    println!(
        "{} {} cells updated",
        "✅ Calculation complete:".bold().green(),
        result.updated_cells
    );

    if !result.levels.is_empty() {
        println!("\n   📊 Levels:");
        for (level, values) in &result.levels {
            println!(
                "      {:<11} aforo = {:>8}   aulas = {}",
                level.as_str().bright_blue(),
                format_number(values.aforo),
                format_number(values.aulas).bold()
            );
        }
    }

    if let Some(data) = &result.result_data {
        println!("\n   📐 Results:");
        println!("      aforo_maximo = {}", format_number(data.aforo_maximo).bold());
        println!("      area_total   = {}", format_number(data.area_total));
        println!("      area_parcial = {}", format_number(data.area_parcial));
        println!("      circulacion  = {}", format_number(data.circulacion));
        println!("      aulas        = {}", format_number(data.aulas));
    }

    if let Some(rows) = &result.calculated_results {
        println!("\n   📋 Consolidated:");
        for (key, row) in rows {
            println!(
                "      {:<32} {:>6}  {} m²",
                key.cyan(),
                format_number(row.cantidad),
                format_number(row.m2_total)
            );
        }
    }

    for check in &result.aggregate_checks {
        if !check.consistent {
            println!(
                "{}",
                format!(
                    "⚠️  {} rows {}: spreadsheet {} vs native {}",
                    check.level,
                    check.rows,
                    check
                        .spreadsheet
                        .map(format_number)
                        .unwrap_or_else(|| "-".to_string()),
                    format_number(check.native)
                )
                .yellow()
            );
        }
    }
    println!();
}

/// Execute the snapshot command
pub fn snapshot(engine: &CalculationEngine, json: bool) -> EngineResult<()> {
    let values = engine.project_snapshot()?;
    if json {
        return print_json(&values);
    }

    println!("{}", "🏫 Aforo - Project snapshot".bold().green());
    println!("   Workbook: {}", engine.config().project_workbook.display());
    println!();
    for (field, value) in &values {
        println!("   {:<24} {}", field.bright_blue(), format_number(*value));
    }
    Ok(())
}

/// Execute the costs command
pub fn costs(engine: &CalculationEngine, kind: CostKind, json: bool) -> EngineResult<()> {
    match kind {
        CostKind::Infraestructura => {
            let costs = engine.infrastructure_costs()?;
            if json {
                return print_json(&costs);
            }
            println!("{}", "💰 Infrastructure budget".bold().green());
            println!("   Costo directo:     {}", format_number(costs.costo_directo));
            println!("   Gastos generales:  {}", format_number(costs.gastos_generales));
            println!("   Utilidad:          {}", format_number(costs.utilidad));
            println!("   Subtotal:          {}", format_number(costs.subtotal));
            println!("   IGV:               {}", format_number(costs.igv));
            println!(
                "   Presupuesto total: {}",
                format_number(costs.presupuesto_total).bold()
            );
        }
        CostKind::Equipamiento => {
            let costs = engine.equipment_costs()?;
            if json {
                return print_json(&costs);
            }
            println!("{}", "💰 Equipment budget".bold().green());
            println!(
                "   Presupuesto total: {}",
                format_number(costs.presupuesto_total).bold()
            );
        }
        CostKind::Completo => {
            let report = engine.cost_report()?;
            if json {
                return print_json(&report);
            }
            println!("{}", "💰 Combined budget".bold().green());
            println!(
                "   Infraestructura: {}",
                format_number(report.infraestructura.presupuesto_total)
            );
            println!(
                "   Equipamiento:    {}",
                format_number(report.equipamiento.presupuesto_total)
            );
            println!(
                "   Total general:   {}",
                format_number(report.total_general).bold()
            );
        }
    }
    Ok(())
}

/// Parse an inclusive one-based row range such as `20-25`
pub fn parse_rows(rows: &str) -> EngineResult<(u32, u32)> {
    let invalid = || EngineError::InvalidInput(format!("invalid row range '{}'", rows));
    let (start, end) = rows.split_once('-').ok_or_else(invalid)?;
    let start: u32 = start.trim().parse().map_err(|_| invalid())?;
    let end: u32 = end.trim().parse().map_err(|_| invalid())?;
    if !is_row_span(start, end) {
        return Err(invalid());
    }
    Ok((start, end))
}

/// Execute the aggregate command
pub fn aggregate(workbook: &Path, sheet: &str, rows: &str, json: bool) -> EngineResult<()> {
    let (start, end) = parse_rows(rows)?;
    let book = WorkbookStore::new().load_path(workbook)?;
    let aggregation = CapacityAggregator::aggregate(book.sheet(sheet)?, start, end);
    if json {
        return print_json(&aggregation);
    }

    println!("{}", "🧮 Aforo - Native classroom aggregation".bold().green());
    println!("   Workbook: {}", workbook.display());
    println!("   Sheet:    {} rows {}-{}", sheet, start, end);
    println!();
    for row in &aggregation.rows {
        match row.aulas {
            Some(aulas) => println!(
                "   row {:<4} students {:>8}  capacity {:>8}  aulas {}",
                row.row,
                format_number(row.students),
                format_number(row.capacity),
                format_number(aulas)
            ),
            None => println!("   row {:<4} {}", row.row, "skipped (no capacity)".dimmed()),
        }
    }
    println!(
        "\n{} {}",
        "✅ Total aulas:".bold().green(),
        format_number(aggregation.total).bold()
    );
    Ok(())
}

/// Execute the profiles command
pub fn profiles(registry: &MappingRegistry) -> EngineResult<()> {
    println!("{}", "🏫 Aforo - Calculation profiles".bold().green());
    println!();
    for profile in registry.profiles() {
        println!(
            "   {} ({:?} workbook)",
            profile.name.bright_blue().bold(),
            profile.workbook
        );
        println!("      writes: {}", profile.writes.join(", "));
        if profile.aggregate {
            println!("      native aggregation: on");
        }
    }
    println!();
    println!("   Mapping sets: {}", registry.set_names().join(", "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Formatting Tests ====================

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(41.0), "41");
        assert_eq!(format_number(10.08), "10.08");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
    }

    // ==================== Row Range Tests ====================

    #[test]
    fn test_parse_rows() {
        assert_eq!(parse_rows("20-25").unwrap(), (20, 25));
        assert_eq!(parse_rows(" 11 - 13 ").unwrap(), (11, 13));
        assert!(parse_rows("25-20").is_err());
        assert!(parse_rows("0-3").is_err());
        assert_eq!(parse_rows("1-1048576").unwrap(), (1, 1_048_576));
        assert!(parse_rows("1-1048577").is_err());
        assert!(parse_rows("1-4000000000").is_err());
        assert!(parse_rows("20").is_err());
    }

    #[test]
    fn test_print_json_reports_serialization_error() {
        let mut keyed_by_pair = std::collections::BTreeMap::new();
        keyed_by_pair.insert((20, 25), 41.0);
        let err = print_json(&keyed_by_pair).unwrap_err();
        assert!(matches!(err, EngineError::Serialization(_)));
    }

    // ==================== Input Tests ====================

    #[test]
    fn test_read_input_missing_file() {
        let err = read_input(Path::new("/nonexistent/input.json")).unwrap_err();
        assert!(matches!(err, EngineError::MissingInput(_)));
    }

    #[test]
    fn test_read_input_capacity_record() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("input.json");
        fs::write(&path, r#"{"inicial": 50, "primaria": {"aforo": 120}}"#).unwrap();

        let request = read_input(&path).unwrap();
        assert_eq!(request.fields.numeric("aforo_inicial"), Some(50.0));
        assert_eq!(request.fields.numeric("aforo_primaria"), Some(120.0));
    }
}
