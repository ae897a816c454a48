//! Calculation orchestrator
//!
//! Runs one request through the write → persist → reload → extract cycle:
//!
//! ```text
//! Received → Validated → Mutated → Persisted → Reloaded → Extracted → Responded
//! ```
//!
//! Any stage may fail; the error is logged against the stage it happened
//! in and returned unchanged. The workbook lock is held from before the
//! load that precedes `Mutated` until `Reloaded`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::aggregator::CapacityAggregator;
use super::locks::{self, WorkbookLocks};
use super::projection::{self, Projector};
use crate::error::{EngineError, EngineResult};
use crate::excel::{CellRef, Workbook, WorkbookStore};
use crate::mapping::{builtin, MappingRegistry, Profile, WorkbookKind};
use crate::types::{
    AggregateCheck, AulasSource, CalculationRequest, CalculationResult, CapacityRecord, CostReport,
    EquipmentCosts, InfrastructureCosts, Level, LevelResult,
};

/// Row (one-based) of each level's occupancy in an uploaded capacity template
const TEMPLATE_ROWS: [(Level, u32); 3] = [
    (Level::Inicial, 3),
    (Level::Primaria, 4),
    (Level::Secundaria, 5),
];
/// Column B
const TEMPLATE_COLUMN: u16 = 1;

const CONSISTENCY_TOLERANCE: f64 = 1e-9;

//==============================================================================
// Configuration
//==============================================================================

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Master workbook for project-kind profiles
    pub project_workbook: PathBuf,
    /// Master workbook for matriz-kind profiles
    pub matriz_workbook: PathBuf,
    /// Extra persist attempts after a transient failure
    pub persist_retries: u32,
    /// Sleep before retry `n` is `n * retry_backoff`
    pub retry_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            project_workbook: PathBuf::from("uploads/IDEAS_PRODESIGN.xlsx"),
            matriz_workbook: PathBuf::from("uploads/MATRIZ_PLATAFORMA_MASTER.xlsx"),
            persist_retries: 1,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

impl EngineConfig {
    pub fn new(project_workbook: impl Into<PathBuf>, matriz_workbook: impl Into<PathBuf>) -> Self {
        Self {
            project_workbook: project_workbook.into(),
            matriz_workbook: matriz_workbook.into(),
            ..Default::default()
        }
    }

    pub fn workbook_path(&self, kind: WorkbookKind) -> &Path {
        match kind {
            WorkbookKind::Project => &self.project_workbook,
            WorkbookKind::Matriz => &self.matriz_workbook,
        }
    }
}

//==============================================================================
// Lifecycle
//==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Mutated,
    Persisted,
    Reloaded,
    Extracted,
    Responded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Mutated => "mutated",
            Stage::Persisted => "persisted",
            Stage::Reloaded => "reloaded",
            Stage::Extracted => "extracted",
            Stage::Responded => "responded",
        };
        f.write_str(name)
    }
}

/// Tracks and logs one request's progress through the stages
struct Run<'a> {
    profile: &'a str,
    stage: Stage,
}

impl<'a> Run<'a> {
    fn start(profile: &'a str) -> Self {
        info!(profile, stage = %Stage::Received, "calculation received");
        Self {
            profile,
            stage: Stage::Received,
        }
    }

    fn advance(&mut self, next: Stage) {
        info!(profile = self.profile, from = %self.stage, to = %next, "stage transition");
        self.stage = next;
    }

    fn fail(&self, error: EngineError) -> EngineError {
        warn!(
            profile = self.profile,
            stage = %self.stage,
            kind = error.kind(),
            error = %error,
            "calculation failed"
        );
        error
    }
}

//==============================================================================
// Engine
//==============================================================================

/// Entry point for every calculation and report
#[derive(Debug)]
pub struct CalculationEngine {
    config: EngineConfig,
    registry: MappingRegistry,
    store: WorkbookStore,
    locks: WorkbookLocks,
}

impl CalculationEngine {
    pub fn new(config: EngineConfig, registry: MappingRegistry) -> Self {
        Self {
            config,
            registry,
            store: WorkbookStore::new(),
            locks: WorkbookLocks::new(),
        }
    }

    pub fn with_store(mut self, store: WorkbookStore) -> Self {
        self.store = store;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    /// Run a calculation under `profile_name`
    ///
    /// `None` means no input document was supplied at all. An empty
    /// request is valid: nothing is written, the workbook is still
    /// persisted and reloaded, and the current values are reported.
    pub fn calculate(
        &self,
        profile_name: &str,
        request: Option<CalculationRequest>,
    ) -> EngineResult<CalculationResult> {
        let mut run = Run::start(profile_name);

        let request = request
            .ok_or_else(|| EngineError::MissingInput("no input document supplied".to_string()))
            .map_err(|e| run.fail(e))?;
        let profile = self.registry.profile(profile_name).map_err(|e| run.fail(e))?;
        run.advance(Stage::Validated);

        let path = self.config.workbook_path(profile.workbook);
        let (reloaded, updated_cells) = {
            let lock = self.locks.lock_for(path);
            let _guard = locks::acquire(&lock);

            let mut workbook = self.store.load_path(path).map_err(|e| run.fail(e))?;
            let updated_cells = self
                .apply_writes(&mut workbook, profile, &request)
                .map_err(|e| run.fail(e))?;
            run.advance(Stage::Mutated);

            self.persist_with_retry(&workbook, path)
                .map_err(|e| run.fail(e))?;
            run.advance(Stage::Persisted);

            let reloaded = self.store.reload(path).map_err(|e| run.fail(e))?;
            run.advance(Stage::Reloaded);
            (reloaded, updated_cells)
        };

        let result = self
            .extract(profile, &reloaded, &request, updated_cells)
            .map_err(|e| run.fail(e))?;
        run.advance(Stage::Extracted);

        run.advance(Stage::Responded);
        info!(
            profile = profile_name,
            updated_cells,
            workbook = %path.display(),
            "calculation complete"
        );
        Ok(result)
    }

    /// Calculate from an uploaded capacity template
    ///
    /// The template's first sheet carries the occupancy of each level in
    /// column B, rows 3 to 5.
    pub fn calculate_upload(
        &self,
        profile_name: &str,
        upload: Option<&[u8]>,
    ) -> EngineResult<CalculationResult> {
        let bytes =
            upload.ok_or_else(|| EngineError::MissingInput("no file uploaded".to_string()))?;
        let template = self.store.load_buffer(bytes)?;
        let record = read_template(&template)?;
        self.calculate(profile_name, Some(CalculationRequest::from(record)))
    }

    /// Current values of the project workbook's origin cells
    pub fn project_snapshot(&self) -> EngineResult<BTreeMap<String, f64>> {
        let workbook = self.store.load_path(&self.config.project_workbook)?;
        let set = self.registry.set(builtin::SET_ORIGIN_CELLS)?;
        projection::read_set(&workbook, set, false)
    }

    pub fn infrastructure_costs(&self) -> EngineResult<InfrastructureCosts> {
        let workbook = self.store.load_path(&self.config.project_workbook)?;
        self.infrastructure_costs_in(&workbook, false)
    }

    pub fn equipment_costs(&self) -> EngineResult<EquipmentCosts> {
        let workbook = self.store.load_path(&self.config.project_workbook)?;
        self.equipment_costs_in(&workbook, false)
    }

    /// Both budgets plus their sum; a missing cost sheet counts as zero
    pub fn cost_report(&self) -> EngineResult<CostReport> {
        let workbook = self.store.load_path(&self.config.project_workbook)?;
        let infraestructura = self.infrastructure_costs_in(&workbook, true)?;
        let equipamiento = self.equipment_costs_in(&workbook, true)?;
        let total_general = infraestructura.presupuesto_total + equipamiento.presupuesto_total;
        Ok(CostReport {
            infraestructura,
            equipamiento,
            total_general,
        })
    }

    fn infrastructure_costs_in(
        &self,
        workbook: &Workbook,
        lenient: bool,
    ) -> EngineResult<InfrastructureCosts> {
        let set = self.registry.set(builtin::SET_COSTOS_INFRAESTRUCTURA)?;
        Ok(projection::infrastructure_costs(&projection::read_set(
            workbook, set, lenient,
        )?))
    }

    fn equipment_costs_in(
        &self,
        workbook: &Workbook,
        lenient: bool,
    ) -> EngineResult<EquipmentCosts> {
        let set = self.registry.set(builtin::SET_COSTOS_EQUIPAMIENTO)?;
        Ok(projection::equipment_costs(&projection::read_set(
            workbook, set, lenient,
        )?))
    }

    //--------------------------------------------------------------------------
    // Stages
    //--------------------------------------------------------------------------

    /// Every sheet a profile writes must exist before anything is written
    fn ensure_sheets(&self, workbook: &Workbook, profile: &Profile) -> EngineResult<()> {
        for set_name in &profile.writes {
            for mapping in self.registry.set(set_name)?.fields() {
                workbook.sheet(mapping.target.sheet())?;
            }
        }
        for range in &profile.level_ranges {
            workbook.sheet(&range.sheet)?;
        }
        Ok(())
    }

    /// Write numeric request fields through the profile's mapping sets,
    /// then room rows into its level ranges. Returns the number of cells
    /// written.
    fn apply_writes(
        &self,
        workbook: &mut Workbook,
        profile: &Profile,
        request: &CalculationRequest,
    ) -> EngineResult<usize> {
        self.ensure_sheets(workbook, profile)?;

        let mut written = 0;
        for set_name in &profile.writes {
            let set = self.registry.set(set_name)?;
            for mapping in set.fields() {
                let Some(value) = request.fields.numeric(&mapping.field) else {
                    continue;
                };
                let sheet = workbook.sheet_mut(mapping.target.sheet())?;
                for pos in mapping.target.positions()? {
                    sheet.set_number_at(pos, value);
                    written += 1;
                }
                debug!(
                    set = set.name(),
                    field = %mapping.field,
                    value,
                    "wrote field"
                );
            }
        }

        for (level, rows) in &request.rooms {
            let Some(range) = profile.level_range(*level) else {
                warn!(
                    profile = %profile.name,
                    level = %level,
                    "profile has no room rows for level, ignoring"
                );
                continue;
            };
            if rows.len() > range.row_count() {
                warn!(
                    level = %level,
                    supplied = rows.len(),
                    available = range.row_count(),
                    "more room rows than the layout holds, extra rows ignored"
                );
            }

            let sheet = workbook.sheet_mut(&range.sheet)?;
            for (row, room) in (range.start..=range.end).zip(rows) {
                let idx = row - 1;
                let columns = [
                    (super::aggregator::ROOM_COUNT_COLUMN, room.room_count),
                    (super::aggregator::OCCUPANCY_COLUMN, room.occupancy_per_room),
                    (super::aggregator::AREA_PER_PERSON_COLUMN, room.area_per_person),
                ];
                for (col, value) in columns {
                    if let Some(value) = value {
                        sheet.set_number_at(CellRef::new(idx, col), value);
                        written += 1;
                    }
                }
            }
        }

        Ok(written)
    }

    fn persist_with_retry(&self, workbook: &Workbook, path: &Path) -> EngineResult<()> {
        let mut attempt = 0;
        loop {
            match self.store.persist(workbook, path) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.config.persist_retries => {
                    attempt += 1;
                    warn!(
                        path = %path.display(),
                        attempt,
                        error = %e,
                        "persist failed, retrying"
                    );
                    thread::sleep(self.config.retry_backoff * attempt);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn extract(
        &self,
        profile: &Profile,
        workbook: &Workbook,
        request: &CalculationRequest,
        updated_cells: usize,
    ) -> EngineResult<CalculationResult> {
        let spec = &profile.extraction;
        let projector = Projector::new(workbook, spec);

        let mut result = CalculationResult {
            profile: profile.name.clone(),
            updated_cells,
            ..Default::default()
        };

        if spec.result_data {
            result.result_data = Some(projector.result_data()?);
        }
        if spec.details {
            result.classroom_measurements = Some(projector.classroom_measurements()?);
            result.construction_info = Some(projector.construction_info()?);
            result.toilets_per_student = Some(projector.toilets_per_student()?);
            result.stairs = Some(projector.stairs()?);
        }
        if let Some(rows) = &spec.labeled_rows {
            result.calculated_results = Some(projector.labeled_rows(rows)?);
        }

        for level in Level::ALL {
            let mapped = spec.level_aulas.contains_key(&level);
            let spreadsheet = projector.level_aulas(level)?;
            let native = match profile.level_range(level) {
                Some(range) if profile.aggregate => {
                    Some(CapacityAggregator::aggregate_range(workbook, range)?)
                }
                _ => None,
            };
            if !mapped && native.is_none() {
                continue;
            }

            let (aulas, source) = match (spreadsheet, &native) {
                (Some(value), _) => (value, AulasSource::Spreadsheet),
                (None, Some(aggregation)) => (aggregation.total, AulasSource::Native),
                (None, None) => (0.0, AulasSource::Spreadsheet),
            };

            if let (Some(aggregation), Some(range)) = (&native, profile.level_range(level)) {
                let consistent = spreadsheet.map_or(true, |value| {
                    (value - aggregation.total).abs() < CONSISTENCY_TOLERANCE
                });
                if !consistent {
                    warn!(
                        level = %level,
                        spreadsheet = ?spreadsheet,
                        native = aggregation.total,
                        "spreadsheet classroom count disagrees with native aggregation"
                    );
                }
                result.aggregate_checks.push(AggregateCheck {
                    level,
                    rows: range.label(),
                    spreadsheet,
                    native: aggregation.total,
                    consistent,
                    source,
                });
            }

            let aforo = request.fields.numeric(&level.aforo_field()).unwrap_or(0.0);
            result.levels.insert(level, LevelResult { aforo, aulas });
        }

        Ok(result)
    }
}

/// Occupancy per level from an uploaded template's first sheet
fn read_template(template: &Workbook) -> EngineResult<CapacityRecord> {
    let sheet = template
        .first_sheet()
        .ok_or_else(|| EngineError::InvalidInput("uploaded workbook has no sheets".to_string()))?;

    let mut aforos = [0.0; 3];
    for (slot, (level, row)) in aforos.iter_mut().zip(TEMPLATE_ROWS) {
        *slot = sheet.number_at(CellRef::new(row - 1, TEMPLATE_COLUMN));
        debug!(level = %level, row, value = *slot, "read template occupancy");
    }
    Ok(CapacityRecord::from_aforos(aforos[0], aforos[1], aforos[2]))
}
