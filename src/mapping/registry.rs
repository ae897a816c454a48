//! Mapping registry - built-in tables plus optional YAML overrides

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::builtin;
use super::{FieldMapping, MappingSet, Profile};
use crate::error::{EngineError, EngineResult};
use crate::excel::cell_ref::is_row_span;

/// On-disk registry format
///
/// ```yaml
/// mapping_sets:
///   capacity-insertion:
///     - { field: aforo_inicial, sheet: CALCULO AFORO, cell: C12 }
/// profiles:
///   - name: matriz-2025
///     workbook: matriz
///     writes: [capacity-insertion]
/// ```
#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    mapping_sets: BTreeMap<String, Vec<FieldMapping>>,
    #[serde(default)]
    profiles: Vec<Profile>,
}

/// All mapping sets and profiles known to the engine
#[derive(Debug, Clone)]
pub struct MappingRegistry {
    sets: BTreeMap<String, MappingSet>,
    profiles: BTreeMap<String, Profile>,
}

impl Default for MappingRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MappingRegistry {
    pub fn builtin() -> Self {
        let tables = [
            (builtin::SET_CONSOLIDATED_SUMMARY, builtin::consolidated_summary()),
            (builtin::SET_ORIGIN_CELLS, builtin::origin_cells()),
            (builtin::SET_CAPACITY_INSERTION, builtin::capacity_insertion()),
            (builtin::SET_CAPACITY_ROWS, builtin::capacity_rows()),
            (builtin::SET_COSTOS_INFRAESTRUCTURA, builtin::costos_infraestructura()),
            (builtin::SET_COSTOS_EQUIPAMIENTO, builtin::costos_equipamiento()),
        ];

        let sets = tables
            .into_iter()
            .map(|(name, fields)| {
                let set = MappingSet {
                    name: name.to_string(),
                    fields,
                };
                (name.to_string(), set)
            })
            .collect();

        let profiles = builtin::profiles()
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();

        Self { sets, profiles }
    }

    /// Built-in registry with the sets/profiles of a YAML document layered on top
    pub fn from_yaml_str(yaml: &str) -> EngineResult<Self> {
        let file: RegistryFile = serde_yaml::from_str(yaml)
            .map_err(|e| EngineError::Mapping(format!("invalid registry file: {}", e)))?;

        let mut registry = Self::builtin();
        for (name, fields) in file.mapping_sets {
            let set = MappingSet::new(name.clone(), fields)?;
            registry.sets.insert(name, set);
        }
        for profile in file.profiles {
            registry.profiles.insert(profile.name.clone(), profile);
        }
        registry.validate()?;
        Ok(registry)
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let yaml = fs::read_to_string(path)?;
        let registry = Self::from_yaml_str(&yaml)?;
        info!(
            path = %path.display(),
            sets = registry.sets.len(),
            profiles = registry.profiles.len(),
            "loaded mapping registry"
        );
        Ok(registry)
    }

    /// Every profile must reference existing mapping sets and valid coordinates
    pub fn validate(&self) -> EngineResult<()> {
        for profile in self.profiles.values() {
            for set in &profile.writes {
                if !self.sets.contains_key(set) {
                    return Err(EngineError::Mapping(format!(
                        "profile '{}' writes unknown mapping set '{}'",
                        profile.name, set
                    )));
                }
            }
            let extraction = &profile.extraction;
            for coordinate in extraction
                .outputs
                .values()
                .chain(extraction.level_aulas.values())
            {
                coordinate.position().map_err(|e| {
                    EngineError::Mapping(format!("profile '{}': {}", profile.name, e))
                })?;
            }
            if let Some(rows) = &extraction.labeled_rows {
                if !is_row_span(rows.start, rows.end) {
                    return Err(EngineError::Mapping(format!(
                        "profile '{}': invalid labeled row range {}-{}",
                        profile.name, rows.start, rows.end
                    )));
                }
            }
            for range in &profile.level_ranges {
                if !is_row_span(range.start, range.end) {
                    return Err(EngineError::Mapping(format!(
                        "profile '{}': invalid row range {} for {}",
                        profile.name,
                        range.label(),
                        range.level
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn set(&self, name: &str) -> EngineResult<&MappingSet> {
        self.sets
            .get(name)
            .ok_or_else(|| EngineError::Mapping(format!("unknown mapping set '{}'", name)))
    }

    pub fn profile(&self, name: &str) -> EngineResult<&Profile> {
        self.profiles
            .get(name)
            .ok_or_else(|| EngineError::UnknownProfile(name.to_string()))
    }

    pub fn profile_names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    pub fn set_names(&self) -> Vec<String> {
        self.sets.keys().cloned().collect()
    }
}
