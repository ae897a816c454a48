//! Aforo engine - school capacity calculations over spreadsheet master workbooks
//!
//! Inputs are written into a master workbook through named mapping sets,
//! the workbook is persisted (which recalculates its formulas) and reloaded,
//! and results are projected out of the reloaded cells.
//!
//! # Example
//!
//! ```no_run
//! use aforo_engine::core::{CalculationEngine, EngineConfig};
//! use aforo_engine::mapping::MappingRegistry;
//! use aforo_engine::types::{CalculationRequest, CapacityRecord};
//!
//! let engine = CalculationEngine::new(EngineConfig::default(), MappingRegistry::builtin());
//! let request = CalculationRequest::from(CapacityRecord::from_aforos(50.0, 120.0, 100.0));
//! let result = engine.calculate("matriz-basic", Some(request))?;
//!
//! println!("aforo maximo: {}", result.result_data.unwrap_or_default().aforo_maximo);
//! # Ok::<(), aforo_engine::error::EngineError>(())
//! ```

pub mod api;
pub mod cli;
pub mod core;
pub mod error;
pub mod excel;
pub mod mapping;
pub mod types;

// Re-export commonly used types
pub use error::{EngineError, EngineResult};
pub use types::{CalculationRequest, CalculationResult, CapacityRecord, InputRecord, Level};
