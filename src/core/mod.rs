//! Core calculation engine: orchestration, native aggregation and result projection

pub mod aggregator;
pub mod locks;
pub mod orchestrator;
pub mod projection;

pub use aggregator::{Aggregation, CapacityAggregator, RowContribution};
pub use locks::WorkbookLocks;
pub use orchestrator::{CalculationEngine, EngineConfig, Stage};
pub use projection::{normalize_label, Projector};
