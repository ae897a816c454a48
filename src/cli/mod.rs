//! CLI command handlers

pub mod commands;

pub use commands::{
    aggregate, build_engine, calculate, costs, profiles, read_matriz, snapshot, CostKind,
};
