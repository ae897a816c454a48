//! HTTP REST API
//!
//! Run with `aforo serve` or `aforo-server`.

pub mod handlers;
pub mod server;

pub use server::{init_tracing, router, run_api_server, ApiConfig, AppState};
