//! Aforo API Server binary
//!
//! HTTP REST API over the capacity calculation engine.

use aforo_engine::api::{run_api_server, ApiConfig};
use aforo_engine::cli::build_engine;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "aforo-server")]
#[command(version)]
#[command(about = "Aforo API Server - HTTP REST API for school capacity calculations")]
#[command(long_about = r#"
Aforo API Server - HTTP REST API

Endpoints:
  - POST /api/v1/calculate/:profile       - Write inputs under a profile
  - POST /api/v1/update-project-excel     - Update the project summary workbook
  - GET  /api/v1/get-project-excel        - Current project workbook values
  - POST /api/v1/readMatriz               - Upload a capacity template (multipart `file`)
  - GET  /api/v1/costos/infraestructura   - Infrastructure budget
  - GET  /api/v1/costos/equipamiento      - Equipment budget
  - GET  /api/v1/costos/completo          - Combined budget

Additional endpoints:
  - GET  /health                          - Health check
  - GET  /version                         - Server version info
  - GET  /                                - API documentation

Example usage:
  aforo-server                            # Start on localhost:8080
  aforo-server --host 0.0.0.0 --port 3000

  curl -X POST http://localhost:8080/api/v1/calculate/matriz-basic \
    -H "Content-Type: application/json" \
    -d '{"inicial": 50, "primaria": 120, "secundaria": 100}'
"#)]
struct Args {
    /// Host address to bind to (use 0.0.0.0 for all interfaces)
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "AFORO_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "AFORO_PORT")]
    port: u16,

    /// Project summary workbook
    #[arg(long, default_value = "uploads/IDEAS_PRODESIGN.xlsx", env = "AFORO_PROJECT_WORKBOOK")]
    project_workbook: PathBuf,

    /// Capacity matrix workbook
    #[arg(
        long,
        default_value = "uploads/MATRIZ_PLATAFORMA_MASTER.xlsx",
        env = "AFORO_MATRIZ_WORKBOOK"
    )]
    matriz_workbook: PathBuf,

    /// YAML mapping registry layered over the built-in tables
    #[arg(long, env = "AFORO_MAPPINGS")]
    mappings: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let engine = build_engine(
        args.project_workbook,
        args.matriz_workbook,
        args.mappings.as_deref(),
    )?;
    let config = ApiConfig {
        host: args.host,
        port: args.port,
    };

    run_api_server(config, engine).await
}
