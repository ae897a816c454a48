use aforo_engine::api::{init_tracing, run_api_server, ApiConfig};
use aforo_engine::cli::{self, CostKind};
use aforo_engine::mapping::builtin::PROFILE_MATRIZ_BASIC;
use aforo_engine::mapping::MappingRegistry;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "aforo")]
#[command(about = "School capacity and infrastructure calculations over master workbooks")]
#[command(long_about = "Aforo - capacity calculations over spreadsheet master workbooks

Inputs are written into a master workbook through a named profile, the
workbook is persisted so its formulas recalculate, and results are read
back from the reloaded file.

COMMANDS:
  calculate   - Write a JSON input document under a profile
  read-matriz - Calculate from an uploaded capacity template
  snapshot    - Current values of the project workbook
  costs       - Infrastructure / equipment budgets
  aggregate   - Native classroom count over a row range
  profiles    - List calculation profiles and mapping sets
  serve       - Start the HTTP API server

EXAMPLES:
  aforo calculate matriz-basic input.json
  aforo read-matriz plantilla.xlsx --profile matriz-detailed
  aforo aggregate MATRIZ.xlsx --sheet \"CALCULO AFORO\" --rows 20-25
  aforo costs completo --json")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    workbooks: WorkbookArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct WorkbookArgs {
    /// Project summary workbook
    #[arg(
        long,
        global = true,
        default_value = "uploads/IDEAS_PRODESIGN.xlsx",
        env = "AFORO_PROJECT_WORKBOOK"
    )]
    project_workbook: PathBuf,

    /// Capacity matrix workbook
    #[arg(
        long,
        global = true,
        default_value = "uploads/MATRIZ_PLATAFORMA_MASTER.xlsx",
        env = "AFORO_MATRIZ_WORKBOOK"
    )]
    matriz_workbook: PathBuf,

    /// YAML mapping registry layered over the built-in tables
    #[arg(long, global = true, env = "AFORO_MAPPINGS")]
    mappings: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a JSON input document into a workbook under a profile
    Calculate {
        /// Profile id (see `aforo profiles`)
        profile: String,

        /// JSON field record or capacity record
        input: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Calculate capacity from a template (first sheet, B3:B5)
    ReadMatriz {
        /// Template workbook (.xlsx)
        template: PathBuf,

        /// Matriz profile to run
        #[arg(short, long, default_value = PROFILE_MATRIZ_BASIC)]
        profile: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the project workbook's origin cells
    Snapshot {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report budgets from the project workbook
    Costs {
        /// Which budget to report
        #[arg(value_enum, default_value = "completo")]
        kind: CostKind,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Native classroom aggregation over room-type rows
    Aggregate {
        /// Workbook to read
        workbook: PathBuf,

        /// Sheet holding the room-type table
        #[arg(short, long, default_value = "CALCULO AFORO")]
        sheet: String,

        /// Inclusive one-based row range, e.g. 20-25
        #[arg(short, long)]
        rows: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List calculation profiles and mapping sets
    Profiles,

    /// Start the HTTP API server
    Serve {
        /// Host address to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1", env = "AFORO_HOST")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8080", env = "AFORO_PORT")]
        port: u16,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if !matches!(cli.command, Commands::Serve { .. }) {
        init_tracing("aforo_engine=warn");
    }
    let WorkbookArgs {
        project_workbook,
        matriz_workbook,
        mappings,
    } = cli.workbooks;
    let build = || cli::build_engine(project_workbook, matriz_workbook, mappings.as_deref());

    match cli.command {
        Commands::Calculate {
            profile,
            input,
            json,
        } => cli::calculate(&build()?, &profile, &input, json)?,

        Commands::ReadMatriz {
            template,
            profile,
            json,
        } => cli::read_matriz(&build()?, &profile, &template, json)?,

        Commands::Snapshot { json } => cli::snapshot(&build()?, json)?,

        Commands::Costs { kind, json } => cli::costs(&build()?, kind, json)?,

        Commands::Aggregate {
            workbook,
            sheet,
            rows,
            json,
        } => cli::aggregate(&workbook, &sheet, &rows, json)?,

        Commands::Profiles => {
            let registry = match &mappings {
                Some(path) => MappingRegistry::load(path)?,
                None => MappingRegistry::builtin(),
            };
            cli::profiles(&registry)?
        }

        Commands::Serve { host, port } => {
            let engine = build()?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_api_server(ApiConfig { host, port }, engine))?
        }
    }
    Ok(())
}
