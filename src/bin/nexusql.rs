use clap::{Parser, Subcommand};
use nexusql::cli::{self as prog_cli, Command, OutputMode, TableSpec};
use nexusql::config::Config;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "nexusql", version, about = "Run document queries against NDJSON tables", long_about = None)]
struct Cli {
    /// Path to a config file (TOML)
    #[arg(long, help = "Path to a config file (TOML). Falls back to NEXUSQL_CONFIG, then ./nexusql.toml.")]
    config: Option<PathBuf>,
    /// Directory for rolling log files (overrides the config file)
    #[arg(long)]
    log_dir: Option<PathBuf>,
    /// Output format: plain (NDJSON) or json
    #[arg(long, default_value = "plain")]
    format: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Load tables and run a wire-form query")]
    Query {
        #[arg(long = "table", help = "Table to load: name=path[:primary_key], NDJSON or .bson. Repeatable.")]
        tables: Vec<String>,
        #[arg(long, help = "Query as JSON, or @file")]
        query: String,
    },
    #[command(about = "Print the normalized query and its hash")]
    Explain {
        #[arg(long, help = "Query as JSON, or @file")]
        query: String,
    },
    #[command(about = "Print process counters")]
    Metrics,
}

fn to_command(cmd: Commands) -> Result<Command, Box<dyn std::error::Error>> {
    Ok(match cmd {
        Commands::Query { tables, query } => Command::Query {
            tables: tables.iter().map(|t| TableSpec::parse(t)).collect::<Result<_, _>>()?,
            query: prog_cli::read_query_arg(&query)?,
        },
        Commands::Explain { query } => Command::Explain { query: prog_cli::read_query_arg(&query)? },
        Commands::Metrics => Command::Metrics,
    })
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut cfg = Config::resolve(cli.config.as_deref())?;
    if let Some(dir) = cli.log_dir {
        cfg.logging.dir = Some(dir);
    }
    if let Err(e) = nexusql::logger::init_with(&cfg.logging, "nexusql") {
        eprintln!("logging disabled: {e}");
    }
    let mode = OutputMode::parse(&cli.format)
        .ok_or_else(|| format!("unknown format `{}` (expected plain or json)", cli.format))?;
    let cmd = to_command(cli.command)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    prog_cli::run_with_format(cmd, &cfg, mode, &mut out).await
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
