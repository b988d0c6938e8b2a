use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use ctxstore::config::LoggingConfig;
use ctxstore::{Config, Database, HealthReport, McpServer, ToolRegistry};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ctxstore")]
#[command(
    author,
    version,
    about = "Persistent project knowledge for AI coding assistants, served as MCP tools"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (default: .ctxstore/config.toml, searched upwards)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file; wins over the config file and CTXSTORE_DB_PATH
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve MCP tools on stdin/stdout (default)
    Serve,

    /// Print the tool catalogue as JSON
    Tools,

    /// Open the store and report connection pool health
    Health {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create .ctxstore/ with a config file and an empty database
    Init,

    /// Generate shell completions
    Completion {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let command = args.command.unwrap_or(Command::Serve);

    // commands that need neither config nor database
    match &command {
        Command::Completion { shell } => {
            clap_complete::generate(
                *shell,
                &mut Args::command(),
                "ctxstore",
                &mut std::io::stdout(),
            );
            return Ok(ExitCode::SUCCESS);
        }
        Command::Tools => {
            let listing = serde_json::json!({ "tools": ToolRegistry::standard().descriptors() });
            println!("{}", serde_json::to_string_pretty(&listing)?);
            return Ok(ExitCode::SUCCESS);
        }
        Command::Init => {
            let cwd = std::env::current_dir().context("Could not get current directory")?;
            ctxstore::init::init_project(&cwd).map_err(anyhow::Error::msg)?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::Serve | Command::Health { .. } => {}
    }

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(db) = args.db {
        let db = if db.is_absolute() {
            db
        } else {
            std::env::current_dir()?.join(db)
        };
        config.database.path = Some(db);
    }
    init_logging(&config.logging, args.verbose);

    let db_path = config.db_path();
    let db = Database::open(&config)
        .with_context(|| format!("Could not open database at {}", db_path.display()))?;

    match command {
        Command::Health { json } => {
            let report = db.health();
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_health(&db_path, &report);
                for schema in db.schema_versions()? {
                    println!("   Schema:      {} ({})", schema.version, schema.name);
                }
            }
            db.shutdown(config.server.drain_timeout());
            Ok(if report.is_healthy() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        _ => {
            let server = Arc::new(McpServer::new(db, ToolRegistry::standard(), &config.server));
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Could not start async runtime")?;
            let served = runtime.block_on(server.serve(
                tokio::io::stdin(),
                tokio::io::stdout(),
                interrupted(),
            ));
            // a pending stdin read would otherwise hold the runtime open after Ctrl-C
            runtime.shutdown_background();
            served?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Logs go to stderr; stdout carries the protocol
fn init_logging(config: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

fn print_health(path: &std::path::Path, report: &HealthReport) {
    let status = if report.is_healthy() {
        "healthy".green().bold()
    } else {
        "unhealthy".red().bold()
    };
    println!("\n{} {}", "ctxstore".cyan().bold(), status);
    println!("   Database:    {}", path.display());
    println!("   Pool state:  {}", report.state);
    println!(
        "   Reachable:   {}",
        if report.reachable { "yes".green() } else { "no".red() }
    );
    println!(
        "   Connections: {} open, {} idle, {} max",
        report.connections, report.idle_connections, report.max_size
    );
    println!("   In flight:   {}", report.in_flight);
    if report.total_failures > 0 {
        println!(
            "   Failures:    {} total, {} consecutive",
            report.total_failures.to_string().yellow(),
            report.consecutive_failures
        );
    }
    if let Some(err) = &report.last_error {
        println!("   Last error:  {}", err.yellow());
    }
}
