//! ora-pg-migrate CLI - declarative Oracle to PostgreSQL migration.

use clap::{Parser, Subcommand};
use ora_pg_migrate::{Config, ConverterRegistry, MigrateError, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "ora-pg-migrate")]
#[command(about = "Declarative one-shot Oracle to PostgreSQL migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured step in order
    Run {
        /// Override rows per bulk insert
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Resolve target columns for every step without moving data
    Plan,

    /// Validate row counts between source and target
    Validate,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    // Step definitions are checked before any connection is opened.
    let steps = config.build_steps(&ConverterRegistry::builtin())?;

    match cli.command {
        Commands::Run { batch_size } => {
            if let Some(n) = batch_size {
                if n == 0 {
                    return Err(MigrateError::Config(
                        "--batch-size must be at least 1".to_string(),
                    ));
                }
                config.migration.tx_batch_size = n;
            }

            let mut orchestrator = Orchestrator::connect(&config).await?;
            let outcome = orchestrator.run(&steps).await;
            orchestrator.close().await;

            let result = match outcome {
                Ok(result) => result,
                Err(e) => {
                    if cli.output_json {
                        if let Some(partial) = orchestrator.result() {
                            println!("{}", partial.to_json()?);
                        }
                    }
                    return Err(e);
                }
            };

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nMigration completed!");
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Steps: {}/{}", result.steps_completed, result.steps_total);
                println!("  Rows: {}", result.rows_transferred);
                println!("  Throughput: {} rows/sec", result.rows_per_second);
            }
        }

        Commands::Plan => {
            let orchestrator = Orchestrator::connect(&config).await?;
            let planned = orchestrator.plan(&steps).await?;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&planned)?);
            } else {
                println!("Migration plan ({} steps):", planned.len());
                for step in &planned {
                    println!("  #{} {}", step.index + 1, step.label);
                    if !step.target_columns.is_empty() {
                        println!("      columns: {}", step.target_columns.join(", "));
                    }
                }
            }
        }

        Commands::Validate => {
            let orchestrator = Orchestrator::connect(&config).await?;
            let results = orchestrator.validate(&steps).await?;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            }

            let mismatched = results.iter().filter(|r| !r.matches).count();
            if mismatched > 0 {
                return Err(MigrateError::schema(
                    format!("{} of {} tables", mismatched, results.len()),
                    "row counts differ between source and target",
                ));
            }
            if !cli.output_json {
                println!("Validation completed successfully");
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::connect(&config).await?;
            let result = orchestrator.health_check().await;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source ({}): {} ({}ms)",
                    result.source_db_type,
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target ({}): {} ({}ms)",
                    result.target_db_type,
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connectivity(
                    "one or more connections failed",
                    "health check",
                ));
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
