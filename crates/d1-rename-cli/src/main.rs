//! d1-rename CLI - rename hosted SQLite databases by copy, verify and delete.

use clap::{Parser, Subcommand};
use d1_rename::{
    sanitize_with_report, verify_with_retry, Config, HttpPlatform, IntegrityVerifier,
    MigrationOrchestrator, RenameError, SchemaCapabilityChecker,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "d1-rename")]
#[command(about = "Rename hosted SQLite databases by copy, verify and delete")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Directory for job snapshots (overrides rename.state_dir)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Seconds to wait for rollback after a shutdown signal (default: 60)
    #[arg(long, default_value = "60")]
    shutdown_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rename a database (copy, verify, delete source)
    Rename {
        /// Id of the database to rename
        source_id: String,

        /// New database name
        new_name: String,
    },

    /// Check whether a database can be exported
    Check {
        /// Id of the database to inspect
        database_id: String,
    },

    /// Compare two databases table by table
    Verify {
        /// Id of the original database
        source_id: String,

        /// Id of the copy
        target_id: String,
    },

    /// Strip statements that break re-import from a local dump file
    Sanitize {
        /// Dump file to read
        input: PathBuf,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
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

async fn run() -> Result<(), RenameError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(RenameError::Config)?;

    // Sanitize works on local files only and needs no configuration.
    if let Commands::Sanitize { input, output } = &cli.command {
        let dump = std::fs::read_to_string(input)?;
        let report = sanitize_with_report(&dump);
        info!("Removed {} statement(s) from {:?}", report.removed, input);
        match output {
            Some(path) => std::fs::write(path, &report.sql)?,
            None => print!("{}", report.sql),
        }
        return Ok(());
    }

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);
    if let Some(dir) = cli.state_dir {
        config.rename.state_dir = Some(dir);
    }

    let platform = Arc::new(HttpPlatform::new(&config.platform)?);

    match cli.command {
        Commands::Sanitize { .. } => unreachable!(), // Handled above

        Commands::Rename {
            source_id,
            new_name,
        } => {
            let cancel_token = setup_signal_handler(cli.shutdown_timeout).await?;
            let orchestrator = MigrationOrchestrator::new(platform, config.rename)
                .with_cancellation(cancel_token.clone());

            let rename = orchestrator.rename(&source_id, &new_name);
            let shutdown_timeout = Duration::from_secs(cli.shutdown_timeout);
            let result = tokio::select! {
                result = rename => result?,
                _ = async {
                    cancel_token.cancelled().await;
                    tokio::time::sleep(shutdown_timeout).await;
                } => {
                    warn!("Rollback did not finish within {}s", cli.shutdown_timeout);
                    return Err(RenameError::cancelled("shutdown"));
                }
            };

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nRename completed!");
                println!("  Job ID: {}", result.job_id);
                println!("  Database: {} ({})", result.name, result.target_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!(
                    "  Polls: export {}, import {}, verification {}",
                    result.export_attempts, result.import_attempts, result.verification_attempts
                );
                if let Some(ref warning) = result.warning {
                    println!("  Warning: {}", warning);
                    println!("  Source database {} still exists", result.source_id);
                }
            }
        }

        Commands::Check { database_id } => {
            let report = SchemaCapabilityChecker::new(platform)
                .check(&database_id)
                .await?;

            if cli.output_json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "database_id": &database_id,
                        "supported": report.is_supported(),
                        "unsupported_tables": &report.unsupported_tables,
                    }))?
                );
            } else if report.is_supported() {
                println!("{}: OK, no unsupported virtual tables", database_id);
            }

            if !report.is_supported() {
                return Err(RenameError::UnsupportedSchemaFeature {
                    tables: report.unsupported_tables,
                });
            }
        }

        Commands::Verify {
            source_id,
            target_id,
        } => {
            let cancel_token = setup_signal_handler(cli.shutdown_timeout).await?;
            let verifier =
                IntegrityVerifier::new(platform, config.rename.system_table_prefixes.clone());
            let mut attempts = 0;

            let report = verify_with_retry(
                &verifier,
                &mut attempts,
                &source_id,
                &target_id,
                &config.rename.verification,
                &cancel_token,
            )
            .await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\nVerification passed!");
                println!("  Tables compared: {}", report.tables_compared);
                println!("  Row count checks: {}", report.row_count_checks);
                println!("  Column count checks: {}", report.column_count_checks);
                println!("  Attempts: {}", attempts);
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("Unknown verbosity: {}", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("Unknown log format: {}", other)),
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
async fn setup_signal_handler(shutdown_timeout: u64) -> Result<CancellationToken, RenameError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let token = cancel_token.clone();

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!(
            "\nReceived {}. Rolling back (timeout: {}s)...",
            name, shutdown_timeout
        );
        token.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler(shutdown_timeout: u64) -> Result<CancellationToken, RenameError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\nReceived Ctrl-C. Rolling back (timeout: {}s)...",
                shutdown_timeout
            );
            token.cancel();
        }
    });

    Ok(cancel_token)
}
