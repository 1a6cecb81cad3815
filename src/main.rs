//! Remediator - runbook execution engine for incident remediation.
//!
//! Thin command-line front end over the library: inspect the runbook
//! catalog, validate definitions and execute a runbook against a context.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use remediator::core::{Config, LoggingConfig};
use remediator::runbook::{
    scan_runbook_dir, Context, ExecuteOptions, ExecutionStatus, RunbookExecutor,
};

/// Runbook execution engine for automated incident remediation
#[derive(Parser)]
#[command(name = "remediator")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to .remediator.toml, then the user config dir)
    #[arg(short, long, global = true, env = "REMEDIATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Runbook directory (overrides the configured one)
    #[arg(short, long, global = true)]
    runbooks_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List loaded runbooks
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show a runbook definition
    Show {
        /// Runbook id
        id: String,
    },

    /// Validate every runbook file in a directory
    Validate {
        /// Directory to validate (defaults to the runbook directory)
        dir: Option<PathBuf>,
    },

    /// Execute a runbook and print the execution record
    Run {
        /// Runbook id
        id: String,

        /// Context as a JSON object
        #[arg(long)]
        context: Option<String>,

        /// Context file (JSON or YAML object)
        #[arg(long)]
        context_file: Option<PathBuf>,

        /// Issue id to attach to the execution
        #[arg(long)]
        issue: Option<String>,

        /// Resolve and record steps without invoking actions
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config loading logs through a scoped subscriber until the configured
    // level is known.
    let bootstrap_level = std::env::var("REMEDIATOR_LOG_LEVEL")
        .ok()
        .filter(|level| !level.trim().is_empty())
        .unwrap_or_else(|| LoggingConfig::default().level);
    let mut config = tracing::subscriber::with_default(
        subscriber(log_filter(cli.verbose, &bootstrap_level)),
        || match &cli.config {
            Some(path) => Config::load_path(path),
            None => Config::load(),
        },
    )?;
    if let Some(dir) = &cli.runbooks_dir {
        config.engine.runbooks_dir.clone_from(dir);
    }

    subscriber(log_filter(cli.verbose, &config.logging.level)).init();

    match cli.command {
        Commands::List { format } => cmd_list(&config, &format),
        Commands::Show { id } => cmd_show(&config, &id),
        Commands::Validate { dir } => {
            cmd_validate(dir.as_deref().unwrap_or(config.engine.runbooks_dir.as_path()))
        }
        Commands::Run { id, context, context_file, issue, dry_run } => {
            let context = build_context(context.as_deref(), context_file.as_deref())?;
            let mut options = ExecuteOptions { issue_id: issue, ..Default::default() };
            if dry_run {
                options = options.dry_run(true);
            }
            cmd_run(&config, &id, context, options)
        }
    }
}

/// Log filter: `debug` with `--verbose`, otherwise `level` (falling back to `warn`).
fn log_filter(verbose: bool, level: &str) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

fn subscriber(filter: EnvFilter) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
}

/// List the runbook catalog.
fn cmd_list(config: &Config, format: &str) -> Result<()> {
    let executor = RunbookExecutor::from_config(config, None);
    let runbooks = executor.loader().list();

    match format {
        "json" => {
            let entries: Vec<_> = runbooks
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "id": r.id,
                        "name": r.name,
                        "description": r.description,
                        "steps": r.step_count(),
                        "rollback_steps": r.rollback.len(),
                        "patterns": r.pattern_ids().collect::<Vec<_>>(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            for runbook in &runbooks {
                let patterns: Vec<_> = runbook.pattern_ids().collect();
                let triggers = if patterns.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", patterns.join(", "))
                };
                println!(
                    "{} - {} ({} steps, {} rollback){triggers}",
                    runbook.id,
                    runbook.name,
                    runbook.step_count(),
                    runbook.rollback.len(),
                );
            }
            println!("\nTotal: {} runbooks", runbooks.len());
        }
    }

    Ok(())
}

/// Print one runbook as YAML.
fn cmd_show(config: &Config, id: &str) -> Result<()> {
    let executor = RunbookExecutor::from_config(config, None);
    let runbook =
        executor.loader().get(id).ok_or_else(|| anyhow::anyhow!("Runbook not found: {id}"))?;

    print!("{}", serde_yaml::to_string(runbook.as_ref())?);
    Ok(())
}

/// Parse every definition in `dir` and report failures.
fn cmd_validate(dir: &Path) -> Result<()> {
    let results =
        scan_runbook_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut failures = 0;
    for (path, result) in &results {
        match result {
            Ok(runbook) => println!("ok      {} ({})", path.display(), runbook.id),
            Err(e) => {
                failures += 1;
                println!("invalid {}: {e}", path.display());
            }
        }
    }

    println!("\n{} files, {} invalid", results.len(), failures);
    if failures > 0 {
        anyhow::bail!("{failures} runbook file(s) failed validation");
    }
    Ok(())
}

/// Execute a runbook and print the execution export.
fn cmd_run(config: &Config, id: &str, context: Context, options: ExecuteOptions) -> Result<()> {
    let executor = RunbookExecutor::from_config(config, None);

    let rt = tokio::runtime::Runtime::new()?;
    let execution = rt.block_on(executor.execute(id, context, options));

    println!("{}", serde_json::to_string_pretty(&execution.to_json())?);

    if execution.status != ExecutionStatus::Success {
        std::process::exit(1);
    }
    Ok(())
}

/// Merge the context file and the inline context; inline keys win.
fn build_context(inline: Option<&str>, file: Option<&Path>) -> Result<Context> {
    let mut context = Context::new();

    if let Some(path) = file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let from_file: Context = serde_yaml::from_str(&content)
            .with_context(|| format!("Context file {} is not an object", path.display()))?;
        context.extend(from_file);
    }

    if let Some(inline) = inline {
        let from_arg: Context =
            serde_json::from_str(inline).context("--context must be a JSON object")?;
        context.extend(from_arg);
    }

    Ok(context)
}
