use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use scriptbatch::config::{EngineKind, ScriptBatchConfig};
use scriptbatch::harness;
use scriptbatch::notify::{self, Notifier};
use scriptbatch::source::{FileTaskSource, HttpTaskSource, TaskSource};

#[derive(Parser)]
#[command(
    name = "scriptbatch",
    about = "Run today's scheduled scripts and publish an execution report",
    version,
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults: $SCRIPTBATCH_CONFIG, ./scriptbatch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Read tasks from a local JSON file instead of the task service
    #[arg(long)]
    tasks_file: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    /// HTML report destination
    #[arg(long)]
    report: Option<PathBuf>,

    /// Also write the report as JSON
    #[arg(long)]
    json_report: Option<PathBuf>,

    /// Do not send the report notification
    #[arg(long)]
    no_notify: bool,

    /// Per-script timeout in seconds (0 disables)
    #[arg(long)]
    timeout: Option<u64>,

    /// Engine that runs script bodies
    #[arg(long, value_enum)]
    engine: Option<EngineKind>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch tasks, run the ones due today, publish the report
    Run {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Show which tasks are due today without running anything
    Plan {
        #[command(flatten)]
        source: SourceArgs,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Run local script files as one batch, skipping scheduling
    Exec {
        /// Script files, run in the order given
        #[arg(required = true)]
        scripts: Vec<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ScriptBatchConfig> {
    match path {
        Some(path) => ScriptBatchConfig::load(path),
        None => Ok(ScriptBatchConfig::load_or_default()),
    }
}

fn apply_source(config: &mut ScriptBatchConfig, args: &SourceArgs) {
    if let Some(path) = &args.tasks_file {
        config.source.tasks_file = Some(path.clone());
    }
}

fn apply_run_args(config: &mut ScriptBatchConfig, args: &RunArgs) {
    if let Some(path) = &args.report {
        config.report.path = path.clone();
    }
    if let Some(path) = &args.json_report {
        config.report.json_path = Some(path.clone());
    }
    if args.no_notify {
        config.notify.enabled = false;
    }
    if let Some(secs) = args.timeout {
        config.execution.script_timeout_secs = secs;
    }
    if let Some(engine) = args.engine {
        config.execution.engine = engine;
    }
}

fn task_source(config: &ScriptBatchConfig) -> Result<Box<dyn TaskSource>> {
    Ok(match &config.source.tasks_file {
        Some(path) => Box::new(FileTaskSource::new(path)),
        None => Box::new(HttpTaskSource::new(&config.source)?),
    })
}

fn notifier(config: &ScriptBatchConfig) -> Result<Option<Notifier>> {
    if !config.notify.enabled {
        return Ok(None);
    }
    Ok(Some(Notifier::new(&config.notify)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Run { source, run } => {
            apply_source(&mut config, &source);
            apply_run_args(&mut config, &run);

            let tasks = task_source(&config)?;
            let engine = harness::engine_from_config(&config.execution);
            let notifier = notifier(&config)?;
            let now = chrono::Local::now();

            let outcome =
                scriptbatch::run_once(tasks.as_ref(), engine, &now, &config, notifier.as_ref())
                    .await?;

            for id in &outcome.plan.status_updates {
                println!("status-update: {}", id);
            }
            for rejection in &outcome.plan.rejected {
                println!("rejected: {} ({})", rejection.task_id, rejection.reason);
            }
            match &outcome.report {
                Some(report) => println!(
                    "{} script(s): {} succeeded, {} failed in {}ms. Report: {}",
                    report.summary.total,
                    report.summary.success_count,
                    report.summary.error_count,
                    report.summary.total_duration_ms,
                    config.report.path.display()
                ),
                None => println!("No runnable scripts."),
            }

            if let Some(handle) = outcome.notification {
                notify::settle(handle, config.notify.grace()).await;
            }
        }
        Commands::Plan { source, json } => {
            apply_source(&mut config, &source);

            let tasks = task_source(&config)?
                .fetch()
                .await
                .context("failed to fetch task list")?;
            let plan = scriptbatch::schedule::plan(&tasks, &chrono::Local::now());

            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!(
                    "{} task(s) fetched, {} dropped for missing script text",
                    plan.fetched, plan.dropped
                );
                println!("\n{:<6} | {:<20} | Script", "#", "Task");
                println!("{:-<6}-|-{:-<20}-|-{:-<40}", "", "", "");
                for (index, script) in plan.runnable.iter().enumerate() {
                    let first_line = script.body.lines().next().unwrap_or_default();
                    println!(
                        "{:<6} | {:<20} | {}",
                        index + 1,
                        script.task_id.to_string(),
                        first_line
                    );
                }
                if !plan.status_updates.is_empty() {
                    println!("\nStatus updates due:");
                    for id in &plan.status_updates {
                        println!(" - {}", id);
                    }
                }
                if !plan.rejected.is_empty() {
                    println!("\nRejected:");
                    for rejection in &plan.rejected {
                        println!(" - {}: {}", rejection.task_id, rejection.reason);
                    }
                }
            }
        }
        Commands::Exec { scripts, run } => {
            apply_run_args(&mut config, &run);

            let mut bodies = Vec::with_capacity(scripts.len());
            for path in &scripts {
                let body = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read script {}", path.display()))?;
                bodies.push(body);
            }

            let engine = harness::engine_from_config(&config.execution);
            let notifier = notifier(&config)?;
            let report = scriptbatch::execute(engine, &bodies, &config).await?;
            let pending = scriptbatch::publish(&report, &config, notifier.as_ref())?;

            println!(
                "{} script(s): {} succeeded, {} failed. Report: {}",
                report.summary.total,
                report.summary.success_count,
                report.summary.error_count,
                config.report.path.display()
            );

            if let Some(handle) = pending {
                notify::settle(handle, config.notify.grace()).await;
            }
        }
    }

    Ok(())
}
