//! science CLI: run the demo experiments against a chosen reporter.

use std::fmt::{Debug, Display};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use science::{
    DeepEquality, Experiment, ExperimentOptions, JsonReporter, Reporter, SimpleReporter,
    StatsReporter, StatsdConfig, TracingReporter,
};

#[derive(Parser)]
#[command(
    name = "science",
    about = "🔬 science-rs: run control and candidate code paths side by side",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Where experiment results are reported
    #[arg(long, short, global = true, value_enum, default_value_t = ReporterKind::Simple)]
    reporter: ReporterKind,
    /// StatsD agent address (overrides the config file)
    #[arg(long, global = true)]
    statsd_addr: Option<String>,
    /// YAML file with statsd settings (address, prefix)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Run the candidate on its own thread
    #[arg(long, global = true)]
    concurrent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReporterKind {
    /// One text line per run on stderr
    Simple,
    /// One JSON object per run on stdout
    Json,
    /// Structured log events
    Tracing,
    /// DogStatsD metrics over UDP
    Statsd,
}

#[derive(Subcommand)]
enum Commands {
    /// Control returns a value quickly, candidate fails slowly
    Simple,
    /// Fetch users through the existing path and a flaky replacement
    FetchUsers {
        /// User ids to fetch
        #[arg(default_values = ["user-123", "user-456"])]
        ids: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct User {
    id: String,
    name: String,
}

fn main() -> Result<()> {
    // Logs go to stderr so JSON reports on stdout stay parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Simple => cmd_simple(&cli)?,
        Commands::FetchUsers { ids } => cmd_fetch_users(&cli, ids)?,
    }

    Ok(())
}

// ─── Command implementations ──────────────────────────────────────────────────

fn cmd_simple(cli: &Cli) -> Result<()> {
    let reporter = build_reporter::<String>(cli)?;
    let mut experiment =
        Experiment::with_options("simple", ExperimentOptions::new(DeepEquality, reporter));

    experiment.control(|| {
        thread::sleep(Duration::from_millis(10));
        Ok("some value".to_string())
    });
    experiment.candidate(|| {
        thread::sleep(Duration::from_millis(60));
        Err(anyhow!("unable to fetch value"))
    });

    let value = run(&experiment, cli.concurrent)?;
    print_summary(&[("simple".to_string(), "-".to_string(), value)]);
    Ok(())
}

fn cmd_fetch_users(cli: &Cli, ids: &[String]) -> Result<()> {
    let reporter = build_reporter::<User>(cli)?;

    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        let user = fetch_value_from_server(id, Arc::clone(&reporter), cli.concurrent)?;
        rows.push(("fetch_users".to_string(), id.clone(), user.name));
    }

    print_summary(&rows);
    Ok(())
}

/// The code path being refactored: the control is the current lookup, the
/// candidate only knows about `user-456`.
fn fetch_value_from_server(
    id: &str,
    reporter: Arc<dyn Reporter<User, anyhow::Error>>,
    concurrent: bool,
) -> Result<User> {
    let mut experiment =
        Experiment::with_options("fetch_users", ExperimentOptions::new(DeepEquality, reporter));

    let control_id = id.to_string();
    experiment.control(move || {
        thread::sleep(Duration::from_millis(10));
        Ok(User {
            id: control_id.clone(),
            name: "Chris".to_string(),
        })
    });

    let candidate_id = id.to_string();
    experiment.candidate(move || {
        if candidate_id == "user-456" {
            thread::sleep(Duration::from_millis(5));
            return Ok(User {
                id: candidate_id.clone(),
                name: "Chris".to_string(),
            });
        }
        thread::sleep(Duration::from_millis(60));
        Err(anyhow!("unable to fetch user"))
    });

    run(&experiment, concurrent)
}

// ─── Utilities ────────────────────────────────────────────────────────────────

fn run<T, E>(experiment: &Experiment<T, E>, concurrent: bool) -> std::result::Result<T, E>
where
    T: Send,
    E: Display + Send + 'static,
{
    if concurrent {
        experiment.run_concurrent()
    } else {
        experiment.run()
    }
}

fn build_reporter<T>(cli: &Cli) -> Result<Arc<dyn Reporter<T, anyhow::Error>>>
where
    T: Debug + Serialize + 'static,
{
    let reporter: Arc<dyn Reporter<T, anyhow::Error>> = match cli.reporter {
        ReporterKind::Simple => Arc::new(SimpleReporter::stderr()),
        ReporterKind::Json => Arc::new(JsonReporter::stdout()),
        ReporterKind::Tracing => Arc::new(TracingReporter),
        ReporterKind::Statsd => {
            let config = statsd_config(cli)?;
            info!(address = %config.address, prefix = %config.prefix, "Reporting to statsd");
            Arc::new(StatsReporter::from_config(&config)?)
        }
    };
    Ok(reporter)
}

fn statsd_config(cli: &Cli) -> Result<StatsdConfig> {
    let mut config = match &cli.config {
        Some(path) => StatsdConfig::from_yaml_file(path)?,
        None => StatsdConfig::default(),
    };
    if let Some(address) = &cli.statsd_addr {
        config.address = address.clone();
    }
    Ok(config)
}

fn print_summary(rows: &[(String, String, String)]) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["Experiment", "Input", "Control result"]);
    for (experiment, input, result) in rows {
        table.add_row([experiment.as_str(), input.as_str(), result.as_str()]);
    }
    println!("{}", table);
}
