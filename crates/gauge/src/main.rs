//! gauge - run acceptance specs and serve the IDE API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use eyre::Result;
use gauge::api;
use gauge::config::GaugeConfig;
use gauge::execution;
use gauge::formatter;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gauge", version, about = "Markdown-driven acceptance testing")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run specifications
    Run {
        /// Tag expression selecting scenarios, e.g. "smoke & !wip"
        #[arg(long)]
        tags: Option<String>,

        /// Number of parallel execution streams
        #[arg(short = 'n', long, default_value_t = 1)]
        streams: usize,
    },

    /// Serve the API for IDE integrations until killed
    Daemon {
        /// Port to bind; defaults to GAUGE_API_PORT
        #[arg(long)]
        port: Option<u16>,
    },

    /// Rewrite spec files into canonical form
    Format {
        /// Files to format; defaults to every spec in the project
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(GaugeConfig::from_env()?);

    match cli.command {
        Command::Run { tags, streams } => run_specs(config, tags, streams).await,
        Command::Daemon { port } => api::run_in_background(config, port).await,
        Command::Format { files } => format_files(&config, files),
    }
}

async fn run_specs(config: Arc<GaugeConfig>, tags: Option<String>, streams: usize) -> Result<()> {
    // An unparseable tag expression aborts before anything runs.
    if let Some(tags) = &tags {
        gauge_core::TagExpression::validate(tags)?;
    }

    let specs = gauge::parse_project_specs(&config.specs_dir())?;
    let result = execution::execute(config, specs, tags.as_deref(), streams).await?;

    let executed = result.spec_results.len();
    let failed = result.specs_failed_count;
    println!(
        "Specifications: {executed} executed, {} passed, {} failed, {} skipped",
        (executed - failed).to_string().green(),
        failed.to_string().red(),
        result.specs_skipped_count
    );
    for error in &result.unhandled_errors {
        eprintln!("{}", error.to_string().red());
    }
    println!("Total time: {:?}", result.execution_time);

    if result.is_failed {
        std::process::exit(1);
    }
    Ok(())
}

fn format_files(config: &GaugeConfig, files: Vec<PathBuf>) -> Result<()> {
    let files = if files.is_empty() {
        gauge_core::util::find_spec_files(&config.specs_dir())
    } else {
        files
    };
    let mut failed = false;
    for result in formatter::format_spec_files(&files) {
        for warning in &result.warnings {
            eprintln!("{} {warning}", "warning:".yellow());
        }
        if let Some(error) = &result.error {
            eprintln!("{} {error}", "error:".red());
            failed = true;
        }
    }
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
