use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

use attendee_profiler::apis::create_orchestrator;
use attendee_profiler::config::Config;
use attendee_profiler::domain::{AttributeCategory, IndividualRequirements};
use attendee_profiler::{logging, metrics};

#[derive(Parser)]
#[command(name = "attendee-profiler")]
#[command(about = "Collect and match confidence-weighted facts about event attendees")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file (defaults to $PROFILER_CONFIG or profiler.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write JSON logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a collection session and print the session report
    Run {
        /// Include the enriched individuals in the output
        #[arg(long)]
        individuals: bool,
    },
    /// Run a session, then list individuals meeting the requirements
    Find {
        /// Extra requirement as category=min_reliability (repeatable)
        #[arg(long = "require", value_name = "CATEGORY=MIN")]
        require: Vec<String>,
        /// Restrict candidates to one show
        #[arg(long)]
        show: Option<String>,
    },
    /// Print the attribute catalog and the configured schema
    Schema,
}

fn parse_requirement(raw: &str) -> anyhow::Result<(AttributeCategory, f64)> {
    let (category, min) = raw
        .split_once('=')
        .with_context(|| format!("expected CATEGORY=MIN, got '{}'", raw))?;
    let category: AttributeCategory = category.parse()?;
    let min: f64 = min
        .trim()
        .parse()
        .with_context(|| format!("invalid reliability in '{}'", raw))?;
    Ok((category, min))
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(&path),
        None => Config::load(),
    };
    Ok(config?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _guard = logging::init_logging(cli.log_dir.as_deref());
    metrics::init_metrics();

    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Run { individuals } => {
            let mut orchestrator = create_orchestrator(&config)?;
            let report = orchestrator.run().await?;
            let failed = report.failed().count();
            if failed > 0 {
                warn!("{} collector(s) failed", failed);
            }
            let mut output = serde_json::to_value(report.summary())?;
            if individuals {
                output["individuals"] = serde_json::to_value(report.individuals())?;
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Find { require, show } => {
            let mut requirements: IndividualRequirements = config.requirements()?;
            if show.is_some() {
                requirements.show = show;
            }
            for raw in &require {
                let (category, min) = parse_requirement(raw)?;
                requirements.require(category, min)?;
            }

            let mut orchestrator = create_orchestrator(&config)?;
            let report = orchestrator.run().await?;
            match report.find_suitable(&requirements) {
                Ok(found) => {
                    info!("{} individual(s) satisfy the requirements", found.len());
                    println!("{}", serde_json::to_string_pretty(&found)?);
                }
                Err(unsatisfiable) => {
                    warn!("{}", unsatisfiable);
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({
                            "unsatisfiable": true,
                            "requirements": unsatisfiable.requirements,
                            "candidates": unsatisfiable.candidates,
                        }))?
                    );
                }
            }
        }
        Commands::Schema => {
            let mut orchestrator = create_orchestrator(&config)?;
            orchestrator.seal()?;
            let catalog: Vec<_> = AttributeCategory::ALL
                .iter()
                .map(|c| json!({"category": c, "representation": c.representation()}))
                .collect();
            let declared: serde_json::Map<String, serde_json::Value> = orchestrator
                .registry()
                .declarations()
                .into_iter()
                .map(|(key, category)| (key.to_string(), json!(category)))
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "catalog": catalog,
                    "namespaces": orchestrator.registry().namespaces(),
                    "attributes": declared,
                }))?
            );
        }
    }
    Ok(())
}
