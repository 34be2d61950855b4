//! Brokerbot CLI entry point.
//!
//! `run` executes one full pipeline pass against a stored negotiation
//! case; `check` validates the run preconditions without touching the
//! language service. Both print the result as JSON on stdout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use brokerbot::agent::{orchestrator, NegotiationAgent};
use brokerbot::config::BrokerConfig;
use brokerbot::llm::openai::OpenAiClient;
use brokerbot::llm::{AnalysisService, DraftingService};
use brokerbot::logging;
use brokerbot::store::JsonFileStore;

#[derive(Debug, Parser)]
#[command(
    name = "brokerbot",
    about = "Automated freight price negotiation agent",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run the negotiation pipeline once for a stored case")]
    Run {
        #[arg(long, help = "Path to the negotiation case JSON file")]
        file: PathBuf,
    },
    #[command(about = "Validate run preconditions without calling the language service")]
    Check {
        #[arg(long, help = "Path to the negotiation case JSON file")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Run { file } => run_pipeline(&file).await,
        Command::Check { file } => check_case(&file).await,
    }
}

/// Execute one full pipeline pass and print the resulting state.
async fn run_pipeline(file: &Path) -> Result<()> {
    let config = BrokerConfig::load().context("failed to load configuration")?;
    let _guard = logging::init_production(Path::new(&config.paths.logs_dir), &config.log_level.0)
        .context("failed to initialise logging")?;

    let api_key = config
        .llm
        .api_key
        .clone()
        .context("no API key configured; set BROKERBOT_LLM_API_KEY or [llm].api_key")?;
    let client = Arc::new(OpenAiClient::new(
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        api_key,
    ));

    let store = JsonFileStore::new(file);
    let case = store
        .load_case()
        .await
        .with_context(|| format!("failed to load case from {}", file.display()))?;

    let agent = NegotiationAgent::new(
        Arc::clone(&client) as Arc<dyn AnalysisService>,
        client as Arc<dyn DraftingService>,
    );
    let state = agent.run(&case.snapshot, &case.policy).await;

    let rendered =
        serde_json::to_string_pretty(&state).context("failed to serialize pipeline state")?;
    println!("{rendered}");
    Ok(())
}

/// Validate preconditions for a stored case and print the target price.
async fn check_case(file: &Path) -> Result<()> {
    logging::init_cli();

    let store = JsonFileStore::new(file);
    let case = store
        .load_case()
        .await
        .with_context(|| format!("failed to load case from {}", file.display()))?;

    match orchestrator::validate_preconditions(&case.snapshot) {
        Ok(target) => {
            let rendered = serde_json::to_string_pretty(&serde_json::json!({
                "ok": true,
                "negotiation_id": case.snapshot.id,
                "target": target,
            }))
            .context("failed to serialize check result")?;
            println!("{rendered}");
            Ok(())
        }
        Err(e) => {
            let rendered = serde_json::to_string_pretty(&serde_json::json!({
                "ok": false,
                "negotiation_id": case.snapshot.id,
                "error": e.to_string(),
            }))
            .context("failed to serialize check result")?;
            println!("{rendered}");
            std::process::exit(1);
        }
    }
}
