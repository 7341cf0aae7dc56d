mod cli;

use clap::Parser;
use cli::{Cli, Commands, ExportArgs};
use std::sync::Arc;

use exportbox::config::Config;
use exportbox::events::EventBus;
use exportbox::ledger::{StatusLedger, Trigger};
use exportbox::observability::{Metrics, init_tracing};
use exportbox::pipeline::{ExportPipeline, ExportRunner};
use exportbox::source::MemoryStore;

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    init_tracing("info");

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Serve(args) => exportbox::api::run(config, args.address).await?,
        Commands::Export(args) => export_once(config, args).await?,
        Commands::Config => print!("{}", config.to_toml()?),
    }

    Ok(())
}

async fn export_once(mut config: Config, args: ExportArgs) -> Result<(), AnyError> {
    if args.overwrite {
        config.export.timestamped_manual_names = false;
    }

    let ledger = StatusLedger::open(&config.server.ledger_path)?;
    let store = MemoryStore::from_config(&config.source, EventBus::default())?;
    let pipeline = ExportPipeline::from_config(
        &config,
        Arc::new(store),
        ledger.clone(),
        Arc::new(Metrics::new()),
    )?;

    let record = pipeline.force_export(Trigger::Manual).await;
    ledger.persist()?;
    println!("{}", serde_json::to_string_pretty(&record)?);

    if !record.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
