mod cancel;
mod config;
mod error;
mod geocode;
mod http;
mod orchestrator;
mod places;
mod presenter;
mod trigger;
mod types;

use anyhow::{anyhow, Result};
use clap::Parser;
use config::Config;
use env_logger::Env;
use geocode::Nominatim;
use log::{error, info};
use orchestrator::{Outcome, SearchOrchestrator, SearchSettings};
use places::Wikipedia;
use presenter::{Format, TerminalPresenter};
use std::sync::Arc;
use tokio::sync::mpsc::channel;

#[derive(Parser, Debug)]
#[command(
    name = "placefinder",
    version,
    about = "Find notable places near a destination"
)]
struct Cli {
    #[arg(long, help = "Print places as a JSON array instead of cards")]
    json: bool,
    #[command(flatten)]
    config: Config,
    #[arg(
        value_name = "DESTINATION",
        help = "Destination to search (default: read one destination per line from stdin)"
    )]
    destination: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    info!("Starting placefinder");

    let client = cli.config.http_client()?;
    let format = if cli.json { Format::Json } else { Format::Cards };
    let orchestrator = Arc::new(SearchOrchestrator::new(
        Arc::new(Nominatim::new(client.clone(), &cli.config)),
        Arc::new(Wikipedia::new(client, &cli.config)),
        Arc::new(TerminalPresenter::new(std::io::stdout(), format)),
        SearchSettings::from(&cli.config),
    ));

    if !cli.destination.is_empty() {
        let destination = cli.destination.join(" ");
        return match orchestrator.search(&destination).await {
            Outcome::Ignored => Err(anyhow!("destination must not be blank")),
            Outcome::Failed => Err(anyhow!("search for {:?} failed", destination.trim())),
            _ => Ok(()),
        };
    }

    let (tx, rx) = channel(8);
    std::thread::spawn(move || trigger::read_stdin(tx));
    let search_task = tokio::spawn(trigger::run(
        rx,
        orchestrator.clone(),
        cli.config.debounce(),
    ));
    tokio::select! {
        result = search_task => {
            if let Err(e) = result {
                error!("Search task failed: {}", e);
            }
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Unable to listen for interrupt: {}", e);
            }
            info!("Interrupted; cancelling search");
            orchestrator.cancel();
        }
    }
    info!("Exiting main");
    Ok(())
}
