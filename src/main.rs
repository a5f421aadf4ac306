use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod scrape;
#[cfg(test)]
mod tests;
mod web;

use config::Config;
use scrape::{http::ReqwestTransport, Scraper};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(command: cli::Command, config: Config) -> anyhow::Result<()> {
    let transport = Arc::new(ReqwestTransport::new(&config)?);
    let scraper = Arc::new(Scraper::new(transport, config.scrape.clone()));

    match command {
        cli::Command::Serve { listen } => {
            let listen = listen.unwrap_or(config.listen);
            web::serve(&listen, scraper).await
        }

        cli::Command::Scrape { url, favicon: true } => {
            let favicon = scraper.favicon(&url).await?;
            println!("{}", serde_json::to_string_pretty(&favicon)?);
            Ok(())
        }

        cli::Command::Scrape { url, favicon: false } => {
            let record = scraper.scrape(&url).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    init_logging();

    let config = Config::load(args.config.as_deref())?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(args.command, config))
}
