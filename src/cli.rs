use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Link-preview metadata scraper", long_about = None)]
pub struct Args {
    /// Path to a YAML config file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP service
    Serve {
        /// Address to listen on, overrides the config
        #[clap(short, long)]
        listen: Option<String>,
    },

    /// Scrape a single url and print the result as json
    Scrape {
        /// a url
        url: String,

        /// Only resolve the favicon
        #[clap(long, default_value = "false")]
        favicon: bool,
    },
}
