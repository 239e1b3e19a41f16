use std::path::PathBuf;

use clap::Parser;

mod commands;
mod settings;

use commands::Command;

/// xbus - command line client for the xbus config and service registry
#[derive(Parser, Debug)]
#[command(name = "xbus")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Client configuration file (JSON). Defaults to $XBUS_CONFIG, then
    /// <config dir>/xbus/config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server endpoint; overrides the one in the configuration file
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let result = match settings::load(args.config, args.endpoint) {
        Ok(config) => commands::run(config, args.command).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
