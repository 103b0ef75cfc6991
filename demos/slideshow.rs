use std::path::PathBuf;

use clap::Parser;
use env_logger::Builder;
use ibquery_rust::{CommandEmitter, Config, QueryClient};
use log::{info, LevelFilter};

#[derive(Debug, Parser)]
#[command(name = "slideshow")]
#[command(about = "Loop a slideshow on an info-beamer node", long_about = None)]
struct Cli {
    /// TOML configuration file
    config: Option<PathBuf>,
    /// Query server used when no configuration file is given
    #[arg(long, default_value = "127.0.0.1")]
    endpoint: String,
}

fn main() -> Result<(), ibquery_rust::Error> {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("ibquery_rust"), LevelFilter::Debug)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_toml_str(&format!("endpoint_address = {:?}", cli.endpoint))?,
    };

    let client = QueryClient::from_config(&config);
    let node = client.node(config.node.as_str());
    let mut io = node.io(config.raw)?;

    info!("Running slideshow on node {}", node.path());

    let mut emitter = CommandEmitter::from_config(&config);
    match emitter.run(&mut io)? {}
}
