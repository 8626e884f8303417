mod capture;
mod cli;
mod config;
mod encode;
mod error;
mod server;
mod snapshot;
mod stream;

use anyhow::Result;
use cli::{Cli, Commands};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Serve { addr, capture } => {
            let config = capture.into_config(Some(addr));
            config.validate()?;
            server::start_server(config).await?;
        }
        Commands::Snapshot {
            source,
            output,
            capture,
        } => {
            let config = capture.into_config(None);
            snapshot::take_snapshot(source, config, PathBuf::from(output)).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("webcamstream={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
