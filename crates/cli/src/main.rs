//! CLI entry point for the van transport.

use clap::Parser;
use cli::CliConfig;
use transport::TransportError;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = CliConfig::parse();
    if let Err(e) = config.run() {
        if let Some(fatal) = e.downcast_ref::<TransportError>().filter(|t| t.is_fatal()) {
            tracing::error!(error = %fatal, "fatal transport error");
        }
        return Err(e);
    }
    Ok(())
}
