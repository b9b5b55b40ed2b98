//! Command line options.

use clap::Parser;
use transport::{BindingKind, TransportConfig};

use crate::commands::{Command, CommandResult};

/// Smoke-test a cluster transport from the shell.
#[derive(Debug, Parser)]
#[command(name = "van", version, about)]
pub struct CliConfig {
    /// Channel discipline: `reliable` or `multicast`
    #[arg(long, default_value = "reliable")]
    pub binding: BindingKind,

    /// Address this node advertises
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Use `ipc:///tmp/<port>` sockets (also enabled by PS_LOCAL=1)
    #[arg(long)]
    pub local: bool,

    /// Fallback ports tried when the requested one is taken
    #[arg(long, default_value_t = 40)]
    pub max_retry: usize,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    pub fn transport_config(&self) -> transport::Result<TransportConfig> {
        let config = TransportConfig::from_env()?;
        let local = config.local || self.local;
        Ok(config.local(local))
    }

    /// Run the selected command on a fresh tokio runtime.
    pub fn run(self) -> anyhow::Result<CommandResult> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.command.execute(&self))
    }
}
