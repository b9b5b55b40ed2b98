//! Subcommands.

use std::time::Duration;

use anyhow::Context;
use clap::Subcommand;
use corelib::{DataType, Message, Meta, Node, NodeId, Role, Segment};
use tracing::{debug, info};
use transport::{Transport, Van};

use crate::config::CliConfig;

/// Time given to the kernel to flush the last frames before `stop`
/// discards unsent data.
const DRAIN_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bind as a server and print every message received
    Listen {
        /// Id of this node
        #[arg(long, default_value_t = 8)]
        id: i32,
        /// Port to bind; 0 lets the OS choose
        #[arg(long, default_value_t = 0)]
        port: u16,
        /// Exit after this many messages
        #[arg(long)]
        count: Option<usize>,
    },
    /// Connect to a listening server and send messages to it
    Send {
        /// Id of this node
        #[arg(long, default_value_t = 9)]
        id: i32,
        /// Host of the listener
        #[arg(long, default_value = "127.0.0.1")]
        to_host: String,
        /// Port of the listener
        #[arg(long)]
        to_port: u16,
        /// Id of the listener
        #[arg(long, default_value_t = 8)]
        to_id: i32,
        /// Number of messages
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Payload of every message
        #[arg(long, default_value = "hello")]
        payload: String,
    },
}

/// What a command did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub messages: usize,
    pub bytes: usize,
}

impl Command {
    pub async fn execute(&self, cli: &CliConfig) -> anyhow::Result<CommandResult> {
        let config = cli.transport_config()?;
        match self {
            Command::Listen { id, port, count } => {
                let me = Node::new(Role::Server, cli.host.as_str(), i32::from(*port))
                    .with_id(NodeId(*id));
                let van = Van::new(cli.binding, me, config);
                van.start().await?;
                let bound = van.bind(&van.local_node(), cli.max_retry).await?;
                info!(node = %van.local_node(), binding = van.name(), "listening");
                println!("listening on port {bound}");

                let result = listen(&van, *count).await;
                van.stop().await?;
                result
            }
            Command::Send {
                id,
                to_host,
                to_port,
                to_id,
                count,
                payload,
            } => {
                let me = Node::new(Role::Worker, cli.host.as_str(), Node::EMPTY_PORT)
                    .with_id(NodeId(*id));
                let peer = Node::new(Role::Server, to_host.as_str(), i32::from(*to_port))
                    .with_id(NodeId(*to_id));
                let van = Van::new(cli.binding, me, config);
                van.start().await?;
                van.connect(&peer)
                    .await
                    .with_context(|| format!("connecting to {peer}"))?;

                let mut result = CommandResult::default();
                for head in 0..*count {
                    let mut meta = Meta::default();
                    meta.receiver = peer.id;
                    meta.head = i32::try_from(head)?;
                    meta.request = true;
                    let mut msg = Message::new(meta);
                    msg.add_data(DataType::Char, Segment::copy_from_slice(payload.as_bytes()));
                    result.bytes += van.send(msg).await?;
                    result.messages += 1;
                    debug!(head, "sent");
                }
                tokio::time::sleep(DRAIN_DELAY).await;
                van.stop().await?;
                println!(
                    "sent {} messages ({} bytes) to {peer}",
                    result.messages, result.bytes
                );
                Ok(result)
            }
        }
    }
}

async fn listen(van: &Van, count: Option<usize>) -> anyhow::Result<CommandResult> {
    let mut result = CommandResult::default();
    while count.map_or(true, |n| result.messages < n) {
        let msg = tokio::select! {
            msg = van.receive() => msg?,
            _ = tokio::signal::ctrl_c() => break,
        };
        result.messages += 1;
        result.bytes += msg.data.iter().map(|s| s.len()).sum::<usize>();
        let preview: Vec<String> = msg
            .data
            .iter()
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect();
        println!(
            "from {} head={} control={:?} data={:?}",
            msg.meta.sender, msg.meta.head, msg.meta.control.cmd, preview
        );
    }
    Ok(result)
}
