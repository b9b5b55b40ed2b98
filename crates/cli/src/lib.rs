//! Command line front end for the transport.
//!
//! Provides commands for:
//! - Listening as a server and printing what arrives
//! - Connecting to a listener and sending test messages

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;
