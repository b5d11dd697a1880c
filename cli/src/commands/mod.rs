//! CLI command definitions and dispatch.

mod inspect;
mod push;
mod version;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use imux_registry::HostOptions;

/// imux — assemble and publish multi-architecture image indexes.
#[derive(Parser)]
#[command(name = "imux", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Assemble an image index from member images and push it
    Push(push::PushArgs),
    /// Report which platforms an image provides
    Inspect(inspect::InspectArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Registry connection flags shared by all registry-facing commands.
#[derive(Args, Clone, Default)]
pub struct RegistryArgs {
    /// Registry username
    #[arg(long, default_value = "")]
    pub username: String,

    /// Registry password or token
    #[arg(long, default_value = "")]
    pub password: String,

    /// Skip TLS certificate verification for the registry
    #[arg(long)]
    pub insecure: bool,

    /// Talk to the registry over HTTP instead of HTTPS
    #[arg(long)]
    pub plain_http: bool,

    /// Credential configuration file or directory
    #[arg(long, value_name = "PATH")]
    pub auth_config: Option<PathBuf>,
}

impl RegistryArgs {
    /// Convert the flags into host resolution options.
    pub fn host_options(&self, for_push: bool) -> HostOptions {
        HostOptions {
            username: self.username.clone(),
            password: self.password.clone(),
            insecure: self.insecure,
            plain_http: self.plain_http,
            auth_config: self.auth_config.clone(),
            for_push,
        }
    }
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Push(args) => push::execute(args).await,
        Command::Inspect(args) => inspect::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}
