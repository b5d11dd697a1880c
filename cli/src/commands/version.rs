//! `imux version` command.

use clap::Args;

#[derive(Args)]
pub struct VersionArgs {}

pub async fn execute(_args: VersionArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("imux {}", env!("CARGO_PKG_VERSION"));
    println!("engine {}", imux_registry::VERSION);
    Ok(())
}
