//! `imux push` command — assemble an image index and push it.

use clap::{Args, Subcommand};
use imux_core::input::IndexSpec;
use imux_core::manifest::ManifestKind;
use imux_core::platform::Platform;
use imux_registry::{assemble, push_index, AssembleOptions, ImageReference, MemoryStore, RegistryHost};

use super::RegistryArgs;

#[derive(Args)]
pub struct PushArgs {
    #[command(subcommand)]
    pub command: PushCommand,
}

#[derive(Subcommand)]
pub enum PushCommand {
    /// Push an index described by a YAML spec file
    FromSpec(FromSpecArgs),
    /// Push an index built from a platform list and an image template
    FromArgs(FromArgsArgs),
}

#[derive(Args)]
pub struct FromSpecArgs {
    /// Path to the YAML spec file
    pub file: std::path::PathBuf,

    #[command(flatten)]
    pub common: CommonPushArgs,
}

#[derive(Args)]
pub struct FromArgsArgs {
    /// Target image reference for the assembled index
    #[arg(long)]
    pub target: String,

    /// Member image template; OS, ARCH and VARIANT are replaced per
    /// platform (e.g. "ghcr.io/org/app:v1-ARCHVARIANT")
    #[arg(long)]
    pub template: String,

    /// Comma-separated platform list (e.g. "linux/amd64,linux/arm64")
    #[arg(long)]
    pub platforms: String,

    #[command(flatten)]
    pub common: CommonPushArgs,
}

#[derive(Args)]
pub struct CommonPushArgs {
    /// Skip (instead of fail on) members that cannot be resolved
    #[arg(long)]
    pub ignore_missing: bool,

    /// Index wire form: "oci" or "docker"
    #[arg(long, default_value = "oci", value_parser = parse_kind)]
    pub kind: ManifestKind,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

fn parse_kind(s: &str) -> Result<ManifestKind, String> {
    ManifestKind::parse(s).ok_or_else(|| format!("unknown index type '{s}' (use oci or docker)"))
}

/// Parse a comma-separated platform list.
pub(crate) fn parse_platforms(s: &str) -> Result<Vec<Platform>, imux_core::ImuxError> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(Platform::parse)
        .collect()
}

pub async fn execute(args: PushArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (spec, common) = match args.command {
        PushCommand::FromSpec(args) => {
            let data = std::fs::read_to_string(&args.file)?;
            (IndexSpec::from_yaml(&data)?, args.common)
        }
        PushCommand::FromArgs(args) => {
            let platforms = parse_platforms(&args.platforms)?;
            let spec = IndexSpec::from_template(&args.target, &args.template, &platforms)?;
            (spec, args.common)
        }
    };

    let target = ImageReference::parse(&spec.image)?;
    let host = RegistryHost::resolve(&target, &common.registry.host_options(true))?;

    // scratch store scoped to this push
    let store = MemoryStore::new();
    let opts = AssembleOptions {
        ignore_missing: common.ignore_missing,
        kind: common.kind,
    };
    let list = assemble(&host, &store, &target, &spec.manifests, &opts).await?;
    let (digest, length) = push_index(&host, &store, &list, &spec.tags).await?;

    println!("Digest: {} {}", digest, length);
    Ok(())
}
