//! `imux inspect` command — report which platforms an image provides.

use clap::Args;
use imux_registry::{inspect, ImageReference, ImageSummary, MemoryStore, RegistryHost};

use super::RegistryArgs;
use crate::output::new_table;

#[derive(Args)]
pub struct InspectArgs {
    /// Image reference (e.g., "alpine:latest", "ghcr.io/org/image:tag")
    pub image: String,

    /// Print the raw JSON summary instead of the report
    #[arg(long)]
    pub raw: bool,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

pub async fn execute(args: InspectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let reference = ImageReference::parse(&args.image)?;
    let host = RegistryHost::resolve(&reference, &args.registry.host_options(false))?;

    // scratch store scoped to this inspection
    let store = MemoryStore::new();
    let summary = inspect(&host, &store, &reference).await?;

    if args.raw {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &ImageSummary) {
    println!("Image: {}", summary.image_name);
    println!(" * Manifest List: {}", if summary.is_list { "Yes" } else { "No" });
    println!(" * Digest: {}", summary.digest);
    println!(" * Media Type: {}", summary.media_type);

    if summary.is_list {
        println!(" * Supported platforms:");
        let mut table = new_table(&["", "OS", "ARCH", "VARIANT", "OS VERSION"]);
        for platform in &summary.platforms {
            table.add_row(vec![
                "  -".to_string(),
                platform.os.clone(),
                platform.architecture.clone(),
                platform.variant.clone().unwrap_or_default(),
                platform.os_version.clone().unwrap_or_default(),
            ]);
        }
        println!("{table}");
    } else if let Some(platform) = summary.platforms.first() {
        println!(" * Supports: {}", platform);
    }
    println!();
}
