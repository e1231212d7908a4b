use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use package_editor::api::{BackendClient, PackageStore, RemoteCollection};
use package_editor::config;
use package_editor::model::{ParentRef, SubResource};

#[derive(Parser, Debug)]
#[command(about = "Print a package and every sub-resource collection as the backend returns them")]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Package ID to inspect
    #[arg(long)]
    package: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load_with_base_url(Some(&args.config), std::env::var("API_BASE_URL").ok())?;
    let backend = BackendClient::from_config(&cfg)?;

    let packages = backend.list_packages().await?;
    match packages.iter().find(|p| p.id == args.package) {
        Some(pkg) => println!(
            "Package {}: {} ({}, promoted: {}, carousel: {})",
            pkg.id, pkg.form.title, pkg.form.price, pkg.form.promoted, pkg.form.carousel_order
        ),
        None => println!("Package {} not in listing", args.package),
    }

    let parent = ParentRef::package(args.package);
    for kind in SubResource::ALL {
        match backend.list(&parent, kind).await {
            Ok(items) => {
                println!("{} ({}):", kind, items.len());
                for item in items {
                    println!("  #{} {}", item.id, serde_json::to_string(&item.fields)?);
                }
            }
            Err(err) => println!("{}: error: {}", kind, err),
        }
    }
    Ok(())
}
