use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use package_editor::api::{BackendClient, PackageStore};
use package_editor::carousel;
use package_editor::config;
use package_editor::draft::Command;
use package_editor::editor::{EditorSession, PackageEditor};
use package_editor::model::{PackageForm, ParentRef, SubResource};

#[derive(Debug, Parser)]
#[command(author, version, about = "Stage and save travel package sub-resources")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Print a package's sub-resource collection as a draft view
    Show {
        #[arg(long)]
        package: i64,
        #[arg(long)]
        kind: SubResource,
    },
    /// Apply a YAML list of draft commands to one collection and save it
    Apply {
        #[arg(long)]
        package: i64,
        #[arg(long)]
        kind: SubResource,
        #[arg(long)]
        script: PathBuf,
    },
    /// Create or update a package from a YAML form, then save its drafts
    Submit {
        #[arg(long)]
        form: PathBuf,
        /// Existing package id; omit to create a new package
        #[arg(long)]
        package: Option<i64>,
    },
    /// Reorder promoted packages in the carousel
    Carousel {
        /// Package ids in display order
        #[arg(long, value_delimiter = ',')]
        order: Vec<i64>,
    },
}

/// Package form plus per-kind draft commands.
#[derive(Debug, Deserialize)]
struct SubmitFile {
    package: PackageForm,
    #[serde(default)]
    edits: BTreeMap<SubResource, Vec<Command>>,
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("invalid YAML in {}", path.display()))
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
    let policy = cfg.editor.remove_existing;
    let backend = BackendClient::from_config(&cfg)?;

    match args.command {
        Cmd::Show { package, kind } => {
            let mut session = EditorSession::new(&backend, policy);
            let view = session.open(ParentRef::package(package), kind).await?;
            print!("{}", view);
        }
        Cmd::Apply { package, kind, script } => {
            let commands: Vec<Command> = read_yaml(&script)?;
            let parent = ParentRef::package(package);
            let mut session = EditorSession::new(&backend, policy);
            session.open(parent.clone(), kind).await?;
            for command in commands {
                let view = session.dispatch(command).await?;
                print!("{}", view);
            }
            let outcome = session.save(&parent).await?;
            println!("{}", outcome.notification());
            if !outcome.is_clean() {
                bail!("{} change(s) failed", outcome.report.failures.len());
            }
        }
        Cmd::Submit { form, package } => {
            let file: SubmitFile = read_yaml(&form)?;
            let mut editor = match package {
                Some(id) => PackageEditor::edit(&backend, &backend, policy, id),
                None => PackageEditor::create(&backend, &backend, policy),
            };
            for (kind, commands) in file.edits {
                editor.session(kind).await?;
                for command in commands {
                    editor.dispatch(kind, command).await?;
                }
            }
            let outcome = editor.submit(&file.package).await?;
            println!("{}", outcome.notification());
            for (kind, err) in &outcome.aborted {
                warn!(%kind, %err, "draft not saved");
            }
            if !outcome.is_clean() {
                bail!("package saved with failed sub-resource changes");
            }
        }
        Cmd::Carousel { order } => {
            if order.is_empty() {
                return Err(anyhow!("--order needs at least one package id"));
            }
            let packages = backend.list_packages().await?;
            let assignments = carousel::plan(&packages, &order)?;
            if assignments.is_empty() {
                info!("carousel already in the requested order");
                return Ok(());
            }
            let failures = carousel::apply(&backend, &assignments).await;
            println!(
                "Carousel updated: {} of {} positions saved",
                assignments.len() - failures.len(),
                assignments.len()
            );
            if !failures.is_empty() {
                bail!("{} carousel update(s) failed", failures.len());
            }
        }
    }

    Ok(())
}
