//! Podscout - bundle discovery and stack synthesis over node snapshots.

use anyhow::Context;
use clap::{Parser, Subcommand};
use podscout_bundle_schema::{NodeSnapshot, ServiceBundle, Severity};
use podscout_discovery::{build_service_bundles_for_node, generate_stack_preview, parse_unit_file};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "podscout")]
#[command(
    author,
    version,
    about = "Discover logical service bundles on a host and synthesize pod stacks"
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run bundle discovery over one or more node snapshots
    Discover {
        /// Node snapshot JSON file(s), one per node
        #[arg(required = true)]
        snapshots: Vec<PathBuf>,

        /// Emit the full bundle list as JSON instead of a summary table
        #[arg(long)]
        json: bool,

        /// Write output to a file instead of stdout
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Render the deployable stack preview for one bundle
    Preview {
        /// Node snapshot JSON file
        #[arg(long)]
        snapshot: PathBuf,

        /// Bundle id (`node::name`) or display name
        #[arg(long)]
        bundle: String,

        /// Override the generated stack name
        #[arg(long)]
        name: Option<String>,
    },

    /// Parse a unit file and print its directives as JSON
    ParseUnit {
        /// Unit file path (.container, .pod, .kube or .service)
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    match cli.command {
        Commands::Discover {
            snapshots,
            json,
            out,
        } => {
            // One blocking task per node; runs share nothing.
            let mut tasks = Vec::new();
            for path in snapshots {
                tasks.push(tokio::task::spawn_blocking(move || discover_file(&path)));
            }
            let mut bundles: Vec<ServiceBundle> = Vec::new();
            for task in tasks {
                bundles.extend(task.await??);
            }
            info!("discovered {} bundle(s)", bundles.len());

            let rendered = if json {
                serde_json::to_string_pretty(&bundles)?
            } else {
                summary_table(&bundles)
            };
            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("writing output to {:?}", path))?;
                    info!("output written to {:?}", path);
                }
                None => println!("{}", rendered),
            }
        }

        Commands::Preview {
            snapshot,
            bundle,
            name,
        } => {
            let bundles = discover_file(&snapshot)?;
            let found = bundles
                .iter()
                .find(|b| b.id == bundle || b.display_name == bundle)
                .ok_or_else(|| podscout_common::Error::BundleNotFound(bundle.clone()))?;
            let preview = generate_stack_preview(found, name.as_deref())?;
            println!("{}", preview);
        }

        Commands::ParseUnit { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading unit file {:?}", file))?;
            let directives = parse_unit_file(&text);
            println!("{}", serde_json::to_string_pretty(&directives)?);
        }
    }

    Ok(())
}

fn load_snapshot(path: &Path) -> anyhow::Result<NodeSnapshot> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("parsing snapshot {:?}", path))
}

fn discover_file(path: &Path) -> anyhow::Result<Vec<ServiceBundle>> {
    let snapshot = load_snapshot(path)?;
    info!(
        "discovering bundles on '{}' ({} units, {} containers)",
        snapshot.node_name,
        snapshot.services.len(),
        snapshot.containers.len()
    );
    Ok(build_service_bundles_for_node(
        &snapshot.node_name,
        &snapshot.services,
        &snapshot.containers,
        &snapshot.files,
    ))
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "critical",
        Severity::Warning => "warning",
        Severity::Info => "info",
    }
}

fn summary_table(bundles: &[ServiceBundle]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<40} {:<10} {:>8} {:>10} {:>11}\n",
        "BUNDLE", "SEVERITY", "SERVICES", "CONTAINERS", "VALIDATIONS"
    ));
    for bundle in bundles {
        out.push_str(&format!(
            "{:<40} {:<10} {:>8} {:>10} {:>11}\n",
            bundle.id,
            severity_label(bundle.severity),
            bundle.services.len(),
            bundle.containers.len(),
            bundle.validations.len()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_snapshot_reads_camel_case_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"nodeName": "node-1",
                "services": [{{"name": "web.service"}}],
                "containers": [],
                "files": {{}}}}"#
        )
        .unwrap();

        let snapshot = load_snapshot(file.path()).unwrap();
        assert_eq!(snapshot.node_name, "node-1");
        assert_eq!(snapshot.services[0].name, "web.service");
    }

    #[test]
    fn test_load_snapshot_rejects_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(load_snapshot(file.path()).is_err());
    }

    #[test]
    fn test_summary_table_has_one_row_per_bundle() {
        let bundles = vec![
            ServiceBundle {
                id: "node-1::web".to_string(),
                severity: Severity::Warning,
                ..Default::default()
            },
            ServiceBundle {
                id: "node-1::db".to_string(),
                ..Default::default()
            },
        ];
        let table = summary_table(&bundles);
        assert_eq!(table.lines().count(), 3);
        assert!(table.contains("node-1::web"));
        assert!(table.contains("warning"));
    }
}
