//! topology-ingest CLI: run syncs against recorded source responses
//!
//! The fixture directory holds one `<query key>.json` file per source
//! response (see `SourceQuery::key`). Models are the target ontology
//! documents; mappings are the source→target mapping tables (JSON or YAML).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use topology_ingest::{
    CancellationToken, InMemoryTargetStore, IngestConfig, MappingTables, OntologyModel, RecordedSource, SyncEngine,
    SyncReport, SyncScope,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "topology-ingest", version, about = "Topology ingestion engine CLI")]
struct Cli {
    /// Target ontology documents (JSON)
    #[arg(long = "models", global = true)]
    models: Vec<PathBuf>,

    /// Mapping tables (.json, .yaml or .yml)
    #[arg(long, global = true)]
    mappings: Option<PathBuf>,

    /// Ingestion config (YAML); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync against recorded source responses
    Sync {
        /// Directory of recorded source responses
        #[arg(long, default_value = "fixtures")]
        fixtures: PathBuf,

        /// Mark the upload as pre-approved
        #[arg(long)]
        auto_approve: bool,

        #[command(subcommand)]
        scope: ScopeCommand,
    },
    /// Parse the ontology and mapping tables and list remap targets missing
    /// from the ontology
    Validate,
}

#[derive(Clone, Subcommand)]
enum ScopeCommand {
    /// Sites, buildings, connectors and accounts
    Organization,
    /// Connectors of one building
    Connectors { building: String },
    /// Floors, rooms and zones of one building
    Spatial { building: String },
    /// Things of one building
    Things {
        building: String,
        #[arg(long, default_value = "")]
        connector: String,
    },
    /// Things of one building and their points
    Points {
        building: String,
        #[arg(long, default_value = "")]
        connector: String,
    },
}

impl From<ScopeCommand> for SyncScope {
    fn from(command: ScopeCommand) -> Self {
        match command {
            ScopeCommand::Organization => SyncScope::Organization,
            ScopeCommand::Connectors { building } => SyncScope::Connectors { building_id: building },
            ScopeCommand::Spatial { building } => SyncScope::Spatial { building_id: building },
            ScopeCommand::Things { building, connector } => SyncScope::Things {
                building_id: building,
                connector_id: connector,
            },
            ScopeCommand::Points { building, connector } => SyncScope::Points {
                building_id: building,
                connector_id: connector,
            },
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Sync {
            ref fixtures,
            auto_approve,
            ref scope,
        } => run_sync(&cli, fixtures, auto_approve, scope.clone().into()).await,
        Commands::Validate => run_validate(&cli),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_models(paths: &[PathBuf]) -> Result<Vec<String>> {
    if paths.is_empty() {
        bail!("at least one --models document is required");
    }
    paths
        .iter()
        .map(|path| std::fs::read_to_string(path).with_context(|| format!("reading models {}", path.display())))
        .collect()
}

fn load_mappings(path: Option<&Path>) -> Result<MappingTables> {
    let Some(path) = path else {
        return Ok(MappingTables::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading mappings {}", path.display()))?;
    let tables = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => MappingTables::from_yaml_str(&text)?,
        _ => MappingTables::from_json_str(&text)?,
    };
    Ok(tables)
}

fn load_config(path: Option<&Path>) -> Result<IngestConfig> {
    match path {
        Some(path) => Ok(IngestConfig::load(path)?),
        None => Ok(IngestConfig::default()),
    }
}

async fn run_sync(cli: &Cli, fixtures: &Path, auto_approve: bool, scope: SyncScope) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let tables = load_mappings(cli.mappings.as_deref())?;
    let models = load_models(&cli.models)?;
    let source = RecordedSource::from_dir(fixtures)
        .with_context(|| format!("loading fixtures from {}", fixtures.display()))?;

    let engine = SyncEngine::new(
        Arc::new(source),
        Arc::new(InMemoryTargetStore::new(models)),
        Arc::new(tables),
        config,
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted; cancelling sync");
            on_interrupt.cancel();
        }
    });

    let report = engine.run(scope, auto_approve, &cancel).await?;

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    let mut summary = Table::new();
    summary.set_content_arrangement(ContentArrangement::Dynamic);
    summary.set_header(vec!["Sync", "Twins", "Relationships", "Removed", "Issues"]);
    summary.add_row(vec![
        report.scope.to_string(),
        report.twin_count().to_string(),
        report.relationship_count().to_string(),
        report.reconcile.total().to_string(),
        report.errors.len().to_string(),
    ]);
    println!("{}", summary);

    if report.errors.is_empty() {
        return;
    }

    let mut issues = Table::new();
    issues.set_content_arrangement(ContentArrangement::Dynamic);
    issues.set_header(vec!["Key", "Kind", "Message"]);
    for (key, issue) in report.errors.iter() {
        issues.add_row(vec![key.clone(), issue.kind.to_string(), issue.message.clone()]);
    }
    println!("{}", issues);
    println!("{} issue(s)", report.errors.len());
}

fn run_validate(cli: &Cli) -> Result<()> {
    let models = load_models(&cli.models)?;
    let tables = load_mappings(cli.mappings.as_deref())?;
    let model = OntologyModel::parse_documents(&models)?;
    let invalid = tables.invalid_targets(&model);

    match cli.format {
        OutputFormat::Json => {
            let out = serde_json::json!({
                "types": model.len(),
                "source_types": tables.source_types.len(),
                "invalid_targets": invalid,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            println!("Types:        {}", model.len());
            println!("Source types: {}", tables.source_types.len());
            if invalid.is_empty() {
                println!("All remap targets are defined");
            } else {
                let mut table = Table::new();
                table.set_content_arrangement(ContentArrangement::Dynamic);
                table.set_header(vec!["Undefined remap target"]);
                for target in &invalid {
                    table.add_row(vec![target.clone()]);
                }
                println!("{}", table);
            }
        }
    }

    if !invalid.is_empty() {
        bail!("{} remap target(s) missing from the ontology", invalid.len());
    }
    Ok(())
}
