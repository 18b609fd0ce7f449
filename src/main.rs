use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use leadflow_core::config::AppConfig;
use leadflow_core::event::EventBus;
use leadflow_core::traits::CrmStore;
use leadflow_core::types::{
    JsonMap, Lead, Unit, WhatsappConfiguration, WhatsappMessage, WorkflowEvent,
};
use leadflow_core::workflow::Workflow;
use leadflow_store::SqliteStore;
use leadflow_workflow::{
    apply_extracted_fields, available_templates, install_template, AiResponseParser,
    WorkflowExecutor,
};

#[derive(Parser)]
#[command(name = "leadflow", version, about = "Lead qualification workflow runner")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "leadflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a stored workflow for one lead
    Run {
        /// Workflow id
        workflow_id: String,
        /// Lead the run is about
        #[arg(long)]
        lead: String,
        /// Extra trigger data as a JSON object
        #[arg(long)]
        data: Option<String>,
        /// Print node events as they happen
        #[arg(long)]
        watch: bool,
    },
    /// List built-in workflow templates
    Templates,
    /// Create a workflow from a template for a unit
    InstallTemplate {
        /// Template id (see `templates`)
        template_id: String,
        /// Unit the workflow belongs to
        #[arg(long)]
        unit: String,
    },
    /// Extract lead fields from a reply or a lead's conversation
    Extract {
        /// The reply text
        #[arg(trailing_var_arg = true)]
        text: Vec<String>,
        /// Fold this lead's incoming messages and write the fields onto it
        #[arg(long)]
        lead: Option<String>,
    },
    /// Load workflows, leads, units and messages from a JSON file
    Import {
        /// Seed file
        file: PathBuf,
    },
    /// Show current configuration
    Config,
}

/// Contents of an `import` file. Every section is optional.
#[derive(Debug, Default, Deserialize)]
struct SeedFile {
    #[serde(default)]
    workflows: Vec<Workflow>,
    #[serde(default)]
    units: Vec<Unit>,
    #[serde(default)]
    leads: Vec<Lead>,
    #[serde(default)]
    whatsapp_configurations: Vec<WhatsappConfiguration>,
    #[serde(default)]
    whatsapp_messages: Vec<WhatsappMessage>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_or_default(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Templates => {
            for t in available_templates() {
                println!("{:<20} {} ({} nodes)", t.id, t.name, t.node_count);
                println!("{:<20} {}", "", t.description);
            }
        }
        Commands::InstallTemplate { template_id, unit } => {
            let store = open_store(&config)?;
            let id = install_template(&store, &template_id, &unit).await?;
            println!("{}", id);
        }
        Commands::Run {
            workflow_id,
            lead,
            data,
            watch,
        } => {
            let store = Arc::new(open_store(&config)?);
            let trigger_data = trigger_data(&lead, data.as_deref())?;
            run_workflow(store, &config, &workflow_id, trigger_data, watch).await?;
        }
        Commands::Extract { text, lead } => {
            let text = text.join(" ");
            match lead {
                Some(lead_id) => {
                    let store = open_store(&config)?;
                    let messages = store.incoming_messages(&lead_id).await?;
                    let mut fields = AiResponseParser::extract_from_conversation(&messages);
                    fields.extend(AiResponseParser::parse_response(&text));
                    println!("{}", serde_json::to_string_pretty(&fields)?);
                    if apply_extracted_fields(&store, &lead_id, &fields).await? {
                        info!(lead_id = %lead_id, fields = fields.len(), "Lead updated");
                    } else {
                        warn!(lead_id = %lead_id, "Lead not updated");
                    }
                }
                None => {
                    if text.trim().is_empty() {
                        anyhow::bail!("nothing to extract: pass a text or --lead");
                    }
                    let fields = AiResponseParser::parse_response(&text);
                    println!("{}", serde_json::to_string_pretty(&fields)?);
                }
            }
        }
        Commands::Import { file } => {
            let store = open_store(&config)?;
            import_seed(&store, &file).await?;
        }
    }

    Ok(())
}

fn open_store(config: &AppConfig) -> anyhow::Result<SqliteStore> {
    let path = config.store_path();
    SqliteStore::open(&path).with_context(|| format!("opening store at {}", path.display()))
}

/// `--data` merged with the lead id. The lead id always wins.
fn trigger_data(lead_id: &str, extra: Option<&str>) -> anyhow::Result<JsonMap> {
    let mut data: JsonMap = match extra {
        Some(raw) => serde_json::from_str(raw).context("--data must be a JSON object")?,
        None => JsonMap::new(),
    };
    data.insert("lead_id".into(), serde_json::Value::String(lead_id.to_string()));
    Ok(data)
}

async fn run_workflow(
    store: Arc<SqliteStore>,
    config: &AppConfig,
    workflow_id: &str,
    trigger_data: JsonMap,
    watch: bool,
) -> anyhow::Result<()> {
    let mut executor = WorkflowExecutor::new(store).with_settings(config.workflow.clone());

    let watcher = if watch {
        let bus = Arc::new(EventBus::default());
        let rx = bus.subscribe();
        executor = executor.with_events(bus);
        Some(tokio::spawn(watch_events(rx)))
    } else {
        None
    };

    let result = executor.execute_workflow(workflow_id, trigger_data).await;
    // Dropping the executor closes the bus and ends the watcher.
    drop(executor);
    if let Some(handle) = watcher {
        let _ = handle.await;
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        anyhow::bail!(result.error.unwrap_or_else(|| "Workflow run failed".into()));
    }
    Ok(())
}

/// Print events until the bus closes. Falling behind skips events, it does
/// not stop the watcher.
async fn watch_events(mut rx: broadcast::Receiver<WorkflowEvent>) -> usize {
    let mut printed = 0;
    loop {
        match rx.recv().await {
            Ok(event) => {
                print_event(&event);
                printed += 1;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event watcher lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    printed
}

fn print_event(event: &WorkflowEvent) {
    match event {
        WorkflowEvent::RunStarted {
            workflow_id,
            node_count,
        } => eprintln!("[{}] started, {} nodes", workflow_id, node_count),
        WorkflowEvent::NodeCompleted {
            node_id,
            success,
            proceed,
            ..
        } => {
            let status = if *success { "ok" } else { "failed" };
            let next = if *proceed { "" } else { ", stop" };
            eprintln!("  {} {}{}", node_id, status, next);
        }
        WorkflowEvent::RunFinished {
            workflow_id,
            executed_nodes,
            ..
        } => eprintln!("[{}] finished, {} nodes executed", workflow_id, executed_nodes),
    }
}

async fn import_seed(store: &SqliteStore, path: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let seed: SeedFile = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;

    for unit in &seed.units {
        store.insert_unit(unit).await?;
    }
    for lead in &seed.leads {
        store.insert_lead(lead).await?;
    }
    for cfg in &seed.whatsapp_configurations {
        store.insert_whatsapp_config(cfg).await?;
    }
    for message in &seed.whatsapp_messages {
        store.insert_whatsapp_message(message).await?;
    }
    for workflow in &seed.workflows {
        store.insert_workflow(workflow).await?;
    }

    info!(
        workflows = seed.workflows.len(),
        units = seed.units.len(),
        leads = seed.leads.len(),
        whatsapp_configurations = seed.whatsapp_configurations.len(),
        whatsapp_messages = seed.whatsapp_messages.len(),
        "Seed imported"
    );
    Ok(())
}
