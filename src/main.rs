//! Biosignal FHIR Ingest CLI
//!
//! Uploads a research dataset to a FHIR server, or into memory for a dry run.

use anyhow::{bail, Context};
use biosignal_fhir_ingest::{
    catalog::static_records,
    config::Config,
    ledger::{read_totals, RunLedger},
    run_study, Dataset, MemoryStore, ResourceStore, RunOptions, VERSION,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "http")]
use biosignal_fhir_ingest::{BlockingFhirClient, StoreConfig};

#[derive(Parser)]
#[command(name = "biosignal-ingest")]
#[command(version = VERSION)]
#[command(about = "Ingest wearable stress-research datasets into a FHIR server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload one dataset
    Ingest {
        /// Dataset kind (WESAD, SDN, SRAD or WSPCP)
        dataset: Dataset,

        /// Dataset root directory
        dir: PathBuf,

        /// FHIR base URL (overrides the configured one)
        #[arg(long)]
        server: Option<String>,

        /// Bearer token for the FHIR server
        #[arg(long)]
        token: Option<String>,

        /// Keep records in memory instead of uploading them
        #[arg(long)]
        dry_run: bool,

        /// Write the dry-run bundle to this file
        #[arg(long, short)]
        export: Option<PathBuf>,

        /// Only process these participants (repeatable)
        #[arg(long = "participant")]
        participants: Vec<String>,
    },

    /// Upload the device definitions and questionnaires only
    Catalog {
        #[arg(long)]
        server: Option<String>,

        #[arg(long)]
        token: Option<String>,

        #[arg(long)]
        dry_run: bool,
    },

    /// Show totals of previous runs
    Status,

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

/// Where records go: memory for dry runs, a FHIR server otherwise.
enum Target {
    Memory(MemoryStore),
    #[cfg(feature = "http")]
    Server(BlockingFhirClient),
}

impl Target {
    fn open(config: &Config, server: Option<String>, token: Option<String>, dry_run: bool) -> anyhow::Result<Self> {
        let base_url = server.unwrap_or_else(|| config.store.base_url.clone());
        if dry_run {
            return Ok(Target::Memory(MemoryStore::new().with_base_url(base_url)));
        }
        Self::server(config, base_url, token)
    }

    #[cfg(feature = "http")]
    fn server(config: &Config, base_url: String, token: Option<String>) -> anyhow::Result<Self> {
        let store_config = StoreConfig {
            base_url,
            token: token.or_else(|| config.store.token.clone()),
            timeout: config.store.timeout,
        };
        let client = BlockingFhirClient::new(store_config.clone())
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        match client.test_connection() {
            Ok(true) => {}
            Ok(false) => bail!("FHIR server at {} did not answer the capability check", store_config.base_url),
            Err(e) => bail!("Cannot reach FHIR server at {}: {e}", store_config.base_url),
        }
        Ok(Target::Server(client))
    }

    #[cfg(not(feature = "http"))]
    fn server(_config: &Config, _base_url: String, _token: Option<String>) -> anyhow::Result<Self> {
        bail!("built without the http feature; use --dry-run")
    }

    fn store(&mut self) -> &mut dyn ResourceStore {
        match self {
            Target::Memory(store) => store,
            #[cfg(feature = "http")]
            Target::Server(client) => client,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config, using defaults: {e}");
            Config::default()
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Ingest {
            dataset,
            dir,
            server,
            token,
            dry_run,
            export,
            participants,
        } => cmd_ingest(&config, dataset, &dir, server, token, dry_run, export, participants),
        Commands::Catalog {
            server,
            token,
            dry_run,
        } => cmd_catalog(&config, server, token, dry_run),
        Commands::Status => {
            cmd_status(&config);
            Ok(())
        }
        Commands::Config { save } => cmd_config(&config, save),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_ingest(
    config: &Config,
    dataset: Dataset,
    dir: &Path,
    server: Option<String>,
    token: Option<String>,
    dry_run: bool,
    export: Option<PathBuf>,
    participants: Vec<String>,
) -> anyhow::Result<()> {
    println!("Biosignal FHIR Ingest v{VERSION}");
    println!();

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let mut loader = dataset
        .loader(dir)
        .with_context(|| format!("Cannot open {dataset} at {}", dir.display()))?;
    let mut target = Target::open(config, server, token, dry_run)?;

    println!("Ingesting {dataset} from {}", dir.display());
    println!("  Target: {}", target.store().base_url());
    println!("  Dry run: {dry_run}");
    if !participants.is_empty() {
        println!("  Participants: {}", participants.join(", "));
    }
    println!();
    println!("Press Ctrl+C to stop after the current participant.");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    let ledger = RunLedger::with_persistence(config.ledger_path());
    let options = RunOptions {
        features: config.features.clone(),
        ledger: Some(&ledger),
        running: Some(running),
        only: (!participants.is_empty()).then_some(participants),
    };
    let outcome = run_study(loader.as_mut(), target.store(), options)?;

    if let Target::Memory(store) = &target {
        let path = export.unwrap_or_else(|| {
            config
                .export_path
                .join(format!("{}-{}.json", dataset.name().to_lowercase(), ledger.run_id()))
        });
        write_bundle(store, &path)?;
        println!("Exported {} records to {:?}", store.len(), path);
    }

    if let Err(e) = ledger.save() {
        eprintln!("Warning: Could not save run totals: {e}");
    }

    println!();
    println!("{}", ledger.summary());
    println!("  - Record ids issued: {}", outcome.ids_issued);

    if outcome.interrupted {
        println!();
        println!("Run interrupted; rerun to complete the remaining participants.");
    }
    if !outcome.failed.is_empty() {
        eprintln!();
        for failure in &outcome.failed {
            eprintln!("  {failure}");
        }
        bail!("{} participant(s) failed", outcome.failed.len());
    }
    Ok(())
}

fn cmd_catalog(config: &Config, server: Option<String>, token: Option<String>, dry_run: bool) -> anyhow::Result<()> {
    let mut target = Target::open(config, server, token, dry_run)?;
    let records = static_records().context("Cannot build the catalog")?;
    for record in &records {
        target
            .store()
            .create(record)
            .map_err(|e| anyhow::anyhow!("Upload of {} failed: {e}", record.resource_type()))?;
    }
    println!("Uploaded {} catalog records to {}", records.len(), target.store().base_url());
    Ok(())
}

fn write_bundle(store: &MemoryStore, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&store.to_bundle())?;
    std::fs::write(path, json).with_context(|| format!("Cannot write {}", path.display()))?;
    Ok(())
}

fn cmd_status(config: &Config) {
    println!("Biosignal FHIR Ingest Status");
    println!("============================");
    println!();

    println!("Configuration:");
    println!("  FHIR server: {}", config.store.base_url);
    println!("  Token: {}", if config.store.token.is_some() { "set" } else { "not set" });
    println!("  Feature window: {} rows, {} lags", config.features.window, config.features.lags);
    println!();

    let ledger_path = config.ledger_path();
    if !ledger_path.exists() {
        println!("No previous run data found.");
        return;
    }
    match read_totals(&ledger_path) {
        Ok(totals) => {
            println!("Cumulative Statistics:");
            println!("  Runs: {}", totals.runs);
            println!("  Participants completed: {}", totals.participants_completed);
            println!("  Participants failed: {}", totals.participants_failed);
            println!("  Records created: {}", totals.records_created);
            println!("  Records updated: {}", totals.records_updated);
            println!("  Upload failures: {}", totals.upload_failures);
            if let (Some(run), Some(host)) = (totals.last_run_id, totals.last_host) {
                println!("  Last run: {run} on {host}");
            }
        }
        Err(e) => eprintln!("Error reading {ledger_path:?}: {e}"),
    }
}

fn cmd_config(config: &Config, save: bool) -> anyhow::Result<()> {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);

    if save {
        config.save().map_err(|e| anyhow::anyhow!("Error saving config: {e}"))?;
        println!();
        println!("Saved.");
    }
    Ok(())
}

fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
