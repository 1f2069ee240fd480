// vpt-cli/src/main.rs
// ============================================================================
// Module: CLI Entry Point
// Description: Process entry points for the Server and Host agent, plus
//              one-shot persistence/maintenance utilities (§2, §4.3
//              Eviction, §6.6).
// Purpose: The only binary in the workspace; every other crate is a library
//          this wires together.
// Dependencies: vpt-core, vpt-config, vpt-store-sqlite, vpt-controllers,
//               vpt-host, vpt-server, clap, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! `vpt server` and `vpt host` each load [`vpt_config::VptConfig`], open a
//! [`vpt_store_sqlite::SqliteStore`], and hand off to the library crate's
//! `run` function — this binary does no domain logic of its own. `vpt
//! maintenance` and `vpt config validate` are one-shot utilities that don't
//! bind a socket.

#[cfg(test)]
mod main_tests;

use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde::Deserialize;

use vpt_controllers::builtin::av::DirectoryAvDriver;
use vpt_controllers::builtin::remote::LoggingRemoteDriver;
use vpt_controllers::builtin::verification::AudioVerificationDriver;
use vpt_controllers::builtin::verification::ImageVerificationDriver;
use vpt_controllers::builtin::verification::TextVerificationDriver;
use vpt_controllers::builtin::verification::VideoVerificationDriver;
use vpt_controllers::registry::ModelDriverSet;
use vpt_controllers::Category;
use vpt_controllers::ControllerRegistry;
use vpt_core::AiPlanCache;
use vpt_core::TeamId;
use vpt_host::DeviceConfig;
use vpt_host::HostConfig;
use vpt_host::HostState;
use vpt_host::ReferencePlanGenerator;
use vpt_server::ServerState;
use vpt_store_sqlite::SqliteStore;
use vpt_store_sqlite::SqliteStoreConfig;

// ============================================================================
// SECTION: CLI shape
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "vpt", about = "VirtualPyTest core: server, host agent, and maintenance utilities")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the stateless API Server (§4.5, §6.1).
    Server(ServerCommand),
    /// Run a Host agent process owning one or more physical devices (§4.5, §6.2).
    Host(HostCommand),
    /// Run the AI plan cache's daily eviction sweep for one team (§4.3 Eviction).
    Maintenance(MaintenanceCommand),
    /// Configuration utilities.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Args, Debug)]
struct ServerCommand {
    /// Use an in-memory store instead of `sqlite_path` from config. Discards
    /// all state on exit; useful for demos and smoke tests.
    #[arg(long)]
    ephemeral: bool,
}

#[derive(Args, Debug)]
struct HostCommand {
    /// This Host's identifier, registered with the Server at startup.
    #[arg(long = "host-id")]
    host_id: String,
    /// Path to a JSON device inventory: `[{"device_id", "device_model",
    /// "capabilities": [...]}]` (§4.5 Model).
    #[arg(long)]
    devices: PathBuf,
    /// Root directory the built-in AV driver writes/reads capture segments
    /// from (§6.4 `CaptureFolder`).
    #[arg(long, default_value = "./captures")]
    capture_folder: PathBuf,
    /// Use an in-memory store instead of `sqlite_path` from config.
    #[arg(long)]
    ephemeral: bool,
}

#[derive(Args, Debug)]
struct MaintenanceCommand {
    /// Team to run the AI plan cache eviction sweep for (§4.3 Eviction).
    #[arg(long = "team-id")]
    team_id: String,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load configuration from defaults + TOML overlay + environment, and
    /// print the resolved, validated result.
    Validate,
}

/// One entry in the `--devices` inventory file.
#[derive(Debug, Clone, Deserialize)]
struct DeviceEntry {
    device_id: String,
    device_model: String,
    #[serde(default)]
    capabilities: Vec<String>,
}

// ============================================================================
// SECTION: Entry point
// ============================================================================

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "vpt exited with an error");
            eprintln!("error: {err}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Server(command) => run_server(command).await,
        Commands::Host(command) => run_host(command).await,
        Commands::Maintenance(command) => run_maintenance(command),
        Commands::Config { command } => run_config(command),
    }
}

// ============================================================================
// SECTION: `vpt server`
// ============================================================================

async fn run_server(command: ServerCommand) -> Result<(), CliError> {
    let config = vpt_config::VptConfig::load()?;
    let store = open_store(&config.sqlite_path, command.ephemeral)?;
    let state = ServerState::new(config, store)?;
    vpt_server::run(state).await?;
    Ok(())
}

// ============================================================================
// SECTION: `vpt host`
// ============================================================================

async fn run_host(command: HostCommand) -> Result<(), CliError> {
    let shared_config = vpt_config::VptConfig::load()?;
    let store = open_store(&shared_config.sqlite_path, command.ephemeral)?;

    let raw_devices = std::fs::read_to_string(&command.devices).map_err(|source| CliError::Devices { path: command.devices.clone(), source: source.to_string() })?;
    let entries: Vec<DeviceEntry> = serde_json::from_str(&raw_devices).map_err(|source| CliError::Devices { path: command.devices.clone(), source: source.to_string() })?;
    if entries.is_empty() {
        return Err(CliError::Devices { path: command.devices.clone(), source: "device inventory is empty".into() });
    }

    let devices: Vec<DeviceConfig> = entries
        .iter()
        .map(|entry| DeviceConfig {
            device_id: vpt_core::DeviceId::new(entry.device_id.clone()),
            device_model: entry.device_model.clone(),
            capabilities: entry.capabilities.clone(),
        })
        .collect();

    let model_sets = reference_model_sets(&entries, &command.capture_folder);
    let registry = ControllerRegistry::new(model_sets);

    let host_config = HostConfig::new(vpt_core::HostId::new(command.host_id), &shared_config, devices);
    let state = HostState::new(host_config, shared_config, store, registry);

    vpt_host::run(state, std::sync::Arc::new(ReferencePlanGenerator)).await?;
    Ok(())
}

/// Builds one [`ModelDriverSet`] per distinct device model in the inventory,
/// wiring every category to the reference drivers shipped in
/// `vpt_controllers::builtin` (§6.4 — real device protocols are out of
/// scope; these exercise the same `Driver` contract a real one would).
fn reference_model_sets(entries: &[DeviceEntry], capture_folder: &std::path::Path) -> Vec<ModelDriverSet> {
    let mut models: Vec<&str> = entries.iter().map(|entry| entry.device_model.as_str()).collect();
    models.sort_unstable();
    models.dedup();

    models
        .into_iter()
        .map(|model| {
            let folder = capture_folder.to_path_buf();
            ModelDriverSet::new(model)
                .with_driver(Category::Remote, || Box::new(LoggingRemoteDriver::new()))
                .with_driver(Category::Av, move || Box::new(DirectoryAvDriver::new(folder.clone())))
                .with_driver(Category::VerificationImage, || Box::new(ImageVerificationDriver))
                .with_driver(Category::VerificationText, || Box::new(TextVerificationDriver))
                .with_driver(Category::VerificationVideo, || Box::new(VideoVerificationDriver))
                .with_driver(Category::VerificationAudio, || Box::new(AudioVerificationDriver))
        })
        .collect()
}

// ============================================================================
// SECTION: `vpt maintenance`
// ============================================================================

fn run_maintenance(command: MaintenanceCommand) -> Result<(), CliError> {
    let config = vpt_config::VptConfig::load()?;
    let store = SqliteStore::open(&SqliteStoreConfig::new(config.sqlite_path.clone()))?;
    let team_id = TeamId::new(command.team_id);
    let evicted = AiPlanCache::run_maintenance(&store, &team_id)?;
    tracing::info!(%team_id, evicted, "ai plan cache maintenance sweep complete");
    println!("evicted {evicted} plan(s) for team {team_id}");
    Ok(())
}

// ============================================================================
// SECTION: `vpt config validate`
// ============================================================================

fn run_config(command: ConfigCommand) -> Result<(), CliError> {
    match command {
        ConfigCommand::Validate => {
            let config = vpt_config::VptConfig::load()?;
            println!("{config:#?}");
            Ok(())
        }
    }
}

// ============================================================================
// SECTION: Shared helpers
// ============================================================================

fn open_store(sqlite_path: &std::path::Path, ephemeral: bool) -> Result<SqliteStore, CliError> {
    let store = if ephemeral {
        SqliteStore::open_in_memory()?
    } else {
        SqliteStore::open(&SqliteStoreConfig::new(sqlite_path.to_path_buf()))?
    };
    Ok(store)
}

// ============================================================================
// SECTION: Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] vpt_config::ConfigError),
    #[error("store error: {0}")]
    Store(#[from] vpt_store_sqlite::SqliteStoreError),
    #[error("core error: {0}")]
    Core(#[from] vpt_core::CoreError),
    #[error("failed to read device inventory {}: {source}", path.display())]
    Devices { path: PathBuf, source: String },
    #[error("client error: {0}")]
    Client(#[from] vpt_client::ClientError),
    #[error("server error: {0}")]
    Server(#[from] vpt_server::ServerError),
    #[error("host server error: {0}")]
    Host(#[from] vpt_host::HostServerError),
}
