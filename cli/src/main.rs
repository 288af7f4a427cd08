//! oxpool — entry point for the core engine's scheduled operations.
//!
//! A scheduler invokes one operation per run (gather and process every
//! minute, their `-all` variants daily; export whenever the downstream
//! consumer polls). Every operation prints exactly one JSON result to
//! stdout — either the exported payload or a `{"result", "message"}`
//! object from the closed result-kind vocabulary — so callers can script
//! against the output. Diagnostics go to stderr.

use clap::Parser;
use oxpool_client::{ClientError, CommandTransport, NodeClient, UnixSocketTransport};
use oxpool_engine::{AccountsEngine, EngineConfig, EngineError, ExclusiveLock, StorageBackend};
use oxpool_store::PoolStore;
use oxpool_store_files::FileStore;
use oxpool_store_sqlite::SqliteStore;
use oxpool_types::{MinerAddress, SystemClock};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "oxpool", about = "oxpool core engine — tracks and exports found blocks")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings are
    /// used as the base; CLI flags override them.
    #[arg(long, env = "OXPOOL_CONFIG")]
    config: Option<PathBuf>,

    /// Path of the daemon's unix command socket.
    #[arg(long, env = "OXPOOL_SOCKET_PATH")]
    socket_path: Option<PathBuf>,

    /// Data directory for tracked records.
    #[arg(long, env = "OXPOOL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Storage backend: "files" or "sqlite".
    #[arg(long, env = "OXPOOL_BACKEND")]
    backend: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "OXPOOL_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// The closed operation set. Anything else fails at argument parsing, so an
/// invalid operation can never reach the engine.
#[derive(clap::Subcommand)]
enum Command {
    /// Gather new accounts from the node (bounded). Run every minute.
    Gather,
    /// Gather all accounts from the node. Run once a day.
    GatherAll,
    /// Inspect newly gathered accounts. Run every minute.
    Process,
    /// Re-inspect every account, validating and invalidating as needed.
    /// Run once a day.
    ProcessAll,
    /// Export the oldest unexported fully confirmed found block.
    Export,
    /// Export one retraction for a previously exported, now invalidated
    /// block.
    ExportInvalidated,
    /// Clear the export marker on all exported valid blocks (debug).
    ResetExport,
    /// Clear the retraction marker on all invalidated blocks (debug).
    ResetExportInvalidated,
    /// Print database summary counts (debug).
    Summary,
    /// Remove all tracked accounts and blocks (debug).
    StartFresh,
    /// Retrieve the balance of one address.
    Balance { address: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(message) => {
            print_result("invalid-config", &message);
            return Ok(());
        }
    };

    oxpool_utils::init_tracing(&config.log_level);

    let transport = UnixSocketTransport::new(&config.socket_path);
    let client = NodeClient::new(transport);

    match config.backend {
        StorageBackend::Files => {
            let store = match FileStore::open(&config.data_dir) {
                Ok(store) => store,
                Err(e) => {
                    print_result("query-exception", &e.to_string());
                    return Ok(());
                }
            };
            run(&store, &client, &config, &cli.command);
        }
        StorageBackend::Sqlite => {
            let store = match SqliteStore::open(&config.sqlite_path()) {
                Ok(store) => store,
                Err(e) => {
                    print_result("query-exception", &e.to_string());
                    return Ok(());
                }
            };
            run(&store, &client, &config, &cli.command);
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<EngineConfig, String> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(&path.display().to_string())
            .map_err(|e| e.to_string())?,
        None => EngineConfig::default(),
    };
    if let Some(socket_path) = &cli.socket_path {
        config.socket_path = socket_path.clone();
    }
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(backend) = &cli.backend {
        config.backend = match backend.to_lowercase().as_str() {
            "files" => StorageBackend::Files,
            "sqlite" => StorageBackend::Sqlite,
            other => return Err(format!("unknown backend: {other}")),
        };
    }
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone();
    }
    Ok(config)
}

fn run<P, T>(store: &P, client: &NodeClient<T>, config: &EngineConfig, command: &Command)
where
    P: PoolStore,
    T: CommandTransport,
{
    let clock = SystemClock;
    let engine = AccountsEngine::new(store, client, &clock, config);

    match command {
        Command::Gather => report(engine.gather(false).map(|_| ()), "New accounts gathered."),
        Command::GatherAll => report(engine.gather(true).map(|_| ()), "All accounts gathered."),
        Command::Process => report(engine.inspect(false).map(|_| ()), "Accounts processed."),
        Command::ProcessAll => report(engine.inspect(true).map(|_| ()), "All accounts processed."),
        Command::Export => match engine.export() {
            Ok(Some(payload)) => println!("{payload}"),
            Ok(None) => print_result("empty", "No new blocks."),
            Err(e) => report_error(e),
        },
        Command::ExportInvalidated => match engine.export_invalidated() {
            Ok(Some(notice)) => println!("{notice}"),
            Ok(None) => print_result("empty", "No new invalidated blocks."),
            Err(e) => report_error(e),
        },
        Command::ResetExport => report(
            engine.reset_export().map(|_| ()),
            "All blocks will be exported again on export calls.",
        ),
        Command::ResetExportInvalidated => report(
            engine.reset_export_invalidated().map(|_| ()),
            "All invalidated blocks will be exported again on exportInvalidated calls.",
        ),
        Command::Summary => match engine.summary() {
            Ok(summary) => match serde_json::to_string_pretty(&summary) {
                Ok(json) => println!("{json}"),
                Err(e) => print_result("query-exception", &e.to_string()),
            },
            Err(e) => report_error(e),
        },
        Command::StartFresh => report(engine.truncate(), "Core storage was deleted."),
        Command::Balance { address } => balance(store, client, config, address),
    }
}

/// Balance lookups take their own lock so a slow daemon cannot stack up
/// concurrent balance calls; failures degrade to a null balance.
fn balance<P, T>(store: &P, client: &NodeClient<T>, config: &EngineConfig, address: &str)
where
    P: PoolStore,
    T: CommandTransport,
{
    let clock = SystemClock;
    let null_balance = serde_json::json!({ "address": address, "balance": null });

    let Ok(parsed) = address.parse::<MinerAddress>() else {
        println!("{null_balance:#}");
        return;
    };
    let Ok(_lock) =
        ExclusiveLock::obtain(store.locks(), &clock, "balances", config.lock_ttl_secs)
    else {
        println!("{null_balance:#}");
        return;
    };

    match client.balance(&parsed) {
        Ok(amount) => {
            let value = serde_json::json!({
                "address": address,
                "balance": amount.to_string(),
            });
            println!("{value:#}");
        }
        Err(e) => {
            tracing::debug!(error = %e, "balance lookup failed");
            println!("{null_balance:#}");
        }
    }
}

fn report(result: Result<(), EngineError>, success_message: &str) {
    match result {
        Ok(()) => print_result("success", success_message),
        Err(e) => report_error(e),
    }
}

fn report_error(error: EngineError) {
    match error {
        EngineError::Locked(name) => print_result(
            "locked",
            &format!("Blocks {name} operation is currently in progress, please try again later."),
        ),
        EngineError::NodeNotReady => print_result(
            "not-ready",
            "Node is not ready at this time, blocks operation is not available.",
        ),
        EngineError::Client(ClientError::InvalidParameter(param)) => {
            print_result("invalid-call", &format!("Invalid parameter: {param}."))
        }
        EngineError::Config(message) => print_result("invalid-config", &message),
        other => print_result("query-exception", &other.to_string()),
    }
}

fn print_result(kind: &str, message: &str) {
    let value = serde_json::json!({ "result": kind, "message": message });
    println!("{value:#}");
}
