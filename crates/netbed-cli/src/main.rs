mod commands;

use clap::{Parser, Subcommand};
use commands::{App, EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_STORE_ERROR};
use netbed_store::StoreLayout;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(
    name = "netbed",
    version,
    about = "Reconciliation engine for an emulated-network testbed"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "netbed.toml", global = true)]
    config: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Manage clusters.
    Cluster {
        #[command(subcommand)]
        command: ClusterCommands,
    },
    /// Manage devices.
    Device {
        #[command(subcommand)]
        command: DeviceCommands,
    },
    /// Show the changes the next sync would make.
    Preview {
        /// Limit the preview to one cluster.
        #[arg(long)]
        cluster: Option<String>,
    },
    /// Reconcile containers and networks with the device records.
    Sync {
        /// Limit the sync to one cluster.
        #[arg(long)]
        cluster: Option<String>,
    },
    /// Show all clusters and their device states.
    Status,
    /// Stop and remove every managed container.
    Purge {
        /// Confirm the purge.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Debug, Subcommand)]
enum ClusterCommands {
    /// Create a cluster.
    Create {
        name: String,
        /// Human-readable description.
        #[arg(long, default_value = "")]
        description: String,
        /// Create the cluster deactivated (its devices stay down).
        #[arg(long, default_value_t = false)]
        inactive: bool,
    },
    /// List all clusters.
    List,
    /// Show one cluster and its devices.
    Show { name: String },
    /// Mark a cluster active (its devices come up on the next sync).
    Activate { name: String },
    /// Mark a cluster inactive (its devices go down on the next sync).
    Deactivate { name: String },
    /// Tear down a cluster's devices and remove all of its records.
    Delete { name: String },
}

#[derive(Debug, Subcommand)]
enum DeviceCommands {
    /// Add a device to a cluster.
    Add { cluster: String, name: String },
    /// Remove a device record by container name.
    Remove { container: String },
    /// List device records.
    List {
        /// Limit the listing to one cluster.
        #[arg(long)]
        cluster: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("NETBED_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    let config = match netbed_model::parse_config_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: failed to load {}: {e}", cli.config.display());
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let layout = StoreLayout::new(&config.store.root);
    if let Err(e) = layout.initialize() {
        eprintln!("error: failed to initialize store at {}: {e}", config.store.root);
        return ExitCode::from(EXIT_STORE_ERROR);
    }

    let runtime = match netbed_runtime::select_runtime(&config.runtime.backend) {
        Ok(runtime) => Arc::from(runtime),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let app = App::new(layout, runtime, &config);
    let json = cli.json;

    let result = match cli.command {
        Commands::Cluster { command } => match command {
            ClusterCommands::Create {
                name,
                description,
                inactive,
            } => commands::cluster::create(&app, &name, &description, !inactive, json),
            ClusterCommands::List => commands::cluster::list(&app, json),
            ClusterCommands::Show { name } => commands::cluster::show(&app, &name, json),
            ClusterCommands::Activate { name } => {
                commands::cluster::set_active(&app, &name, true, json)
            }
            ClusterCommands::Deactivate { name } => {
                commands::cluster::set_active(&app, &name, false, json)
            }
            ClusterCommands::Delete { name } => commands::cluster::delete(&app, &name, json),
        },
        Commands::Device { command } => match command {
            DeviceCommands::Add { cluster, name } => {
                commands::device::add(&app, &cluster, &name, json)
            }
            DeviceCommands::Remove { container } => {
                commands::device::remove(&app, &container, json)
            }
            DeviceCommands::List { cluster } => {
                commands::device::list(&app, cluster.as_deref(), json)
            }
        },
        Commands::Preview { cluster } => commands::preview::run(&app, cluster.as_deref(), json),
        Commands::Sync { cluster } => commands::sync::run(&app, cluster.as_deref(), json),
        Commands::Status => commands::status::run(&app, json),
        Commands::Purge { yes } => commands::purge::run(&app, yes, json),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("store") {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
