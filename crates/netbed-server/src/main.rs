use clap::Parser;
use netbed_model::parse_config_file;
use netbed_server::Api;
use netbed_store::StoreLayout;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "netbed-server",
    version,
    about = "HTTP control server for the netbed testbed engine"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "netbed.toml")]
    config: PathBuf,

    /// Listen address (overrides the configuration file).
    #[arg(long)]
    listen: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match parse_config_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: failed to load {}: {e}", cli.config.display());
            std::process::exit(1);
        }
    };

    let layout = StoreLayout::new(&config.store.root);
    if let Err(e) = layout.initialize() {
        eprintln!("error: failed to initialize store at {}: {e}", config.store.root);
        std::process::exit(1);
    }

    let runtime = match netbed_runtime::select_runtime(&config.runtime.backend) {
        Ok(runtime) => Arc::from(runtime),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let addr = cli.listen.unwrap_or_else(|| config.server.listen.clone());
    info!("starting netbed-server on {addr}");
    info!("store root: {}", config.store.root);
    info!("runtime backend: {}", config.runtime.backend);

    let api = Arc::new(Api::new(layout, runtime, &config));
    netbed_server::run_server(&api, &addr);
}
