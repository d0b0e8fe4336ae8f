use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use stalkbot_runtime::config::RuntimeConfig;

#[derive(Parser)]
#[command(name = "stalkbot-runtime")]
#[command(about = "Differential-drive base and stalk driver bridged over Zenoh")]
struct Args {
    /// JSON config file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run against the simulated backend instead of the boards
    #[arg(long)]
    simulation: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let config = RuntimeConfig::load(args.config.as_deref()).and_then(|mut config| {
        config.simulation |= args.simulation;
        config.resolve()
    });
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = stalkbot_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
