use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tank_link_runtime::cli::{Cli, Cmd};
use tank_link_runtime::protocol::FrameKey;
use tank_link_runtime::{receiver, sim, transmitter};

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let cli = Cli::parse();
    if let Err(e) = dispatch(cli).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match cli.cmd {
        Cmd::Receiver(opts) => receiver::run(opts.resolve()?).await,
        Cmd::Transmitter(opts) => transmitter::run(opts.resolve()?).await,
        Cmd::Simulate(opts) => {
            let config = opts.resolve()?;
            let samples = sim::run_script(&config, &sim::demo_script());
            if sim::ended_safe(&samples) {
                info!("Simulation finished: rover stopped after link loss");
            } else {
                warn!("Simulation finished with the rover still driving");
            }
            Ok(())
        }
        Cmd::Keygen => {
            println!("{}", FrameKey::generate().to_hex());
            Ok(())
        }
    }
}
