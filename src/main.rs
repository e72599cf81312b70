use anyhow::Result;
use clap::Parser;

use fleetcore::logging;
use fleetcore::Config;
use fleetcore_context::Context;

/// Cluster lifecycle orchestrator control plane.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the fleetcored configuration file to use.
    #[arg(short = 'c', long = "config", default_value_t = String::from("fleetcored.yaml"))]
    config: String,
}

fn main() {
    let result = run();

    if let Err(error) = result {
        eprintln!("fleetcored process failed: {error:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let starter = logging::starter();
    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(error) => {
            slog::warn!(
                starter, "failed to load configuration file, using defaults";
                "path" => &cli.config, "cause" => error.to_string(),
            );
            Config::default()
        }
    };

    let logger = logging::configure(&config.logging);
    let context = Context::root(logger).build();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to initialise the tokio runtime")
        .block_on(fleetcore::serve(context, config))
}
