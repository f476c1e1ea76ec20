use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dashboard_mock_api::config::{Config, LatencyConfig, LogFormat};
use dashboard_mock_api::server;

/// Seedable mock backend for the data-quality dashboard.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Listen address (overrides MOCK_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides MOCK_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Fixture seed (overrides FIXTURE_SEED)
    #[arg(long)]
    seed: Option<u64>,

    /// Disable the simulated response latency
    #[arg(long)]
    no_delay: bool,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(seed) = self.seed {
            config.fixtures.seed = seed;
        }
        if self.no_delay {
            config.latency = LatencyConfig::disabled();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    cli.apply(&mut config);

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        seed = config.fixtures.seed,
        strict_validation = config.validation.strict,
        delay_min_ms = config.latency.min_ms,
        delay_max_ms = config.latency.max_ms,
        "Dashboard mock API starting..."
    );

    if let Err(e) = server::serve(config).await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
