//! Healthwatch CLI
//!
//! Runs the monitor, or with `--check-config` only validates a config file.

use std::path::PathBuf;

use clap::Parser;
use healthwatch::{load_config, Config, HealthwatchBuilder};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "healthwatch")]
#[command(about = "HTTP endpoint health monitoring with throttled alerts")]
#[command(version)]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long, env = "HEALTHWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Metrics and status API port (overrides config file)
    #[arg(long, conflicts_with = "no_server")]
    port: Option<u16>,

    /// Do not start the metrics and status API
    #[arg(long)]
    no_server: bool,

    /// Validate the configuration, list the endpoints and exit
    #[arg(long)]
    check_config: bool,

    /// Log level, used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

impl Args {
    fn load(&self) -> healthwatch::Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                tracing::debug!("Loading configuration from {:?}", path);
                load_config(path)?
            }
            None => {
                tracing::debug!("No config file given, using defaults");
                Config::default()
            }
        };

        if let Some(port) = self.port {
            config.server.port = port;
        }
        if self.no_server {
            config.server.enabled = false;
        }
        Ok(config)
    }
}

fn print_summary(config: &Config) {
    for endpoint in config.endpoints() {
        println!(
            "{}  {}  expect {}  every {:?}  re-alert after {:?}",
            endpoint.name,
            endpoint.url,
            endpoint.expect,
            endpoint.check_interval,
            endpoint.suppression_window
        );
    }
    let notifiers: Vec<_> = config.notifiers.iter().map(|n| n.type_name()).collect();
    println!(
        "{} endpoint(s), notifiers: [{}]",
        config.endpoints.len(),
        notifiers.join(", ")
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.as_str().to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = args.load()?;

    if args.check_config {
        config.validate()?;
        print_summary(&config);
        return Ok(());
    }

    if config.endpoints.is_empty() {
        tracing::warn!("No endpoints configured, nothing will be monitored");
    }

    tracing::info!(
        "Starting healthwatch: {} endpoint(s), {} notifier(s), API {}",
        config.endpoints.len(),
        config.notifiers.len(),
        if config.server.enabled {
            format!("on port {}", config.server.port)
        } else {
            "disabled".to_string()
        }
    );

    HealthwatchBuilder::new(config).build()?.start().await?;

    Ok(())
}
