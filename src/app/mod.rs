pub mod config;
pub mod initialization;
pub mod logging_system;
pub mod relay;
pub mod shutdown;

pub use config::{Config, ConfigError, LogFormat, LogLevel};
pub use initialization::InitializationError;
pub use logging_system::{LoggingSystem, setup_logging_safe};
pub use relay::{RelaySummary, run_relay};
pub use shutdown::spawn_signal_listener;

use crate::telemetry::{ShutdownReport, TelemetryService};
use clap::Parser;
use std::process;
use tokio::io::BufReader;
use tracing::{error, info};

pub struct App {
    config: Config,
    service: TelemetryService,
}

impl App {
    pub async fn from_args<I, T>(args: I) -> Result<Self, Box<dyn std::error::Error + Send + Sync>>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::from_args(args)?;
        Self::from_config(config).await
    }

    pub async fn from_config(
        config: Config,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let final_config = if let Some(config_file) = &config.config_file {
            eprintln!("Loading configuration from file: {}", config_file.display());
            Config::from_file(config_file)?
        } else {
            config
        };

        setup_logging_safe(
            final_config.log_level,
            final_config.log_format,
            &final_config.log_directives,
        )?;

        info!("Starting shopfront-telemetry v{}", get_version());
        info!(
            "Configuration: endpoint={}, batch_size={}, flush_delay={:?}, max_queue_size={}",
            final_config.endpoint,
            final_config.batch_size,
            final_config.flush_delay,
            final_config.max_queue_size
        );

        let service = TelemetryService::connect(
            final_config.telemetry_config(),
            final_config.client_config(),
            final_config.environment_facts(),
        )
        .map_err(InitializationError::from)?;

        Ok(Self {
            config: final_config,
            service,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> &TelemetryService {
        &self.service
    }

    /// Relays stdin until EOF or a shutdown signal, then drains the service.
    pub async fn run(
        self,
    ) -> Result<(RelaySummary, ShutdownReport), Box<dyn std::error::Error + Send + Sync>> {
        let token = spawn_signal_listener();
        info!("shopfront-telemetry is reading events from stdin. Press Ctrl+C to stop.");

        let relayed = run_relay(BufReader::new(tokio::io::stdin()), &self.service, &token).await;
        let report = self.service.shutdown().await;
        let summary = relayed?;

        info!("shopfront-telemetry stopped.");
        Ok((summary, report))
    }
}

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && (args[1] == "--version" || args[1] == "-V") {
        println!("shopfront-telemetry {}", get_version());
        return Ok(());
    }

    if args.len() > 1 && (args[1] == "--help" || args[1] == "-h") {
        Config::parse_from(["shopfront-telemetry", "--help"]);
        return Ok(());
    }

    let app = match App::from_args(args).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(1);
        }
    };

    match app.run().await {
        Ok((summary, report)) => {
            println!(
                "read={} tracked={} rejected={} sent={} batches={} failed_batches={} dropped={} undelivered={}",
                summary.lines_read,
                summary.events_tracked,
                summary.lines_rejected,
                report.stats.events_sent,
                report.stats.batches_sent,
                report.stats.batches_failed,
                report.stats.events_dropped,
                report.undelivered
            );

            if summary.interrupted {
                // The blocking stdin reader would keep the runtime from exiting.
                process::exit(i32::from(report.undelivered > 0));
            }
            if report.undelivered > 0 {
                process::exit(1);
            }
        }
        Err(e) => {
            error!("Application error: {}", e);
            process::exit(1);
        }
    }

    Ok(())
}
