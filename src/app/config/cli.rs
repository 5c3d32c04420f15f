use super::serde_helpers::{
    load_env_list, load_env_path_opt, load_env_string, load_env_var, load_env_var_opt,
};
use super::{ConfigError, LogFormat, LogLevel, RetryConfig};
use crate::buffer::BatchConfig;
use crate::domain::EnvironmentFacts;
use crate::sender::ClientConfig;
use crate::telemetry::TelemetryConfig;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about = "Relay analytics events from stdin to a telemetry collector", long_about = None)]
#[serde(default)]
pub struct Config {
    /// Telemetry collector endpoint URL
    #[arg(
        long,
        env = "COLLECTOR_ENDPOINT",
        default_value = "http://localhost:5000/api/telemetry"
    )]
    pub endpoint: String,

    /// Queued events that trigger an immediate flush
    #[arg(long, env = "BATCH_SIZE", default_value = "10")]
    pub batch_size: usize,

    /// Quiescence delay before a partial batch is flushed, in milliseconds
    #[arg(long, env = "FLUSH_DELAY_MS", default_value = "5000")]
    pub flush_delay_ms: u64,

    /// Maximum queued events; the oldest are dropped beyond this
    #[arg(long, env = "MAX_QUEUE_SIZE", default_value = "1000")]
    pub max_queue_size: usize,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info", ignore_case = true)]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", default_value = "compact", ignore_case = true)]
    pub log_format: LogFormat,

    /// Per-target log level such as `reqwest=debug` (repeatable)
    #[arg(long = "log-directive", env = "LOG_DIRECTIVES", value_delimiter = ',')]
    pub log_directives: Vec<String>,

    /// Accept events but discard them instead of sending
    #[arg(long, env = "DISABLE_TELEMETRY")]
    pub disable_telemetry: bool,

    /// Record a session_start event carrying host facts
    #[arg(long, env = "ANNOUNCE_SESSION")]
    pub announce_session: bool,

    /// Gzip request bodies above a few kilobytes
    #[arg(long, env = "ENABLE_COMPRESSION")]
    pub enable_compression: bool,

    /// Connection timeout in seconds
    #[arg(long, env = "CONNECTION_TIMEOUT_SECS", default_value = "10")]
    pub connection_timeout_secs: u64,

    /// Whole-request timeout in seconds (unset: no explicit timeout)
    #[arg(long, env = "REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    /// How long shutdown waits for in-flight sends, in seconds
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value = "4")]
    pub shutdown_grace_secs: u64,

    /// Page stamped on events until an input line sets page_url
    #[arg(long, env = "INITIAL_PAGE", default_value = "/")]
    pub initial_page: String,

    /// Configuration file path (optional)
    #[arg(long, env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Retry configuration (config file only)
    #[arg(skip)]
    pub retry: RetryConfig,

    /// Derived fields (not CLI arguments)
    #[serde(skip)]
    #[arg(skip)]
    pub flush_delay: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub connection_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000/api/telemetry".to_string(),
            batch_size: 10,
            flush_delay_ms: 5000,
            max_queue_size: 1000,
            log_level: LogLevel::Info,
            log_format: LogFormat::Compact,
            log_directives: Vec::new(),
            disable_telemetry: false,
            announce_session: false,
            enable_compression: false,
            connection_timeout_secs: 10,
            request_timeout_secs: None,
            shutdown_grace_secs: 4,
            initial_page: "/".to_string(),
            config_file: None,
            retry: RetryConfig::default(),
            flush_delay: Duration::from_millis(5000),
            connection_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = Config::parse_from(args);
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from environment variables alone, for hosts
    /// that embed the library without a command line. Reads the same
    /// variables as the `env` fallbacks of [`Config::from_args`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        load_env_string("COLLECTOR_ENDPOINT", &mut config.endpoint);
        load_env_var("BATCH_SIZE", &mut config.batch_size)?;
        load_env_var("FLUSH_DELAY_MS", &mut config.flush_delay_ms)?;
        load_env_var("MAX_QUEUE_SIZE", &mut config.max_queue_size)?;
        load_env_var("LOG_LEVEL", &mut config.log_level)?;

        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.log_format = match format.to_lowercase().as_str() {
                "compact" => LogFormat::Compact,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::EnvError(format!(
                        "Invalid LOG_FORMAT: {format}. Valid values: compact, json"
                    )));
                }
            };
        }

        load_env_list("LOG_DIRECTIVES", &mut config.log_directives);
        load_env_var("DISABLE_TELEMETRY", &mut config.disable_telemetry)?;
        load_env_var("ANNOUNCE_SESSION", &mut config.announce_session)?;
        load_env_var("ENABLE_COMPRESSION", &mut config.enable_compression)?;
        load_env_var("CONNECTION_TIMEOUT_SECS", &mut config.connection_timeout_secs)?;
        load_env_var_opt("REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs)?;
        load_env_var("SHUTDOWN_GRACE_SECS", &mut config.shutdown_grace_secs)?;
        load_env_string("INITIAL_PAGE", &mut config.initial_page);
        load_env_path_opt("CONFIG_FILE", &mut config.config_file);

        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content)?;
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn post_process(&mut self) -> Result<(), ConfigError> {
        self.flush_delay = Duration::from_millis(self.flush_delay_ms);
        self.connection_timeout = Duration::from_secs(self.connection_timeout_secs);
        Ok(())
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            enabled: !self.disable_telemetry,
            batch: BatchConfig {
                batch_size: self.batch_size,
                flush_delay: self.flush_delay,
                max_queue_size: self.max_queue_size,
            },
            retry: self.retry.clone(),
            announce_session: self.announce_session,
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.endpoint.clone(),
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
            connection_timeout: self.connection_timeout,
            enable_compression: self.enable_compression,
            ..ClientConfig::default()
        }
    }

    pub fn environment_facts(&self) -> EnvironmentFacts {
        EnvironmentFacts::detect().with_initial_page(self.initial_page.clone())
    }
}
