//! Configuration management for the Locket server
//!
//! Settings come from an optional YAML file, then `LOCKET`-prefixed environment
//! variables, then command line overrides.

use std::time::Duration;

use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

pub const DEFAULT_CONFIG_FILE: &str = "conf/locket.yml";

const DB_URL: &str = "db.url";
const DB_MAX_CONNECTIONS: &str = "db.pool.max_connections";
const DB_MIN_CONNECTIONS: &str = "db.pool.min_connections";
const DB_CONNECT_TIMEOUT: &str = "db.pool.connect_timeout";
const DB_ACQUIRE_TIMEOUT: &str = "db.pool.acquire_timeout";
const RETRY_INTERVAL: &str = "locket.retry_interval";
const METRICS_INTERVAL: &str = "locket.metrics_interval";
const LOG_LEVEL: &str = "locket.log_level";

/// Command line arguments for the server
#[derive(Debug, Default, Parser)]
#[command(name = "locket", about = "Distributed lock and presence service")]
pub struct Cli {
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,
    #[arg(long = "db-url", env = "DATABASE_URL")]
    pub database_url: Option<String>,
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(args: Cli) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder()
            .add_source(File::with_name(&args.config_file).required(false))
            .add_source(
                Environment::with_prefix("LOCKET")
                    .separator(".")
                    .try_parsing(true),
            );

        if let Some(v) = args.database_url {
            config_builder = config_builder.set_override(DB_URL, v)?;
        }
        if let Some(v) = args.log_level {
            config_builder = config_builder.set_override(LOG_LEVEL, v)?;
        }

        let config = config_builder.build()?;

        Ok(Configuration { config })
    }

    pub fn db_url(&self) -> Result<String, ConfigError> {
        self.config.get_string(DB_URL)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.config.get_int(RETRY_INTERVAL).unwrap_or(5).max(1) as u64)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.config.get_int(METRICS_INTERVAL).unwrap_or(10).max(1) as u64)
    }

    pub fn log_level(&self) -> String {
        self.config
            .get_string(LOG_LEVEL)
            .unwrap_or("info".to_string())
    }

    pub fn connect_options(&self) -> Result<ConnectOptions, ConfigError> {
        let max_connections = self.config.get_int(DB_MAX_CONNECTIONS).unwrap_or(20).max(1) as u32;
        let min_connections = self.config.get_int(DB_MIN_CONNECTIONS).unwrap_or(1).max(0) as u32;
        let connect_timeout = self.config.get_int(DB_CONNECT_TIMEOUT).unwrap_or(30).max(1) as u64;
        let acquire_timeout = self.config.get_int(DB_ACQUIRE_TIMEOUT).unwrap_or(30).max(1) as u64;

        let mut opt = ConnectOptions::new(self.db_url()?);

        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .acquire_timeout(Duration::from_secs(acquire_timeout))
            .sqlx_logging(false);

        tracing::info!(
            max_connections = max_connections,
            min_connections = min_connections,
            connect_timeout = connect_timeout,
            acquire_timeout = acquire_timeout,
            "Database connection pool configured"
        );

        Ok(opt)
    }

    pub async fn database_connection(&self) -> anyhow::Result<DatabaseConnection> {
        let database_connection = Database::connect(self.connect_options()?).await?;

        Ok(database_connection)
    }
}
