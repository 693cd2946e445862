use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, ValueEnum};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment, Provider,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which deployment variant this process runs.
#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Broadcast in-process only
    #[default]
    Direct,
    /// Persist to SQLite, serve /history, sweep expired rows, broadcast in-process
    Durable,
    /// Publish to NATS; broadcast from the queue consumer
    Broker,
}

/// Real-time message relay server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "relay-server", version, about = "Real-time chat message relay")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "RELAY_PORT", default_value = "6565")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "RELAY_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./relay.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "RELAY_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Deployment variant: direct, durable or broker
    #[arg(long, env = "RELAY_MODE", value_enum, default_value = "direct")]
    pub mode: RelayMode,

    /// Per-subscriber write timeout in milliseconds
    #[arg(long, env = "RELAY_WRITE_TIMEOUT_MS", default_value = "5000")]
    pub write_timeout_ms: u64,

    /// Frames queued per subscriber before writes start timing out
    #[arg(long, env = "RELAY_OUTBOUND_BUFFER", default_value = "64")]
    pub outbound_buffer: usize,

    /// Message history configuration (loaded from [history] section in TOML)
    #[arg(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryConfig>,

    /// Broker configuration (loaded from [broker] section in TOML)
    #[arg(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker: Option<BrokerConfig>,
}

/// Configuration for the durable message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Directory holding the SQLite database (default: ./data)
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Maximum messages returned per /history call (default: 10)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Age in seconds after which messages are purged (default: 86400 = 24 hours)
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Interval in seconds between retention cleanup runs (default: 86400 = 24 hours)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            page_size: default_page_size(),
            retention_secs: default_retention_secs(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_page_size() -> u32 {
    10
}

fn default_retention_secs() -> u64 {
    86400
}

fn default_cleanup_interval() -> u64 {
    86400
}

/// Configuration for the NATS broker bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// NATS server URL (default: nats://localhost:4222)
    #[serde(default = "default_broker_url")]
    pub url: String,

    /// Subject messages are published to (default: relay.messages)
    #[serde(default = "default_subject")]
    pub subject: String,

    /// Queue group shared by all broadcasting consumers (default: relay-broadcasters)
    #[serde(default = "default_queue_group")]
    pub queue_group: String,

    /// Run the consumer loop in this process (default: true).
    /// Set false for publish-only ingress deployments.
    #[serde(default = "default_consume")]
    pub consume: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            subject: default_subject(),
            queue_group: default_queue_group(),
            consume: default_consume(),
        }
    }
}

fn default_broker_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_subject() -> String {
    "relay.messages".to_string()
}

fn default_queue_group() -> String {
    "relay-broadcasters".to_string()
}

fn default_consume() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 6565,
            bind_address: "0.0.0.0".to_string(),
            config: "./relay.toml".to_string(),
            json_logs: false,
            generate_config: false,
            mode: RelayMode::Direct,
            write_timeout_ms: 5000,
            outbound_buffer: 64,
            history: None,
            broker: None,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (RELAY_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let matches = Config::command().get_matches();
        let cli = Config::from_arg_matches(&matches).map_err(|e| e.to_string())?;

        let config: Config = Self::layered(&matches, &cli, Toml::file(&cli.config))?.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Build the figment chain over `file`. Only flags given on the command
    /// line are merged on top; clap defaults and clap-read env values are not,
    /// so they cannot mask the file or the `RELAY_*` layer.
    fn layered(
        matches: &ArgMatches,
        cli: &Config,
        file: impl Provider,
    ) -> Result<Figment, figment::Error> {
        let serde_json::Value::Object(mut flags) =
            serde_json::to_value(cli).map_err(|e| e.to_string())?
        else {
            return Err("CLI arguments did not serialize to a table".to_string().into());
        };
        flags.retain(|key, _| {
            matches.ids().any(|id| id.as_str() == key)
                && matches.value_source(key) == Some(ValueSource::CommandLine)
        });

        Ok(Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(file)
            .merge(Env::prefixed("RELAY_").split("__"))
            .merge(Serialized::defaults(flags)))
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), figment::Error> {
        if self.write_timeout_ms == 0 {
            return Err("write_timeout_ms must be greater than 0".to_string().into());
        }
        if self.outbound_buffer == 0 {
            return Err("outbound_buffer must be greater than 0".to_string().into());
        }
        let history = self.history();
        if history.page_size == 0 {
            return Err("history.page_size must be greater than 0".to_string().into());
        }
        if history.cleanup_interval_secs == 0 {
            return Err("history.cleanup_interval_secs must be greater than 0".to_string().into());
        }
        Ok(())
    }

    pub fn history(&self) -> HistoryConfig {
        self.history.clone().unwrap_or_default()
    }

    pub fn broker(&self) -> BrokerConfig {
        self.broker.clone().unwrap_or_default()
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Relay Server Configuration
# Place this file at ./relay.toml or specify with --config <path>
# All settings can be overridden via environment variables (RELAY_PORT,
# RELAY_HISTORY__PAGE_SIZE, etc.) or CLI flags (--port, etc.)

# Server port (default: 6565)
# port = 6565

# Bind address (default: 0.0.0.0 - all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Deployment variant: "direct", "durable" or "broker"
# mode = "direct"

# Per-subscriber write timeout in milliseconds. A subscriber that cannot
# accept a message within this time is disconnected.
# write_timeout_ms = 5000

# Frames buffered per subscriber
# outbound_buffer = 64

# ---- Message History (mode = "durable") ----
# [history]
# data_dir = "./data"
# page_size = 10
# retention_secs = 86400          # 24 hours
# cleanup_interval_secs = 86400   # 24 hours

# ---- Broker Bridge (mode = "broker") ----
# [broker]
# url = "nats://localhost:4222"
# subject = "relay.messages"
# queue_group = "relay-broadcasters"
# consume = true                  # false = publish-only ingress process
"#
    .to_string()
}
