//! # Configuration Management Module
//!
//! This module holds every tunable of the gateway in one structure that is
//! passed explicitly into each runtime component at construction time.
//!
//! ## Configuration Structure
//!
//! - [`ServerConfig`] - HTTP intake (bind address, endpoint paths, asset caching)
//! - [`SerialConfig`] - Device port settings and the AT command templates
//! - [`DispatchConfig`] - Queue polling, send pacing and optional queue capacity
//! - [`MonitorConfig`] - Keepalive probe interval
//! - [`LoggingConfig`] - Log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use smsgate::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     println!("HTTP port: {}", config.server.port);
//!     println!("Serial port: {}", config.serial.port);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! auto_start = true
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! auto_connect = true
//!
//! [dispatch]
//! send_interval_ms = 2000
//!
//! [monitor]
//! probe_interval_ms = 2000
//! ```
//!
//! Every section and key is optional; missing values fall back to the
//! defaults documented on each field.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP intake settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Endpoint accepting `POST` submissions.
    pub submit_path: String,
    /// Canonical submission form; redirects point here.
    pub form_path: String,
    pub stylesheet_path: String,
    /// `Cache-Control`/`Expires` horizon for the form and stylesheet.
    pub asset_max_age_days: u32,
    /// Start the listener as soon as the gateway starts.
    pub auto_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 80,
            submit_path: "/send_message".to_string(),
            form_path: "/sms_sender.html".to_string(),
            stylesheet_path: "/sms_sender.css".to_string(),
            asset_max_age_days: 7,
            auto_start: false,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn asset_max_age(&self) -> Duration {
        Duration::from_secs(86_400 * u64::from(self.asset_max_age_days))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`. Empty means "not configured".
    pub port: String,
    pub baud_rate: u32,
    /// Write timeout handed to the serial driver.
    pub timeout_ms: u64,
    /// Connect to `port` as soon as the gateway starts.
    pub auto_connect: bool,
    pub commands: DeviceCommands,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 9600,
            timeout_ms: 500,
            auto_connect: false,
            commands: DeviceCommands::default(),
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// AT command templates written to the device.
///
/// `{class}` and `{recipient}` are substituted per message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceCommands {
    pub text_mode: String,
    pub submit_params: String,
    pub begin_submit: String,
    /// Byte that commits the message body (SUB / Ctrl-Z).
    pub terminator: u8,
    pub probe: String,
}

impl Default for DeviceCommands {
    fn default() -> Self {
        Self {
            text_mode: "AT+CMGF=1\r".to_string(),
            submit_params: "AT+CSMP=17,169,0,24{class}\r".to_string(),
            begin_submit: "AT+CMGS=\"{recipient}\"\r".to_string(),
            terminator: 0x1A,
            probe: "AT\r".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long one dequeue waits before the stop flag is checked again.
    pub dequeue_timeout_ms: u64,
    /// Pause between two sends to respect device rate limits.
    pub send_interval_ms: u64,
    /// Maximum pending messages. `None` keeps the queue unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dequeue_timeout_ms: 2000,
            send_interval_ms: 2000,
            queue_capacity: None,
        }
    }
}

impl DispatchConfig {
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub probe_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: 2000,
        }
    }
}

impl MonitorConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Parse `level`, falling back to `Info` for unknown names.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }
}
