use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::dispatcher::DispatcherConfig;
use crate::events::PublisherConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// How long a connection waits for SQLite's write lock before failing.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
    /// How long a reservation waits for the write lock before the pass
    /// yields to the next tick.
    #[serde(default = "default_reserve_wait")]
    pub reserve_wait_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout(),
            reserve_wait_ms: default_reserve_wait(),
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn reserve_wait(&self) -> Duration {
        Duration::from_millis(self.reserve_wait_ms)
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("queueline.db")
}

fn default_busy_timeout() -> u64 {
    5000
}

fn default_reserve_wait() -> u64 {
    50
}

/// Live notifier configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifierConfig {
    /// Interval between liveness pings sent to each session.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval(),
        }
    }
}

impl NotifierConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

fn default_ping_interval() -> u64 {
    30
}

/// Sanitized config for API responses
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: SanitizedDatabaseConfig,
    pub dispatcher: DispatcherConfig,
    pub publisher: PublisherConfig,
    pub notifier: NotifierConfig,
}

/// Database config without the on-disk location
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDatabaseConfig {
    pub file_name: Option<String>,
    pub busy_timeout_ms: u64,
    pub reserve_wait_ms: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: SanitizedDatabaseConfig {
                file_name: config
                    .database
                    .path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned()),
                busy_timeout_ms: config.database.busy_timeout_ms,
                reserve_wait_ms: config.database.reserve_wait_ms,
            },
            dispatcher: config.dispatcher.clone(),
            publisher: config.publisher.clone(),
            notifier: config.notifier.clone(),
        }
    }
}
