use crate::pipeline::channel::RECORD_QUEUE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration. Every section is optional; defaults reproduce
/// the stock deployment (local tiedot backend on port 7778).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Overrides the OS hostname stamped on every record
    pub hostname: Option<String>,
    pub docker_socket: PathBuf,
    pub queue_capacity: usize,
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            hostname: None,
            docker_socket: PathBuf::from("/var/run/docker.sock"),
            queue_capacity: RECORD_QUEUE_CAPACITY,
            reconnect_delay: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: RECORD_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    /// When false the backend is managed externally and never spawned
    pub supervise: bool,
    pub command: String,
    pub args: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub readiness_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub restart_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7778".to_string(),
            supervise: true,
            command: "tiedot".to_string(),
            args: vec![
                "-mode=httpd".to_string(),
                "-dir=/tmp/locagodb".to_string(),
                "-port=7778".to_string(),
                "-bind=0.0.0.0".to_string(),
                "-verbose".to_string(),
            ],
            readiness_interval: Duration::from_secs(1),
            restart_delay: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Total insert attempts per record, first try included
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            retry_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 3600),
        }
    }
}
