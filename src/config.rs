use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the storage node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub default_port: u16,
    /// `ConnTimeout` from spec.md §6 — deadline for a single transport call.
    pub conn_timeout_secs: u64,
    pub max_connections: usize,
    pub bootstrap_nodes: Vec<BootstrapNode>,
    pub max_workers_per_peer: usize,
    pub max_global_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapNode {
    pub peer_id: String,
    pub address: String,
}

/// Storage-mode selection and shard sizing, spec.md §4.6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub keys_dir: Option<PathBuf>,
    pub root_dir: PathBuf,
    pub mode: StorageModeConfig,
    pub shard_size: u64,
    pub max_slice_size: u64,
    pub min_slice_size: u64,
    pub max_upload_size: u64,
    pub min_upload_size: u64,
    pub max_sessions: usize,
    pub max_retries: u32,
    pub retry_interval_secs: u64,
    pub max_verify_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StorageModeConfig {
    File,
    Slice,
    RsSize { k: usize, m: usize },
    RsProportion { ratio: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Shamir scheme parameters for the per-file encryption secret, spec.md §4.2.
    pub shamir_n: u8,
    pub shamir_k: u8,
    pub verify_integrity: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                default_port: 40871,
                conn_timeout_secs: 60,
                max_connections: 100,
                bootstrap_nodes: vec![],
                max_workers_per_peer: 10,
                max_global_workers: 50,
            },
            storage: StorageConfig {
                keys_dir: None,
                root_dir: PathBuf::from("./meshvault-data"),
                mode: StorageModeConfig::RsSize { k: 4, m: 2 },
                shard_size: 1024 * 1024,
                max_slice_size: 4 * 1024 * 1024,
                min_slice_size: 1024 * 1024,
                max_upload_size: 4 * 1024 * 1024 * 1024,
                min_upload_size: 0,
                max_sessions: 3,
                max_retries: 3,
                retry_interval_secs: 1,
                max_verify_retries: 3,
            },
            security: SecurityConfig {
                shamir_n: 3,
                shamir_k: 2,
                verify_integrity: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                log_file: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults.
    pub fn load_or_default(config_path: Option<PathBuf>) -> crate::error::DfsResult<Self> {
        if let Some(path) = config_path {
            if path.exists() {
                let config_str = std::fs::read_to_string(&path)?;
                let config: Config = toml::from_str(&config_str)?;
                tracing::info!("loaded configuration from {:?}", path);
                return Ok(config);
            }
        }

        tracing::info!("using default configuration");
        Ok(Config::default())
    }

    pub fn save(&self, config_path: &PathBuf) -> crate::error::DfsResult<()> {
        let config_str = toml::to_string_pretty(self)?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(config_path, config_str)?;
        Ok(())
    }

    pub fn conn_timeout(&self) -> Duration {
        Duration::from_secs(self.network.conn_timeout_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.storage.retry_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.storage.shard_size, config.storage.shard_size);
        assert_eq!(parsed.storage.max_sessions, config.storage.max_sessions);
    }
}
