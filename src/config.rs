use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

pub const RPC_URL_ENV: &str = "ETH_ORCHESTRATOR_RPC_URL";
pub const SOLC_ENV: &str = "ETH_ORCHESTRATOR_SOLC";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub networks: HashMap<String, NetworkConfig>,
    pub default_network: String,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub compiler: CompilerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub gas: GasConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    pub default_gas_limit: u64,
    pub gas_price: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Number of workers; must exceed the number of concurrently active watches.
    pub pool_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { pool_size: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Delay between the end of one poll and the start of the next.
    pub poll_interval_ms: u64,
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    pub solc_path: String,
    pub combined_json: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            solc_path: "solc".to_string(),
            combined_json: "abi,bin".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut networks = HashMap::new();

        networks.insert(
            "local".to_string(),
            NetworkConfig {
                rpc_url: "http://127.0.0.1:8545".to_string(),
                chain_id: 1337,
                gas: GasConfig {
                    default_gas_limit: 3_000_000,
                    gas_price: Some(20_000_000_000), // 20 Gwei
                },
            },
        );

        networks.insert(
            "sepolia".to_string(),
            NetworkConfig {
                rpc_url: "https://ethereum-sepolia-rpc.publicnode.com".to_string(),
                chain_id: 11155111,
                gas: GasConfig {
                    default_gas_limit: 100_000,
                    gas_price: None,
                },
            },
        );

        Self {
            networks,
            default_network: "local".to_string(),
            executor: ExecutorConfig::default(),
            watch: WatchConfig::default(),
            compiler: CompilerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("Failed to create config directory {:?}: {}", parent, e)
                })?;
            }
        }

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env_vars();
        config
    }

    pub fn validate(&self) -> Result<()> {
        if !self.networks.contains_key(&self.default_network) {
            return Err(anyhow!(
                "Default network '{}' is not configured",
                self.default_network
            ));
        }
        if self.executor.pool_size == 0 {
            return Err(anyhow!("executor.pool_size must be at least 1"));
        }
        Ok(())
    }

    pub fn default_network_config_mut(&mut self) -> Option<&mut NetworkConfig> {
        self.networks.get_mut(&self.default_network)
    }

    fn apply_env_vars(&mut self) {
        if let Ok(rpc_url) = std::env::var(RPC_URL_ENV) {
            let network = self.default_network.clone();
            if let Some(network_config) = self.default_network_config_mut() {
                tracing::info!("Using {} for network {}", RPC_URL_ENV, network);
                network_config.rpc_url = rpc_url;
            }
        }

        if let Ok(solc) = std::env::var(SOLC_ENV) {
            tracing::debug!("Using {} for the compiler path", SOLC_ENV);
            self.compiler.solc_path = solc;
        }
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<std::path::PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("eth-orchestrator").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# eth-orchestrator configuration

# Network used when none is given on the command line
default_network = "local"

[networks.local]
rpc_url = "http://127.0.0.1:8545"
chain_id = 1337

[networks.local.gas]
default_gas_limit = 3_000_000
gas_price = 20_000_000_000  # 20 Gwei

[networks.sepolia]
rpc_url = "https://ethereum-sepolia-rpc.publicnode.com"
chain_id = 11155111

[networks.sepolia.gas]
default_gas_limit = 100_000

# Worker pool running every remote call and every filter poll.
# Keep it larger than the number of watches you run at once.
[executor]
pool_size = 4

[watch]
poll_interval_ms = 1000

[compiler]
solc_path = "solc"
combined_json = "abi,bin"

# Environment variables:
# ETH_ORCHESTRATOR_RPC_URL - overrides the default network's RPC URL
# ETH_ORCHESTRATOR_SOLC    - overrides compiler.solc_path
"#;
        sample_config.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sample_config_parses() {
        let config: Config = toml::from_str(&Config::generate_sample()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.default_network, "local");
        assert_eq!(config.executor.pool_size, 4);
        assert_eq!(config.watch.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.networks["local"].gas.gas_price, Some(20_000_000_000));
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.executor.pool_size = 8;
        config.watch.poll_interval_ms = 250;
        config.save_to_file(&path).await.unwrap();

        let loaded = Config::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.executor.pool_size, 8);
        assert_eq!(loaded.watch.poll_interval_ms, 250);
        assert_eq!(loaded.networks.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_file_falls_back_to_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        tokio::fs::write(&path, "default_network = 3").await.unwrap();

        assert!(Config::load_from_file(&path).await.is_err());
        let config = Config::load_or_default(Some(&path)).await;
        assert_eq!(config.default_network, "local");
    }

    #[test]
    fn test_validate_rejects_unknown_default_network() {
        let mut config = Config::default();
        config.default_network = "mainnet".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.executor.pool_size = 0;
        assert!(config.validate().is_err());
    }
}
