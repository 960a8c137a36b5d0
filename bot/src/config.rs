use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use lb_hedge_core::{GlobalConfig, MonitoringConfig, PoolConfig};
use serde::Deserialize;
use solana_sdk::signature::Keypair;

/// Non-secret tunables checked into `config.yaml`, the overlay merged onto
/// `GlobalConfig` defaults before the operator's secrets are read from the
/// environment.
#[derive(Debug, Deserialize)]
struct YamlConfig {
  monitoring: MonitoringConfig,
  default_pool: PoolConfig,
  #[serde(default)]
  pools: HashMap<String, PoolConfig>,
  data_dir: String,
}

/// Fully resolved configuration: `config.yaml`'s tunables plus the secrets
/// and per-process overrides read from the environment.
pub struct Config {
  pub global: GlobalConfig,
  pub pools: HashMap<String, PoolConfig>,
  pub data_dir: PathBuf,
  pub rpc_url: String,
  pub operator: Keypair,
  pub aggregator_base_url: String,
  pub discovery_base_url: String,
  pub rpc_timeout_ms: u64,
}

impl Config {
  /// Reads `config.yaml` from the binary's manifest directory, then layers
  /// environment secrets on top. `CHECK_INTERVAL_MS`/`HEDGE_INTERVAL_MS`, when
  /// set, override the matching `config.yaml` values for this process only.
  pub fn read() -> anyhow::Result<Self> {
    let dir = env!("CARGO_MANIFEST_DIR").to_string();
    let path = PathBuf::from_str(&format!("{}/config.yaml", dir))?;
    let contents = String::from_utf8(std::fs::read(&path)?)?;
    let mut yaml: YamlConfig = serde_yaml::from_str(&contents)?;

    if let Ok(raw) = std::env::var("CHECK_INTERVAL_MS") {
      yaml.monitoring.check_interval_ms = raw.parse()?;
    }
    if let Ok(raw) = std::env::var("HEDGE_INTERVAL_MS") {
      yaml.default_pool.mirror_swap.interval_ms = raw.parse()?;
    }

    let rpc_url = std::env::var("RPC_URL").unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string());
    let operator = lb_hedge_core::util::read_keypair_from_env("OPERATOR_SECRET_KEY")?;
    let aggregator_base_url = std::env::var("AGGREGATOR_BASE_URL")?;
    let discovery_base_url = std::env::var("DISCOVERY_BASE_URL")?;
    let rpc_timeout_ms = std::env::var("RPC_TIMEOUT_MS")
      .ok()
      .and_then(|v| v.parse().ok())
      .unwrap_or(15_000);

    Ok(Self {
      global: GlobalConfig {
        monitoring: yaml.monitoring,
        default_pool: yaml.default_pool,
      },
      pools: yaml.pools,
      data_dir: PathBuf::from(yaml.data_dir),
      rpc_url,
      operator,
      aggregator_base_url,
      discovery_base_url,
      rpc_timeout_ms,
    })
  }
}
