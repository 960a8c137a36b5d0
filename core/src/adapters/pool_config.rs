use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::types::PoolConfig;

/// Per-pool tunables come from an admin CRUD surface that is out of scope
/// for this core: a narrow read-only trait is all the
/// supervisor needs, the same way `AmmAdapter`/`DiscoveryClient` stand in
/// for the rest of the system's external collaborators.
#[async_trait]
pub trait PoolConfigProvider: Send + Sync {
  async fn get(&self, pool_address: &str) -> Option<PoolConfig>;
}

/// In-process `PoolConfigProvider` backed by a map loaded once from the
/// checked-in `config.yaml` overlay (see `bot::config`). Good enough for a
/// single-operator bot; a real admin CRUD surface would back this with its
/// own HTTP client instead.
pub struct StaticPoolConfigProvider {
  pools: RwLock<HashMap<String, PoolConfig>>,
}

impl StaticPoolConfigProvider {
  pub fn new(pools: HashMap<String, PoolConfig>) -> Self {
    Self {
      pools: RwLock::new(pools),
    }
  }

  pub fn set(&self, pool_address: &str, config: PoolConfig) {
    self.pools.write().unwrap().insert(pool_address.to_string(), config);
  }
}

#[async_trait]
impl PoolConfigProvider for StaticPoolConfigProvider {
  async fn get(&self, pool_address: &str) -> Option<PoolConfig> {
    self.pools.read().unwrap().get(pool_address).cloned()
  }
}
