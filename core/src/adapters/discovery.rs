use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{EngineError, TransientError};

#[derive(Debug, Clone, Deserialize)]
pub struct PoolSummary {
  pub address: String,
  pub mint_x: String,
  pub mint_y: String,
  #[serde(default)]
  pub liquidity_usd: f64,
  #[serde(default)]
  pub active_bin_price_usd: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolDetail {
  pub address: String,
  pub mint_x: String,
  pub mint_y: String,
  pub bin_step: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinDistribution {
  pub bins: Vec<BinEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinEntry {
  pub bin_id: i32,
  pub amount_x: String,
  pub amount_y: String,
}

/// Pool-discovery HTTP surface consumed by `PoolSelector`. A
/// best-effort collaborator: `bins` commonly 404s or times out for pools the
/// indexer hasn't back-filled, and callers are expected to tolerate that.
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
  async fn all_pairs(&self) -> Result<Vec<PoolSummary>, EngineError>;
  async fn pair(&self, address: &str) -> Result<PoolDetail, EngineError>;
  async fn bins(&self, address: &str) -> Result<Option<BinDistribution>, EngineError>;
}

pub struct HttpDiscoveryClient {
  base_url: String,
  client: reqwest::Client,
}

impl HttpDiscoveryClient {
  pub fn new(base_url: String, timeout: Duration) -> anyhow::Result<Self> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { base_url, client })
  }
}

#[async_trait]
impl DiscoveryClient for HttpDiscoveryClient {
  async fn all_pairs(&self) -> Result<Vec<PoolSummary>, EngineError> {
    let url = format!("{}/pair/all", self.base_url);
    self
      .client
      .get(&url)
      .send()
      .await
      .map_err(|e| EngineError::Transient(TransientError::AggregatorUnavailable(e.to_string())))?
      .json::<Vec<PoolSummary>>()
      .await
      .map_err(|e| EngineError::Transient(TransientError::AggregatorUnavailable(e.to_string())))
  }

  async fn pair(&self, address: &str) -> Result<PoolDetail, EngineError> {
    let url = format!("{}/pair/{}", self.base_url, address);
    self
      .client
      .get(&url)
      .send()
      .await
      .map_err(|e| EngineError::Transient(TransientError::AggregatorUnavailable(e.to_string())))?
      .json::<PoolDetail>()
      .await
      .map_err(|e| EngineError::Transient(TransientError::AggregatorUnavailable(e.to_string())))
  }

  async fn bins(&self, address: &str) -> Result<Option<BinDistribution>, EngineError> {
    let url = format!("{}/pair/{}/bins", self.base_url, address);
    match self.client.get(&url).send().await {
      Ok(resp) if resp.status().is_success() => match resp.json::<BinDistribution>().await {
        Ok(dist) => Ok(Some(dist)),
        Err(e) => {
          log::debug!("bins response for {} failed to parse: {}", address, e);
          Ok(None)
        }
      },
      Ok(resp) => {
        log::debug!("bins request for {} returned status {}", address, resp.status());
        Ok(None)
      }
      Err(e) => {
        log::debug!("bins request for {} failed: {}", address, e);
        Ok(None)
      }
    }
  }
}
