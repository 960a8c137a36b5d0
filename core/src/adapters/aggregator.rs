use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, TransientError};

/// Response shape of `GET /quote`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
  pub input_mint: String,
  pub output_mint: String,
  pub in_amount: String,
  pub out_amount: String,
  pub slippage_bps: u16,
  #[serde(default)]
  pub other_amount_threshold: Option<String>,
  #[serde(flatten)]
  pub extra: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct SwapInstructionsRequest<'a> {
  user_public_key: &'a str,
  quote: &'a Quote,
  #[serde(skip_serializing_if = "Option::is_none")]
  as_legacy_transaction: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SwapTransaction {
  pub swap_transaction_base64: String,
}

/// Aggregator HTTP surface consumed by `HedgeManager` and the supervisor's
/// missing-token auto-purchase path. A `reqwest::Client`-based adapter in
/// the same request/timeout/error-mapping shape used elsewhere in this
/// workspace, generalized here to a plain REST quote/swap pair.
#[async_trait]
pub trait AggregatorClient: Send + Sync {
  async fn quote(
    &self,
    input_mint: &str,
    output_mint: &str,
    amount: u128,
    slippage_bps: u16,
  ) -> Result<Quote, EngineError>;

  async fn swap_instructions(
    &self,
    user_public_key: &str,
    quote: &Quote,
  ) -> Result<SwapTransaction, EngineError>;
}

pub struct HttpAggregatorClient {
  base_url: String,
  client: reqwest::Client,
}

impl HttpAggregatorClient {
  pub fn new(base_url: String, timeout: Duration) -> anyhow::Result<Self> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { base_url, client })
  }
}

#[async_trait]
impl AggregatorClient for HttpAggregatorClient {
  async fn quote(
    &self,
    input_mint: &str,
    output_mint: &str,
    amount: u128,
    slippage_bps: u16,
  ) -> Result<Quote, EngineError> {
    let url = format!("{}/quote", self.base_url);
    let resp = self
      .client
      .get(&url)
      .query(&[
        ("input_mint", input_mint.to_string()),
        ("output_mint", output_mint.to_string()),
        ("amount", amount.to_string()),
        ("slippage_bps", slippage_bps.to_string()),
      ])
      .send()
      .await
      .map_err(|e| {
        log::warn!("aggregator quote request failed: {}", e);
        EngineError::Transient(TransientError::AggregatorUnavailable(e.to_string()))
      })?;

    if !resp.status().is_success() {
      return Err(EngineError::Transient(TransientError::AggregatorUnavailable(
        format!("quote returned status {}", resp.status()),
      )));
    }

    resp.json::<Quote>().await.map_err(|e| {
      EngineError::Transient(TransientError::AggregatorUnavailable(format!(
        "failed to parse quote: {}",
        e
      )))
    })
  }

  async fn swap_instructions(
    &self,
    user_public_key: &str,
    quote: &Quote,
  ) -> Result<SwapTransaction, EngineError> {
    let url = format!("{}/swap-instructions", self.base_url);
    let body = SwapInstructionsRequest {
      user_public_key,
      quote,
      as_legacy_transaction: None,
    };
    let resp = self.client.post(&url).json(&body).send().await.map_err(|e| {
      log::warn!("aggregator swap-instructions request failed: {}", e);
      EngineError::Transient(TransientError::AggregatorUnavailable(e.to_string()))
    })?;

    if !resp.status().is_success() {
      return Err(EngineError::Transient(TransientError::AggregatorUnavailable(
        format!("swap-instructions returned status {}", resp.status()),
      )));
    }

    resp.json::<SwapTransaction>().await.map_err(|e| {
      EngineError::Transient(TransientError::AggregatorUnavailable(format!(
        "failed to parse swap transaction: {}",
        e
      )))
    })
  }
}
