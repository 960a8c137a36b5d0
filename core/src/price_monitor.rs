use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::adapters::AmmAdapter;
use crate::error::{EngineError, TransientError};
use crate::types::Position;

/// Result of one price observation for a position.
#[derive(Debug, Clone, Copy)]
pub struct PriceUpdate {
  pub price: f64,
  pub price_change_percent: f64,
  pub position_percent: f64,
}

/// Produces a USD price for a pool and reconciles the AMM's integer bin
/// ladder against it: the exact geometric ladder `raw(b) = (1 +
/// bin_step/10_000)^b` plus a scale-factor reconciliation against the pool's
/// own reported USD price.
pub struct PriceMonitor<A: AmmAdapter> {
  amm: Arc<A>,
  /// One scale factor per pool, computed once and cached.
  scale_cache: RwLock<HashMap<String, f64>>,
}

impl<A: AmmAdapter> PriceMonitor<A> {
  pub fn new(amm: Arc<A>) -> Self {
    Self {
      amm,
      scale_cache: RwLock::new(HashMap::new()),
    }
  }

  /// `raw(b) = (1 + bin_step / 10_000)^b`, unitless.
  pub fn raw_bin_price(bin_step: u32, bin_id: i32) -> f64 {
    (1.0 + bin_step as f64 / 10_000.0).powi(bin_id)
  }

  async fn scale_for(&self, pool_address: &str, bin_step: u32, active_bin_id: i32, usd_price: f64) -> f64 {
    if let Some(scale) = self.scale_cache.read().await.get(pool_address).copied() {
      return scale;
    }
    let raw_active = Self::raw_bin_price(bin_step, active_bin_id);
    let scale = if raw_active < 1.0 && usd_price >= 1.0 {
      usd_price / raw_active
    } else {
      1.0
    };
    self
      .scale_cache
      .write()
      .await
      .insert(pool_address.to_string(), scale);
    scale
  }

  /// `P(b) = scale * raw(b)` for an arbitrary bin, using the pool's cached
  /// scale factor.
  pub async fn bin_price(&self, pool_address: &str, bin_step: u32, bin_id: i32) -> f64 {
    let scale = self
      .scale_cache
      .read()
      .await
      .get(pool_address)
      .copied()
      .unwrap_or(1.0);
    scale * Self::raw_bin_price(bin_step, bin_id)
  }

  /// Reads current pool state and returns the USD price. Never returns zero
  /// or negative; a non-positive reading is treated as
  /// `PoolUnavailable`.
  pub async fn get_pool_price(&self, pool_address: &str) -> Result<f64, EngineError> {
    let snapshot = self.amm.pool_snapshot(pool_address).await?;
    if snapshot.usd_price <= 0.0 {
      return Err(EngineError::Transient(TransientError::RpcTimeout));
    }
    self
      .scale_for(
        pool_address,
        snapshot.bin_step,
        snapshot.active_bin_id,
        snapshot.usd_price,
      )
      .await;
    Ok(snapshot.usd_price)
  }

  /// Computes the `[lower, upper]` USD bounds for a bin range at open time:
  /// `lower = P(min_bin_id)`, `upper = P(max_bin_id + 1)`.
  pub async fn bin_range_bounds(
    &self,
    pool_address: &str,
    bin_step: u32,
    min_bin_id: i32,
    max_bin_id: i32,
  ) -> (f64, f64) {
    let lower = self.bin_price(pool_address, bin_step, min_bin_id).await;
    let upper = self.bin_price(pool_address, bin_step, max_bin_id + 1).await;
    (lower, upper)
  }

  /// Derives price-change and in-range-position metrics for a tracked
  /// position.
  pub async fn update_position_price(
    &self,
    position: &Position,
  ) -> Result<PriceUpdate, EngineError> {
    let price = self.get_pool_price(&position.pool_address).await?;
    let price_change_percent = (price - position.initial_price) / position.initial_price * 100.0;
    let span = position.upper_bound_price - position.lower_bound_price;
    let position_percent = if span.abs() > f64::EPSILON {
      (price - position.lower_bound_price) / span * 100.0
    } else {
      0.0
    };
    Ok(PriceUpdate {
      price,
      price_change_percent,
      position_percent,
    })
  }

  pub fn is_above_upper(position: &Position, price: f64) -> bool {
    price > position.upper_bound_price
  }

  pub fn is_below_lower(position: &Position, price: f64) -> bool {
    price < position.lower_bound_price
  }

  /// True inside the range, near the lower wall, where fee coverage should
  /// be checked before rebalancing down.
  pub fn is_at_fee_check_level(position: &Position, price: f64, position_percent: f64, fee_check_percent: f64) -> bool {
    position_percent <= fee_check_percent && price >= position.lower_bound_price
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_position() -> Position {
    use crate::types::*;
    Position {
      position_id: "pos-1".into(),
      pool_address: "pool-1".to_string(),
      owner_address: "owner-1".to_string(),
      mint_x: "So11111111111111111111111111111111111111112".to_string(),
      decimals_x: 9,
      mint_y: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
      decimals_y: 6,
      initial_amount_x: 0,
      initial_amount_y: 0,
      min_bin_id: -10,
      max_bin_id: 10,
      initial_price: 100.0,
      lower_bound_price: 96.0,
      upper_bound_price: 104.0,
      status: PositionStatus::Active,
      opened_at: chrono::Utc::now(),
      closed_at: None,
      last_price_check: None,
      current_price: None,
      accumulated_fees_usd: 0.0,
      auto_claim: None,
      last_claim_at: None,
      last_hedge_price: None,
      hedge_history: BoundedHistory::default(),
      consecutive_structural_errors: 0,
      pending_close_reason: None,
    }
  }

  #[test]
  fn raw_bin_price_matches_geometric_ladder() {
    let bin_step = 10; // 10 bps
    let p = PriceMonitor::<crate::testutil::FakeAmmAdapter>::raw_bin_price(bin_step, 1);
    assert!((p - 1.001).abs() < 1e-9);
  }

  #[test]
  fn above_below_within_are_mutually_exclusive() {
    let pos = sample_position();
    for price in [90.0, 100.0, 110.0, 96.0, 104.0] {
      let above = PriceMonitor::<crate::testutil::FakeAmmAdapter>::is_above_upper(&pos, price);
      let below = PriceMonitor::<crate::testutil::FakeAmmAdapter>::is_below_lower(&pos, price);
      let within = !above && !below;
      let exactly_one = (above as u8) + (below as u8) + (within as u8);
      assert_eq!(exactly_one, 1, "price {} violated exclusivity", price);
    }
  }
}
