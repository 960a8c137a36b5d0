use std::sync::Arc;

use crate::adapters::{AmmAdapter, DiscoveryClient};

/// Chooses a pool to (re)open a position in, given a token pair and a
/// target price.
pub struct PoolSelector<A: AmmAdapter, D: DiscoveryClient> {
  amm: Arc<A>,
  discovery: Arc<D>,
}

impl<A: AmmAdapter, D: DiscoveryClient> PoolSelector<A, D> {
  pub fn new(amm: Arc<A>, discovery: Arc<D>) -> Self {
    Self { amm, discovery }
  }

  /// Selection policy:
  /// 1. Prefer `previous_pool` if it still exists and matches both mints.
  /// 2. Else enumerate via discovery, filter by mint pair, pick closest
  ///    active-bin USD price to `target_price`.
  /// 3. `None` if no candidate has nonzero liquidity.
  pub async fn select(
    &self,
    mint_x: &str,
    mint_y: &str,
    target_price: f64,
    previous_pool: Option<&str>,
  ) -> Option<String> {
    if let Some(prev) = previous_pool {
      if let Ok((x, y)) = self.amm.token_mints(prev).await {
        if x.mint == mint_x && y.mint == mint_y {
          if let Ok(snapshot) = self.amm.pool_snapshot(prev).await {
            if snapshot.active_bin_x > 0 || snapshot.active_bin_y > 0 {
              return Some(prev.to_string());
            }
          }
        }
      }
    }

    let pairs = match self.discovery.all_pairs().await {
      Ok(pairs) => pairs,
      Err(e) => {
        log::warn!("pool discovery failed: {}", e);
        return None;
      }
    };

    pairs
      .into_iter()
      .filter(|p| p.mint_x == mint_x && p.mint_y == mint_y && p.liquidity_usd > 0.0)
      .min_by(|a, b| {
        let da = (a.active_bin_price_usd - target_price).abs();
        let db = (b.active_bin_price_usd - target_price).abs();
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
      })
      .map(|p| p.address)
  }
}
