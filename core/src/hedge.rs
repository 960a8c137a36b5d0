use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use solana_sdk::signature::Keypair;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::adapters::{AggregatorClient, AmmAdapter, RpcAdapter};
use crate::error::{EngineError, TransientError};
use crate::price_monitor::PriceMonitor;
use crate::store::PositionStore;
use crate::strategy::StrategyCalculator;
use crate::types::{HedgeDirection, HedgeSwap, MirrorSwapConfig, PositionId};
use crate::util::retry::retry_backoff;

const QUOTE_RETRY_ATTEMPTS: usize = 3;
const QUOTE_RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
const QUOTE_RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

struct RunningHedge {
  run: Arc<AtomicBool>,
  handle: JoinHandle<()>,
}

/// One periodic mirror-swap loop per active position: a cooperative
/// `while run.load(...) { step(); sleep(interval) }` loop, where `run` is an
/// `AtomicBool` flipped by `stop` and polled once per iteration.
pub struct HedgeManager<A: AmmAdapter, R: RpcAdapter, G: AggregatorClient> {
  amm: Arc<A>,
  rpc: Arc<R>,
  aggregator: Arc<G>,
  price_monitor: Arc<PriceMonitor<A>>,
  store: Arc<PositionStore>,
  operator: Arc<Keypair>,
  running: Mutex<HashMap<PositionId, RunningHedge>>,
}

impl<A, R, G> HedgeManager<A, R, G>
where
  A: AmmAdapter + 'static,
  R: RpcAdapter + 'static,
  G: AggregatorClient + 'static,
{
  pub fn new(
    amm: Arc<A>,
    rpc: Arc<R>,
    aggregator: Arc<G>,
    price_monitor: Arc<PriceMonitor<A>>,
    store: Arc<PositionStore>,
    operator: Arc<Keypair>,
  ) -> Arc<Self> {
    Arc::new(Self {
      amm,
      rpc,
      aggregator,
      price_monitor,
      store,
      operator,
      running: Mutex::new(HashMap::new()),
    })
  }

  /// Idempotent: a no-op if a loop for `position_id` is already running, or
  /// if mirror swap is disabled for the position's pool.
  pub async fn start(self: &Arc<Self>, position_id: PositionId, cfg: MirrorSwapConfig) {
    if !cfg.enabled {
      return;
    }
    let mut running = self.running.lock().await;
    if running.contains_key(&position_id) {
      return;
    }
    let run = Arc::new(AtomicBool::new(true));
    let this = self.clone();
    let pid = position_id.clone();
    let flag = run.clone();
    let handle = tokio::spawn(async move {
      this.run_loop(pid, cfg, flag).await;
    });
    running.insert(position_id, RunningHedge { run, handle });
  }

  /// Cancels the loop and awaits its in-flight step for up to one
  /// `check_interval`, per the concurrency model's shutdown guarantee.
  pub async fn stop(&self, position_id: &PositionId, check_interval: Duration) {
    let slot = self.running.lock().await.remove(position_id);
    if let Some(running) = slot {
      running.run.store(false, Ordering::SeqCst);
      if tokio::time::timeout(check_interval, running.handle).await.is_err() {
        log::warn!(
          "hedge loop for position {} did not exit within {:?}",
          position_id,
          check_interval
        );
      }
    }
  }

  pub async fn is_running(&self, position_id: &PositionId) -> bool {
    self.running.lock().await.contains_key(position_id)
  }

  async fn run_loop(self: Arc<Self>, position_id: PositionId, cfg: MirrorSwapConfig, run: Arc<AtomicBool>) {
    let interval = Duration::from_millis(cfg.interval_ms);
    while run.load(Ordering::Relaxed) {
      if let Err(e) = self.step(&position_id, &cfg).await {
        log::warn!("[hedge {}] step failed: {}", position_id, e);
      }
      tokio::time::sleep(interval).await;
    }
  }

  /// Revalue the position, size the mirror swap, gate it against the dust
  /// and oscillation floors, and submit it if it clears both.
  async fn step(&self, position_id: &PositionId, cfg: &MirrorSwapConfig) -> Result<(), EngineError> {
    let Some(position) = self.store.get_by_id(position_id).await else {
      return Ok(());
    };
    // The position may have been closed by the supervisor between this
    // loop's last sleep and now; the supervisor is also expected to have
    // called `stop` before close, but this check is the hedge loop's own
    // guard against racing a close it hasn't yet been told to stop for.
    if !position.is_active() {
      return Ok(());
    }

    let update = self.price_monitor.update_position_price(&position).await?;

    let bin_data = match self.amm.bin_liquidity(&position.position_id.0).await {
      Ok(bins) if !bins.is_empty() => Some(bins),
      Ok(_) => None,
      Err(e) => {
        log::debug!("[hedge {}] bin_liquidity unavailable, using fallback valuation: {}", position_id, e);
        None
      }
    };
    let position_value_usd = StrategyCalculator::value_at(&position, update.price, bin_data.as_deref());
    let sizing = StrategyCalculator::hedge_sizing(&position, update.price, cfg.hedge_amount_percent, position_value_usd);

    let dust_floor = cfg.min_hedge_bps / 10_000.0;
    if sizing.hedge_ratio < dust_floor {
      log::debug!(
        "[hedge {}] ratio {:.6} below dust floor {:.6}, skipping",
        position_id,
        sizing.hedge_ratio,
        dust_floor
      );
      return Ok(());
    }
    let step_percent = StrategyCalculator::price_step_percent(&position, update.price);
    if step_percent < cfg.min_hedge_step_percent {
      log::debug!(
        "[hedge {}] price step {:.4}% below minimum {:.4}%, skipping",
        position_id,
        step_percent,
        cfg.min_hedge_step_percent
      );
      return Ok(());
    }

    let (input_mint, output_mint, amount_smallest) = match sizing.direction {
      HedgeDirection::BuyX => (
        position.mint_y.clone(),
        position.mint_x.clone(),
        to_smallest_units(sizing.input_amount, position.decimals_y),
      ),
      HedgeDirection::SellX => (
        position.mint_x.clone(),
        position.mint_y.clone(),
        to_smallest_units(sizing.input_amount, position.decimals_x),
      ),
    };

    // `AggregatorUnavailable` is transient: retry with exponential backoff
    // capped at 5s, requesting a fresh quote each attempt rather than
    // reusing a possibly-stale one.
    let quote = retry_backoff(QUOTE_RETRY_ATTEMPTS, QUOTE_RETRY_BASE_DELAY, QUOTE_RETRY_MAX_DELAY, |_| {
      self.aggregator.quote(&input_mint, &output_mint, amount_smallest, cfg.slippage_bps)
    })
    .await?;
    let swap_tx = retry_backoff(QUOTE_RETRY_ATTEMPTS, QUOTE_RETRY_BASE_DELAY, QUOTE_RETRY_MAX_DELAY, |_| {
      self.aggregator.swap_instructions(&position.owner_address, &quote)
    })
    .await?;
    let sig = self
      .rpc
      .send_prebuilt_base64(&self.operator, &swap_tx.swap_transaction_base64)
      .await?;
    if !self.rpc.confirm(&sig).await? {
      return Err(EngineError::Transient(TransientError::SendFailure(
        "hedge swap did not confirm".to_string(),
      )));
    }

    let mut updated = position;
    updated.hedge_history.push(HedgeSwap {
      ts: Utc::now(),
      direction: sizing.direction,
      amount: sizing.input_amount,
      price: update.price,
      signature: sig.to_string(),
      input_mint,
      output_mint,
    });
    updated.last_hedge_price = Some(update.price);
    self.store.save(updated).await?;

    log::info!(
      "[hedge {}] {:?} {:.6} @ {:.4} ({})",
      position_id,
      sizing.direction,
      sizing.input_amount,
      update.price,
      sig
    );
    Ok(())
  }
}

fn to_smallest_units(amount_human: f64, decimals: u8) -> u128 {
  (amount_human.max(0.0) * 10f64.powi(decimals as i32)).round() as u128
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::amm::PoolSnapshot;
  use crate::adapters::aggregator::{Quote, SwapTransaction};
  use crate::testutil::{FakeAmmAdapter, FakeRpcAdapter};
  use crate::types::{AutoClaim, Position, PositionStatus};
  use crate::util::BoundedHistory;
  use async_trait::async_trait;
  use solana_sdk::signature::Keypair;
  use std::sync::Mutex as StdMutex;

  struct FakeAggregator {
    quotes: StdMutex<u32>,
  }

  #[async_trait]
  impl AggregatorClient for FakeAggregator {
    async fn quote(
      &self,
      input_mint: &str,
      output_mint: &str,
      amount: u128,
      slippage_bps: u16,
    ) -> Result<Quote, EngineError> {
      *self.quotes.lock().unwrap() += 1;
      Ok(Quote {
        input_mint: input_mint.to_string(),
        output_mint: output_mint.to_string(),
        in_amount: amount.to_string(),
        out_amount: amount.to_string(),
        slippage_bps,
        other_amount_threshold: None,
        extra: serde_json::Value::Null,
      })
    }

    async fn swap_instructions(&self, _user_public_key: &str, _quote: &Quote) -> Result<SwapTransaction, EngineError> {
      Ok(SwapTransaction {
        swap_transaction_base64: "deadbeef".to_string(),
      })
    }
  }

  fn sample_position() -> Position {
    Position {
      position_id: "pos-1".into(),
      pool_address: "pool-1".to_string(),
      owner_address: "owner-1".to_string(),
      mint_x: "X".to_string(),
      decimals_x: 9,
      mint_y: "Y".to_string(),
      decimals_y: 6,
      initial_amount_x: 1_000_000_000,
      initial_amount_y: 100_000_000,
      min_bin_id: -10,
      max_bin_id: 10,
      initial_price: 100.0,
      lower_bound_price: 90.0,
      upper_bound_price: 110.0,
      status: PositionStatus::Active,
      opened_at: chrono::Utc::now(),
      closed_at: None,
      last_price_check: None,
      current_price: None,
      accumulated_fees_usd: 0.0,
      auto_claim: None::<AutoClaim>,
      last_claim_at: None,
      last_hedge_price: None,
      hedge_history: BoundedHistory::default(),
      consecutive_structural_errors: 0,
      pending_close_reason: None,
    }
  }

  fn cfg() -> MirrorSwapConfig {
    MirrorSwapConfig {
      enabled: true,
      hedge_amount_percent: 50.0,
      slippage_bps: 50,
      interval_ms: 20,
      min_hedge_bps: 5.0,
      min_hedge_step_percent: 0.1,
    }
  }

  async fn harness(
    price: f64,
  ) -> (
    Arc<HedgeManager<FakeAmmAdapter, FakeRpcAdapter, FakeAggregator>>,
    Arc<PositionStore>,
  ) {
    let amm = Arc::new(FakeAmmAdapter::new());
    amm.set_snapshot(
      "pool-1",
      PoolSnapshot {
        active_bin_id: 0,
        bin_step: 10,
        usd_price: price,
        active_bin_x: 0,
        active_bin_y: 0,
      },
    );
    let rpc = Arc::new(FakeRpcAdapter::new());
    let aggregator = Arc::new(FakeAggregator { quotes: StdMutex::new(0) });
    let price_monitor = Arc::new(PriceMonitor::new(amm.clone()));
    let dir = std::env::temp_dir().join(format!("lb-hedge-core-hedge-test-{}", uuid::Uuid::new_v4()));
    let store = Arc::new(PositionStore::open(dir).await.unwrap());
    store.save(sample_position()).await.unwrap();
    let manager = HedgeManager::new(amm, rpc, aggregator, price_monitor, store.clone(), Arc::new(Keypair::new()));
    (manager, store)
  }

  #[tokio::test]
  async fn step_below_dust_floor_does_not_hedge() {
    let (manager, store) = harness(100.01).await;
    manager.step(&"pos-1".into(), &cfg()).await.unwrap();
    let p = store.get_by_id(&"pos-1".into()).await.unwrap();
    assert!(p.last_hedge_price.is_none());
  }

  #[tokio::test]
  async fn step_past_threshold_records_hedge_and_updates_last_hedge_price() {
    let (manager, store) = harness(95.0).await;
    manager.step(&"pos-1".into(), &cfg()).await.unwrap();
    let p = store.get_by_id(&"pos-1".into()).await.unwrap();
    assert_eq!(p.last_hedge_price, Some(95.0));
    assert_eq!(p.hedge_history.len(), 1);
    assert_eq!(p.hedge_history.last().unwrap().direction, HedgeDirection::BuyX);
  }

  #[tokio::test]
  async fn start_is_idempotent_and_stop_awaits_exit() {
    let (manager, _store) = harness(95.0).await;
    manager.start("pos-1".into(), cfg()).await;
    manager.start("pos-1".into(), cfg()).await;
    assert!(manager.is_running(&"pos-1".into()).await);
    manager.stop(&"pos-1".into(), Duration::from_millis(200)).await;
    assert!(!manager.is_running(&"pos-1".into()).await);
  }
}
