use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use tokio::sync::Mutex;

use crate::adapters::{AggregatorClient, AmmAdapter, DiscoveryClient, PoolConfigProvider, RpcAdapter};
use crate::error::EngineError;
use crate::hedge::HedgeManager;
use crate::pool_selector::PoolSelector;
use crate::position_manager::{CloseReason, PositionManager};
use crate::price_monitor::PriceMonitor;
use crate::store::PositionStore;
use crate::strategy::StrategyCalculator;
use crate::types::{AutoClaim, DecisionKind, GlobalConfig, Position, PositionId, PositionStatus};

/// Consecutive structural errors after which a position is pulled out of
/// rotation for manual review.
const QUARANTINE_THRESHOLD: u32 = 5;
/// Cool-down window after an `open_new` attempt fails with insufficient
/// balance: a short back-pressure window before the next reopen attempt.
const INSUFFICIENT_BALANCE_COOLDOWN: Duration = Duration::from_secs(60);
/// How long to poll the wallet for settled tokens after a close, before
/// giving up and attempting the reopen anyway.
const SETTLEMENT_POLL_TIMEOUT: Duration = Duration::from_secs(20);
const SETTLEMENT_POLL_INTERVAL: Duration = Duration::from_millis(2_000);

/// An aggregator swap transaction the supervisor could not auto-sign: it
/// requires the wallet user's own signature, so the reopen for this
/// position is paused until the caller (the CLI / UI, out of scope here)
/// returns a signed transaction. Surfaced via `PositionMonitor::pending`.
#[derive(Debug, Clone)]
pub struct PendingUserSwap {
  pub position_id: PositionId,
  pub input_mint: String,
  pub output_mint: String,
  pub amount_needed: u128,
  pub swap_transaction_base64: String,
  pub queued_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
  pub positions_seen: usize,
  pub closed: usize,
  pub reopened: usize,
  pub claimed: usize,
  pub skipped_locked: usize,
  pub errors: usize,
  pub quarantined: usize,
}

/// The supervisor: runs the global monitoring tick, dispatches decisions to
/// `PositionManager`, starts/stops hedge loops, and synchronizes against
/// `PositionStore`. Same cooperative loop shape as `HedgeManager`, generalized
/// from a single position to the full set of tracked positions, with one
/// `tokio::task::JoinHandle` per hedge loop.
pub struct PositionMonitor<A, R, G, D>
where
  A: AmmAdapter + 'static,
  R: RpcAdapter + 'static,
  G: AggregatorClient + 'static,
  D: DiscoveryClient + 'static,
{
  amm: Arc<A>,
  rpc: Arc<R>,
  price_monitor: Arc<PriceMonitor<A>>,
  position_manager: Arc<PositionManager<A, R>>,
  pool_selector: Arc<PoolSelector<A, D>>,
  hedge_manager: Arc<HedgeManager<A, R, G>>,
  aggregator: Arc<G>,
  store: Arc<PositionStore>,
  pool_configs: Arc<dyn PoolConfigProvider>,
  global: GlobalConfig,

  /// Process-wide active-positions cache, owned exclusively by this
  /// supervisor task. Never exposed directly; every read/write goes
  /// through this guarded accessor.
  known: Mutex<HashSet<PositionId>>,
  /// Per-position mutex guarding the decide+dispatch pair, so a tick
  /// slower than `check_interval_ms` never double-acts on a position.
  locks: Mutex<HashMap<PositionId, Arc<Mutex<()>>>>,
  rebalance_cooldown: Mutex<HashMap<PositionId, Instant>>,
  pending_swaps: Mutex<HashMap<PositionId, PendingUserSwap>>,
}

impl<A, R, G, D> PositionMonitor<A, R, G, D>
where
  A: AmmAdapter + 'static,
  R: RpcAdapter + 'static,
  G: AggregatorClient + 'static,
  D: DiscoveryClient + 'static,
{
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    amm: Arc<A>,
    rpc: Arc<R>,
    aggregator: Arc<G>,
    price_monitor: Arc<PriceMonitor<A>>,
    position_manager: Arc<PositionManager<A, R>>,
    pool_selector: Arc<PoolSelector<A, D>>,
    hedge_manager: Arc<HedgeManager<A, R, G>>,
    store: Arc<PositionStore>,
    pool_configs: Arc<dyn PoolConfigProvider>,
    global: GlobalConfig,
  ) -> Arc<Self> {
    Arc::new(Self {
      amm,
      rpc,
      price_monitor,
      position_manager,
      pool_selector,
      hedge_manager,
      aggregator,
      store,
      pool_configs,
      global,
      known: Mutex::new(HashSet::new()),
      locks: Mutex::new(HashMap::new()),
      rebalance_cooldown: Mutex::new(HashMap::new()),
      pending_swaps: Mutex::new(HashMap::new()),
    })
  }

  /// The never-ending supervisor loop, run as its own task. Exits when
  /// `run` flips to `false`.
  pub async fn run(self: Arc<Self>, run: Arc<std::sync::atomic::AtomicBool>) {
    let interval = Duration::from_millis(self.global.monitoring.check_interval_ms);
    while run.load(std::sync::atomic::Ordering::Relaxed) {
      let summary = self.tick().await;
      log::info!(
        "tick: {} positions, {} closed, {} reopened, {} claimed, {} skipped (locked), {} errors, {} quarantined",
        summary.positions_seen,
        summary.closed,
        summary.reopened,
        summary.claimed,
        summary.skipped_locked,
        summary.errors,
        summary.quarantined
      );
      tokio::time::sleep(interval).await;
    }
  }

  pub async fn pending_swaps(&self) -> Vec<PendingUserSwap> {
    self.pending_swaps.lock().await.values().cloned().collect()
  }

  /// Resolves a previously-queued `PendingUserSwap` once the caller has
  /// obtained the user's signature elsewhere (out of scope here); the
  /// reopen itself still runs on the next tick.
  pub async fn clear_pending_swap(&self, position_id: &PositionId) {
    self.pending_swaps.lock().await.remove(position_id);
  }

  /// One supervisor tick: sync on-chain state, start hedge loops for newly
  /// discovered positions, then claim/decide/dispatch for each.
  pub async fn tick(&self) -> TickSummary {
    self.sync_active().await;
    self.start_hedge_loops_for_new_positions().await;

    let mut summary = TickSummary::default();
    let active = self.store.all_active().await;
    summary.positions_seen = active.len();

    for position in active {
      let id = position.position_id.clone();
      let lock = self.lock_for(&id).await;
      let _guard = match lock.try_lock() {
        Ok(g) => g,
        Err(_) => {
          summary.skipped_locked += 1;
          continue;
        }
      };

      match self.process_position(position).await {
        Ok(Outcome::Closed) => summary.closed += 1,
        Ok(Outcome::Reopened) => {
          summary.closed += 1;
          summary.reopened += 1;
        }
        Ok(Outcome::Claimed) => summary.claimed += 1,
        Ok(Outcome::Quarantined) => summary.quarantined += 1,
        Ok(Outcome::None) => {}
        Err(e) => {
          log::warn!("tick: position {} action failed: {}", id, e);
          if self.record_structural_error(&id, &e).await {
            summary.quarantined += 1;
          }
          summary.errors += 1;
        }
      }
    }
    summary
  }

  async fn lock_for(&self, id: &PositionId) -> Arc<Mutex<()>> {
    self
      .locks
      .lock()
      .await
      .entry(id.clone())
      .or_insert_with(|| Arc::new(Mutex::new(())))
      .clone()
  }

  /// Step 1: reload active positions, verify on-chain existence and owning
  /// program, mark the missing/reassigned ones as closed.
  async fn sync_active(&self) {
    for position in self.store.all_active().await {
      let Ok(pubkey) = Pubkey::from_str(&position.position_id.0) else {
        continue;
      };
      let exists_and_owned = match self.rpc.get_account_info(&pubkey).await {
        Ok(Some(account)) => account.owner == self.amm.program_id(),
        Ok(None) => false,
        Err(e) => {
          log::debug!("sync_active: could not verify position {}: {}", position.position_id, e);
          true // transient RPC failure: don't reconcile away on a guess
        }
      };
      if !exists_and_owned {
        log::info!(
          "position {} no longer exists on-chain under the AMM program; marking closed",
          position.position_id
        );
        let mut closed = position.clone();
        closed.status = PositionStatus::Closed;
        closed.closed_at = Some(chrono::Utc::now());
        if let Err(e) = self.store.save(closed).await {
          log::error!("failed to persist reconciled close for {}: {}", position.position_id, e);
          continue;
        }
        self
          .hedge_manager
          .stop(&position.position_id, self.hedge_stop_timeout(&position))
          .await;
      }
    }
  }

  /// Step 2: start hedge loops for any active position this process has
  /// not seen before (first tick after a restart, or a position opened by
  /// a previous process).
  async fn start_hedge_loops_for_new_positions(&self) {
    let mut known = self.known.lock().await;
    for position in self.store.all_active().await {
      if known.contains(&position.position_id) {
        continue;
      }
      known.insert(position.position_id.clone());
      let cfg = self.merged_config(&position.pool_address).await;
      self
        .hedge_manager
        .start(position.position_id.clone(), cfg.pool.mirror_swap)
        .await;
    }
  }

  async fn merged_config(&self, pool_address: &str) -> crate::types::MergedConfig {
    let pool = self.pool_configs.get(pool_address).await;
    self.global.merge(pool.as_ref())
  }

  /// How long to wait for a hedge loop's task to exit after `stop` flips
  /// its cancellation flag, before logging a warning and moving on.
  fn hedge_stop_timeout(&self, _position: &Position) -> Duration {
    Duration::from_secs(5)
  }

  /// Step 3: claim (if due), decide, dispatch. Pure decision + side
  /// effects kept separate from the pure `StrategyCalculator::decide` call.
  async fn process_position(&self, position: Position) -> Result<Outcome, EngineError> {
    let cfg = self.merged_config(&position.pool_address).await;

    let update = self.price_monitor.update_position_price(&position).await?;
    let bin_data = self.amm.bin_liquidity(&position.position_id.0).await.ok().filter(|b| !b.is_empty());

    let mut position = position;
    position.current_price = Some(update.price);
    position.last_price_check = Some(chrono::Utc::now());

    let mut claimed = false;
    if let Some(AutoClaim { enabled: true, threshold_usd }) = position.auto_claim {
      let fees = self.amm.claimable_fees(&position.position_id.0).await.ok();
      let fees_usd = StrategyCalculator::claimable_fees_usd(&position, update.price, fees);
      if fees_usd >= threshold_usd {
        match self.position_manager.claim(&position).await {
          Ok(sig) => {
            log::info!("claimed fees for {}: {}", position.position_id, sig);
            position.last_claim_at = Some(chrono::Utc::now());
            claimed = true;
          }
          Err(e) if e.is_transient() => log::warn!("claim failed transiently for {}: {}", position.position_id, e),
          Err(e) => return Err(e),
        }
      }
      position.accumulated_fees_usd = fees_usd;
    }

    self.store.save(position.clone()).await?;

    let decision = StrategyCalculator::decide(
      &position,
      update.price,
      update.position_percent,
      cfg.pool.fee_check_percent,
      cfg.pool.stop_loss_percent,
      position.accumulated_fees_usd,
      bin_data.as_deref(),
    );

    match decision.kind {
      DecisionKind::None => Ok(if claimed { Outcome::Claimed } else { Outcome::None }),
      DecisionKind::Close => {
        self.hedge_manager.stop(&position.position_id, self.hedge_stop_timeout(&position)).await;
        let mut pending = position.clone();
        pending.status = PositionStatus::PendingClose;
        pending.pending_close_reason = Some(CloseReason::StopLoss);
        self.store.save(pending).await?;
        self.position_manager.close(&position, CloseReason::StopLoss).await?;
        let mut closed = position.clone();
        closed.status = PositionStatus::Closed;
        closed.closed_at = Some(chrono::Utc::now());
        closed.pending_close_reason = None;
        self.store.save(closed).await?;
        Ok(Outcome::Closed)
      }
      DecisionKind::OpenNewAbove => self.rebalance(position, CloseReason::TakeProfit).await,
      DecisionKind::OpenNewBelow => self.rebalance(position, CloseReason::Rebalance).await,
    }
  }

  /// Close-then-reopen: close the old position, wait for the wallet to
  /// settle, then open a new one in the same pool (or via `PoolSelector`
  /// if the pool is gone), reusing `range_interval`.
  async fn rebalance(&self, position: Position, reason: CloseReason) -> Result<Outcome, EngineError> {
    if self.in_cooldown(&position.position_id).await {
      log::debug!("position {} is in insufficient-balance cool-down, skipping reopen", position.position_id);
      return Ok(Outcome::None);
    }

    self.hedge_manager.stop(&position.position_id, self.hedge_stop_timeout(&position)).await;
    let mut pending = position.clone();
    pending.status = PositionStatus::PendingClose;
    pending.pending_close_reason = Some(reason);
    self.store.save(pending).await?;
    self.position_manager.close(&position, reason).await?;

    let mut closed = position.clone();
    closed.status = PositionStatus::Closed;
    closed.closed_at = Some(chrono::Utc::now());
    closed.pending_close_reason = None;
    self.store.save(closed).await?;

    self.await_settlement(&position).await;

    let target_price = position.current_price.unwrap_or(position.initial_price);
    let pool_address = match self.amm.token_mints(&position.pool_address).await {
      Ok(_) => position.pool_address.clone(),
      Err(_) => self
        .pool_selector
        .select(&position.mint_x, &position.mint_y, target_price, Some(&position.pool_address))
        .await
        .ok_or_else(|| {
          EngineError::Structural(crate::error::StructuralError::PoolNotFound)
        })?,
    };

    if let Some(pending) = self.ensure_wallet_funded(&position, &pool_address).await? {
      self.pending_swaps.lock().await.insert(position.position_id.clone(), pending);
      return Ok(Outcome::Closed);
    }

    let range_interval = position.range_interval();
    match self
      .position_manager
      .open(
        &pool_address,
        &position.owner_address,
        position.initial_amount_x,
        position.initial_amount_y,
        range_interval,
        position.auto_claim.clone(),
      )
      .await
    {
      Ok(new_position) => {
        self.store.save(new_position.clone()).await?;
        self.known.lock().await.insert(new_position.position_id.clone());
        let cfg = self.merged_config(&pool_address).await;
        self.hedge_manager.start(new_position.position_id, cfg.pool.mirror_swap).await;
        Ok(Outcome::Reopened)
      }
      Err(EngineError::Structural(crate::error::StructuralError::InsufficientBalance)) => {
        self
          .rebalance_cooldown
          .lock()
          .await
          .insert(position.position_id.clone(), Instant::now());
        Ok(Outcome::Closed)
      }
      Err(e) => Err(e),
    }
  }

  async fn in_cooldown(&self, id: &PositionId) -> bool {
    let mut cooldowns = self.rebalance_cooldown.lock().await;
    cooldowns.retain(|_, since| since.elapsed() < INSUFFICIENT_BALANCE_COOLDOWN);
    cooldowns.contains_key(id)
  }

  async fn await_settlement(&self, position: &Position) {
    let Ok(owner) = Pubkey::from_str(&position.owner_address) else {
      return;
    };
    let Ok(mint_x) = Pubkey::from_str(&position.mint_x) else {
      return;
    };
    let ata_x = spl_associated_token_account::get_associated_token_address(&owner, &mint_x);
    let deadline = Instant::now() + SETTLEMENT_POLL_TIMEOUT;
    loop {
      match self.rpc.get_token_account_balance(&ata_x).await {
        Ok(balance) if balance > 0 => return,
        _ => {}
      }
      if Instant::now() >= deadline {
        log::debug!("settlement poll timed out for {}, proceeding anyway", position.position_id);
        return;
      }
      tokio::time::sleep(SETTLEMENT_POLL_INTERVAL).await;
    }
  }

  /// Checks whether the wallet holds enough X and Y to reopen with the
  /// same size; if not, builds an aggregator swap to acquire the shortfall
  /// and returns it unsubmitted, since it requires the wallet user's
  /// signature rather than the operator key.
  async fn ensure_wallet_funded(&self, position: &Position, pool_address: &str) -> Result<Option<PendingUserSwap>, EngineError> {
    let Ok(owner) = Pubkey::from_str(&position.owner_address) else {
      return Ok(None);
    };
    let Ok(mint_x) = Pubkey::from_str(&position.mint_x) else {
      return Ok(None);
    };
    let Ok(mint_y) = Pubkey::from_str(&position.mint_y) else {
      return Ok(None);
    };
    let ata_x = spl_associated_token_account::get_associated_token_address(&owner, &mint_x);
    let ata_y = spl_associated_token_account::get_associated_token_address(&owner, &mint_y);

    let have_x = self.rpc.get_token_account_balance(&ata_x).await.unwrap_or(0);
    let have_y = self.rpc.get_token_account_balance(&ata_y).await.unwrap_or(0);

    if have_x >= position.initial_amount_x && have_y >= position.initial_amount_y {
      return Ok(None);
    }

    // Short on Y (the usual stablecoin leg) is bought with X, and vice
    // versa; short on both simultaneously is not resolvable by a single
    // swap and is left to the operator.
    let (input_mint, output_mint, shortfall) = if have_y < position.initial_amount_y && have_x > position.initial_amount_x {
      (position.mint_x.clone(), position.mint_y.clone(), position.initial_amount_y - have_y)
    } else if have_x < position.initial_amount_x && have_y > position.initial_amount_y {
      (position.mint_y.clone(), position.mint_x.clone(), position.initial_amount_x - have_x)
    } else {
      log::warn!(
        "position {} cannot reopen: wallet short on both legs in pool {}, needs manual funding",
        position.position_id,
        pool_address
      );
      return Err(EngineError::Structural(crate::error::StructuralError::InsufficientBalance));
    };

    let quote = self.aggregator.quote(&input_mint, &output_mint, shortfall, 50).await?;
    let swap = self.aggregator.swap_instructions(&position.owner_address, &quote).await?;
    Ok(Some(PendingUserSwap {
      position_id: position.position_id.clone(),
      input_mint,
      output_mint,
      amount_needed: shortfall,
      swap_transaction_base64: swap.swap_transaction_base64,
      queued_at: chrono::Utc::now(),
    }))
  }

  /// Returns `true` if this error moved the position to `pending_close` for
  /// manual review.
  async fn record_structural_error(&self, id: &PositionId, err: &EngineError) -> bool {
    if !err.is_structural() {
      return false;
    }
    let Some(mut position) = self.store.get_by_id(id).await else {
      return false;
    };
    position.consecutive_structural_errors += 1;
    let quarantine = position.consecutive_structural_errors >= QUARANTINE_THRESHOLD;
    if quarantine {
      log::warn!(
        "position {} quarantined after {} consecutive structural errors",
        id,
        position.consecutive_structural_errors
      );
      position.status = PositionStatus::PendingClose;
      position.pending_close_reason = Some(CloseReason::Manual);
      self.hedge_manager.stop(id, self.hedge_stop_timeout(&position)).await;
    }
    if let Err(e) = self.store.save(position).await {
      log::error!("failed to persist structural-error count for {}: {}", id, e);
    }
    quarantine
  }
}

enum Outcome {
  None,
  Closed,
  Reopened,
  Claimed,
  Quarantined,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::amm::PoolSnapshot;
  use crate::adapters::pool_config::StaticPoolConfigProvider;
  use crate::testutil::{FakeAmmAdapter, FakeRpcAdapter};
  use crate::types::PoolConfig;
  use crate::util::BoundedHistory;
  use async_trait::async_trait;

  struct FakeAggregator;

  #[async_trait]
  impl AggregatorClient for FakeAggregator {
    async fn quote(
      &self,
      input_mint: &str,
      output_mint: &str,
      amount: u128,
      slippage_bps: u16,
    ) -> Result<crate::adapters::Quote, EngineError> {
      Ok(crate::adapters::Quote {
        input_mint: input_mint.to_string(),
        output_mint: output_mint.to_string(),
        in_amount: amount.to_string(),
        out_amount: amount.to_string(),
        slippage_bps,
        other_amount_threshold: None,
        extra: serde_json::Value::Null,
      })
    }
    async fn swap_instructions(
      &self,
      _user_public_key: &str,
      _quote: &crate::adapters::Quote,
    ) -> Result<crate::adapters::aggregator::SwapTransaction, EngineError> {
      Ok(crate::adapters::aggregator::SwapTransaction {
        swap_transaction_base64: "tx".to_string(),
      })
    }
  }

  struct FakeDiscovery;

  #[async_trait]
  impl DiscoveryClient for FakeDiscovery {
    async fn all_pairs(&self) -> Result<Vec<crate::adapters::PoolSummary>, EngineError> {
      Ok(vec![])
    }
    async fn pair(&self, _address: &str) -> Result<crate::adapters::discovery::PoolDetail, EngineError> {
      unimplemented!()
    }
    async fn bins(&self, _address: &str) -> Result<Option<crate::adapters::discovery::BinDistribution>, EngineError> {
      Ok(None)
    }
  }

  const TEST_POSITION_ID: &str = "11111111111111111111111111111111";
  const TEST_OWNER: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

  fn sample_position(status: PositionStatus) -> Position {
    Position {
      position_id: TEST_POSITION_ID.into(),
      pool_address: "pool-1".to_string(),
      owner_address: TEST_OWNER.to_string(),
      mint_x: "So11111111111111111111111111111111111111112".to_string(),
      decimals_x: 9,
      mint_y: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
      decimals_y: 6,
      initial_amount_x: 1_000_000_000,
      initial_amount_y: 100_000_000,
      min_bin_id: -10,
      max_bin_id: 10,
      initial_price: 100.0,
      lower_bound_price: 96.0,
      upper_bound_price: 104.0,
      status,
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

  async fn harness(
    usd_price: f64,
  ) -> (
    Arc<PositionMonitor<FakeAmmAdapter, FakeRpcAdapter, FakeAggregator, FakeDiscovery>>,
    Arc<PositionStore>,
  ) {
    let amm = Arc::new(FakeAmmAdapter::new());
    amm.set_snapshot(
      "pool-1",
      PoolSnapshot {
        active_bin_id: 0,
        bin_step: 10,
        usd_price,
        active_bin_x: 1,
        active_bin_y: 1,
      },
    );
    let rpc = Arc::new(FakeRpcAdapter::new());
    let position_pubkey = Pubkey::from_str(TEST_POSITION_ID).unwrap();
    rpc.set_account_owner(position_pubkey, Pubkey::default());
    let owner_pubkey = Pubkey::from_str(TEST_OWNER).unwrap();
    let mint_x = Pubkey::from_str("So11111111111111111111111111111111111111112").unwrap();
    let mint_y = Pubkey::from_str("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v").unwrap();
    rpc.set_token_balance(
      spl_associated_token_account::get_associated_token_address(&owner_pubkey, &mint_x),
      10_000_000_000,
    );
    rpc.set_token_balance(
      spl_associated_token_account::get_associated_token_address(&owner_pubkey, &mint_y),
      1_000_000_000,
    );
    let aggregator = Arc::new(FakeAggregator);
    let discovery = Arc::new(FakeDiscovery);
    let price_monitor = Arc::new(PriceMonitor::new(amm.clone()));
    let operator = Arc::new(Keypair::new());
    let position_manager = Arc::new(PositionManager::new(amm.clone(), rpc.clone(), price_monitor.clone(), operator.clone()));
    let pool_selector = Arc::new(PoolSelector::new(amm.clone(), discovery));
    let hedge_manager = HedgeManager::new(amm.clone(), rpc.clone(), aggregator.clone(), price_monitor.clone(), {
      let dir = std::env::temp_dir().join(format!("lb-hedge-core-monitor-hedge-{}", uuid::Uuid::new_v4()));
      Arc::new(PositionStore::open(dir).await.unwrap())
    }, operator.clone());

    let dir = std::env::temp_dir().join(format!("lb-hedge-core-monitor-{}", uuid::Uuid::new_v4()));
    let store = Arc::new(PositionStore::open(dir).await.unwrap());

    let pool_configs = Arc::new(StaticPoolConfigProvider::new(HashMap::new()));
    pool_configs.set("pool-1", PoolConfig::default());

    let monitor = PositionMonitor::new(
      amm,
      rpc,
      aggregator,
      price_monitor,
      position_manager,
      pool_selector,
      hedge_manager,
      store.clone(),
      pool_configs,
      GlobalConfig::default(),
    );
    (monitor, store)
  }

  #[tokio::test]
  async fn tick_is_none_within_safe_range() {
    let (monitor, store) = harness(100.0).await;
    store.save(sample_position(PositionStatus::Active)).await.unwrap();
    let summary = monitor.tick().await;
    assert_eq!(summary.positions_seen, 1);
    assert_eq!(summary.closed, 0);
    let p = store.get_by_id(&TEST_POSITION_ID.into()).await.unwrap();
    assert_eq!(p.status, PositionStatus::Active);
  }

  #[tokio::test]
  async fn tick_closes_on_take_profit_breach() {
    let (monitor, store) = harness(110.0).await;
    store.save(sample_position(PositionStatus::Active)).await.unwrap();
    let _ = monitor.tick().await;
    let p = store.get_by_id(&TEST_POSITION_ID.into()).await.unwrap();
    assert_eq!(p.status, PositionStatus::Closed);
  }

  #[tokio::test]
  async fn concurrent_ticks_skip_locked_positions() {
    let (monitor, store) = harness(100.0).await;
    store.save(sample_position(PositionStatus::Active)).await.unwrap();
    let lock = monitor.lock_for(&TEST_POSITION_ID.into()).await;
    let _held = lock.lock().await;
    let summary = monitor.tick().await;
    assert_eq!(summary.skipped_locked, 1);
  }
}
