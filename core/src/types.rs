use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::util::BoundedHistory;

/// Pool-scoped position identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionId(pub String);

impl fmt::Display for PositionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<String> for PositionId {
  fn from(s: String) -> Self {
    Self(s)
  }
}

impl From<&str> for PositionId {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

/// Lifecycle state of a `Position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
  Active,
  /// A close is in flight and not yet confirmed, or the position was moved
  /// out of rotation after five consecutive structural errors and awaits
  /// manual review; both set `pending_close_reason` and stop the hedge loop.
  PendingClose,
  Closed,
  StopLoss,
  TakeProfit,
}

impl PositionStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, PositionStatus::Closed)
  }
}

/// One leg of the wallet-side mirror-swap history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeSwap {
  pub ts: DateTime<Utc>,
  pub direction: HedgeDirection,
  pub amount: f64,
  pub price: f64,
  pub signature: String,
  pub input_mint: String,
  pub output_mint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HedgeDirection {
  BuyX,
  SellX,
}

/// Reason a position close was initiated, persisted on `Position` while the
/// close is in flight (`status = pending_close`) so a second call with an
/// identical reason is recognized as the same in-flight close rather than a
/// fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
  TakeProfit,
  StopLoss,
  Rebalance,
  Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoClaim {
  pub enabled: bool,
  pub threshold_usd: f64,
}

/// Per-token smallest-unit quantity attributed to a bin, as reported by the
/// AMM adapter. Used for value estimation when available; the
/// fallback path uses `initial_amount_x/y` when it is not.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinData {
  pub amount_x: u128,
  pub amount_y: u128,
}

/// The central entity. Owned exclusively by `PositionStore`; every
/// mutation goes through `PositionStore::save`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
  pub position_id: PositionId,
  pub pool_address: String,
  pub owner_address: String,

  pub mint_x: String,
  pub decimals_x: u8,
  pub mint_y: String,
  pub decimals_y: u8,

  pub initial_amount_x: u128,
  pub initial_amount_y: u128,

  pub min_bin_id: i32,
  pub max_bin_id: i32,

  pub initial_price: f64,
  pub lower_bound_price: f64,
  pub upper_bound_price: f64,

  pub status: PositionStatus,
  pub opened_at: DateTime<Utc>,
  pub closed_at: Option<DateTime<Utc>>,
  pub last_price_check: Option<DateTime<Utc>>,
  pub current_price: Option<f64>,

  pub accumulated_fees_usd: f64,
  pub auto_claim: Option<AutoClaim>,
  pub last_claim_at: Option<DateTime<Utc>>,
  pub last_hedge_price: Option<f64>,
  pub hedge_history: BoundedHistory<HedgeSwap>,

  /// Consecutive structural errors observed for this position;
  /// reset to 0 on any successful tick action.
  #[serde(default)]
  pub consecutive_structural_errors: u32,

  /// Reason recorded when `status` last moved to `pending_close`; cleared
  /// once the close reaches `closed`. Lets `PositionManager::close` treat a
  /// duplicate call with an identical reason as a no-op.
  #[serde(default)]
  pub pending_close_reason: Option<CloseReason>,
}

impl Position {
  /// `range_interval = floor((max_bin_id - min_bin_id + 1) / 2)`.
  pub fn range_interval(&self) -> i32 {
    (self.max_bin_id - self.min_bin_id + 1) / 2
  }

  /// Invariant 1: the bin active at open lies within the range.
  pub fn contains_bin(&self, bin_id: i32) -> bool {
    self.min_bin_id <= bin_id && bin_id <= self.max_bin_id
  }

  /// Invariant 2.
  pub fn bounds_are_valid(&self) -> bool {
    self.lower_bound_price < self.initial_price && self.initial_price < self.upper_bound_price
  }

  pub fn is_active(&self) -> bool {
    self.status == PositionStatus::Active
  }
}

/// Outcome of the fee-vs-loss decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
  None,
  Close,
  OpenNewAbove,
  OpenNewBelow,
}

/// Explains why a `DecisionKind` was dispatched, so callers can log and
/// query the reason rather than reconstruct it from context each time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
  TakeProfitBreach,
  RebalanceDownFeesCover,
  RebalanceDownAcceptLoss,
  PreventiveCloseNearLowerWall,
  WaitFeesInsufficient,
  WithinSafeRange,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Decision {
  pub kind: DecisionKind,
  pub reason: DecisionReason,
}

impl Decision {
  pub fn none(reason: DecisionReason) -> Self {
    Self {
      kind: DecisionKind::None,
      reason,
    }
  }
}

/// Direction and amount of a mirror hedge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HedgeSizing {
  pub direction: HedgeDirection,
  /// Ratio of position value to move, signed by direction (already
  /// absolute-valued; `direction` carries the sign).
  pub hedge_ratio: f64,
  /// Input amount in the denomination implied by `direction`: Y units when
  /// buying X, X units when selling X.
  pub input_amount: f64,
}

/// Per-pool tunables, loaded from the admin/config store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorSwapConfig {
  pub enabled: bool,
  pub hedge_amount_percent: f64,
  pub slippage_bps: u16,
  #[serde(default = "default_hedge_interval_ms")]
  pub interval_ms: u64,
  #[serde(default = "default_min_hedge_bps")]
  pub min_hedge_bps: f64,
  #[serde(default = "default_min_hedge_step_percent")]
  pub min_hedge_step_percent: f64,
}

fn default_hedge_interval_ms() -> u64 {
  10_000
}
fn default_min_hedge_bps() -> f64 {
  5.0
}
fn default_min_hedge_step_percent() -> f64 {
  0.5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
  pub stop_loss_percent: f64,
  pub take_profit_percent: f64,
  pub fee_check_percent: f64,
  pub mirror_swap: MirrorSwapConfig,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      stop_loss_percent: -2.0,
      take_profit_percent: 0.0,
      fee_check_percent: 50.0,
      mirror_swap: MirrorSwapConfig {
        enabled: true,
        hedge_amount_percent: 50.0,
        slippage_bps: 50,
        interval_ms: default_hedge_interval_ms(),
        min_hedge_bps: default_min_hedge_bps(),
        min_hedge_step_percent: default_min_hedge_step_percent(),
      },
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
  pub check_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
  pub monitoring: MonitoringConfig,
  #[serde(default)]
  pub default_pool: PoolConfig,
}

impl Default for GlobalConfig {
  fn default() -> Self {
    Self {
      monitoring: MonitoringConfig {
        check_interval_ms: 15_000,
      },
      default_pool: PoolConfig::default(),
    }
  }
}

/// `PoolConfig` merged with `GlobalConfig` defaults, the value
/// `StrategyCalculator::decide` actually consumes.
#[derive(Debug, Clone)]
pub struct MergedConfig {
  pub check_interval_ms: u64,
  pub pool: PoolConfig,
}

impl GlobalConfig {
  pub fn merge(&self, pool: Option<&PoolConfig>) -> MergedConfig {
    MergedConfig {
      check_interval_ms: self.monitoring.check_interval_ms,
      pool: pool.cloned().unwrap_or_else(|| self.default_pool.clone()),
    }
  }
}
