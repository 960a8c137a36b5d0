use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};

use crate::adapters::amm::{ClosePositionArgs, OpenPositionArgs};
use crate::adapters::{AmmAdapter, RpcAdapter};
use crate::error::{EngineError, StructuralError};
use crate::price_monitor::PriceMonitor;
use crate::strategy::StrategyCalculator;
use crate::types::{BinData, Decision, Position, PositionId, PositionStatus};
use crate::util::retry::retry_linear;

pub use crate::types::CloseReason;

const MAX_OPEN_ATTEMPTS: usize = 3;
const OPEN_RETRY_DELAY: Duration = Duration::from_secs(2);
const MAX_CLOSE_ATTEMPTS: usize = 3;

const DEFAULT_RANGE_INTERVAL: i32 = 10;
const MIN_RANGE_INTERVAL: i32 = 1;
const MAX_RANGE_INTERVAL: i32 = 100;

/// Authoritative lifecycle actions: open, close, claim.
pub struct PositionManager<A: AmmAdapter, R: RpcAdapter> {
  amm: Arc<A>,
  rpc: Arc<R>,
  price_monitor: Arc<PriceMonitor<A>>,
  operator: Arc<Keypair>,
}

impl<A: AmmAdapter, R: RpcAdapter> PositionManager<A, R> {
  pub fn new(amm: Arc<A>, rpc: Arc<R>, price_monitor: Arc<PriceMonitor<A>>, operator: Arc<Keypair>) -> Self {
    Self {
      amm,
      rpc,
      price_monitor,
      operator,
    }
  }

  fn coerce_range_interval(range_interval: i32) -> i32 {
    if (MIN_RANGE_INTERVAL..=MAX_RANGE_INTERVAL).contains(&range_interval) {
      range_interval
    } else {
      log::warn!(
        "range_interval {} out of [{}, {}], snapping to default {}",
        range_interval,
        MIN_RANGE_INTERVAL,
        MAX_RANGE_INTERVAL,
        DEFAULT_RANGE_INTERVAL
      );
      DEFAULT_RANGE_INTERVAL
    }
  }

  /// `open`.
  pub async fn open(
    &self,
    pool_address: &str,
    owner_address: &str,
    amount_x: u128,
    amount_y: u128,
    range_interval: i32,
    auto_claim: Option<crate::types::AutoClaim>,
  ) -> Result<Position, EngineError> {
    let range_interval = Self::coerce_range_interval(range_interval);

    let snapshot = self.amm.pool_snapshot(pool_address).await?;
    let min_bin_id = snapshot.active_bin_id - range_interval;
    let max_bin_id = snapshot.active_bin_id + range_interval;

    let (lower_bound_price, upper_bound_price) = self
      .price_monitor
      .bin_range_bounds(pool_address, snapshot.bin_step, min_bin_id, max_bin_id)
      .await;
    let initial_price = self.price_monitor.get_pool_price(pool_address).await?;

    // Generated once, outside the retry loop, so the position's address is
    // stable across retries.
    let position_key = Arc::new(Keypair::new());
    let (mint_x, mint_y) = self.amm.token_mints(pool_address).await?;

    let txs = self
      .amm
      .build_open_position_and_deposit(OpenPositionArgs {
        pool_address,
        owner: owner_address,
        amount_x,
        amount_y,
        min_bin_id,
        max_bin_id,
        position_key: position_key.clone(),
      })
      .await?;

    let mut last_sig = Signature::default();
    for tx in &txs {
      last_sig = retry_linear(MAX_OPEN_ATTEMPTS, OPEN_RETRY_DELAY, |attempt| async move {
        log::info!("[open] attempt {} sending {}", attempt + 1, tx.label);
        let sig = self.rpc.send(&self.operator, tx).await?;
        if self.rpc.confirm(&sig).await? {
          Ok(sig)
        } else {
          Err(EngineError::Transient(crate::error::TransientError::SendFailure(
            "open transaction did not confirm".to_string(),
          )))
        }
      })
      .await?;
    }

    let position = Position {
      position_id: PositionId(position_key.pubkey().to_string()),
      pool_address: pool_address.to_string(),
      owner_address: owner_address.to_string(),
      mint_x: mint_x.mint,
      decimals_x: mint_x.decimals,
      mint_y: mint_y.mint,
      decimals_y: mint_y.decimals,
      initial_amount_x: amount_x,
      initial_amount_y: amount_y,
      min_bin_id,
      max_bin_id,
      initial_price,
      lower_bound_price,
      upper_bound_price,
      status: PositionStatus::Active,
      opened_at: Utc::now(),
      closed_at: None,
      last_price_check: Some(Utc::now()),
      current_price: Some(initial_price),
      accumulated_fees_usd: 0.0,
      auto_claim,
      last_claim_at: None,
      last_hedge_price: None,
      hedge_history: crate::util::BoundedHistory::new(200),
      consecutive_structural_errors: 0,
      pending_close_reason: None,
    };

    log::info!(
      "opened position {} in pool {} bins [{}, {}] bounds [{:.4}, {:.4}] via {}",
      position.position_id,
      pool_address,
      min_bin_id,
      max_bin_id,
      lower_bound_price,
      upper_bound_price,
      last_sig
    );

    Ok(position)
  }

  /// `close`. Returns the closing signature, or `None` when the
  /// close is a no-op: already closed, reconciled away because the on-chain
  /// account vanished or changed owner, or a duplicate call for a close
  /// that is already `pending_close` under the identical `reason`.
  pub async fn close(
    &self,
    position: &Position,
    reason: CloseReason,
  ) -> Result<Option<Signature>, EngineError> {
    if position.status == PositionStatus::Closed {
      return Ok(None);
    }
    if position.status == PositionStatus::PendingClose && position.pending_close_reason == Some(reason) {
      log::info!(
        "position {} already has a pending close for reason {:?}; treating duplicate call as a no-op",
        position.position_id,
        reason
      );
      return Ok(None);
    }

    let position_pubkey = Pubkey::from_str(&position.position_id.0)
      .map_err(|_| EngineError::Structural(StructuralError::PositionNotFound(position.position_id.to_string())))?;

    let account = self.rpc.get_account_info(&position_pubkey).await?;
    match account {
      None => {
        log::info!("position {} has no on-chain account, treating close as already done", position.position_id);
        return Ok(None);
      }
      Some(account) if account.owner != self.amm.program_id() => {
        log::info!(
          "position {} is owned by {}, not the AMM program; treating close as already done",
          position.position_id,
          account.owner
        );
        return Ok(None);
      }
      Some(_) => {}
    }

    let has_liquidity = self.amm.has_liquidity(&position.position_id.0).await?;

    let args = ClosePositionArgs {
      pool_address: &position.pool_address,
      position_id: &position.position_id.0,
      owner: &position.owner_address,
      min_used_bin: position.min_bin_id,
      max_used_bin: position.max_bin_id,
    };

    let txs = if has_liquidity {
      self.amm.build_remove_liquidity_and_close(args).await?
    } else {
      match self.amm.build_close_position(args).await {
        Ok(tx) => vec![tx],
        Err(EngineError::Structural(StructuralError::PositionNotEmpty(_))) => {
          log::info!("direct close rejected as non-empty, refreshing bin data and retrying via remove-all");
          self.amm.build_remove_liquidity_and_close(args).await?
        }
        Err(e) => return Err(e),
      }
    };

    let mut last_sig = None;
    for tx in &txs {
      let sig = retry_linear(MAX_CLOSE_ATTEMPTS, OPEN_RETRY_DELAY, |attempt| async move {
        log::info!("[close] attempt {} sending {}", attempt + 1, tx.label);
        match self.rpc.send(&self.operator, tx).await {
          Ok(sig) => {
            if self.rpc.confirm(&sig).await? {
              Ok(sig)
            } else {
              Err(EngineError::Transient(crate::error::TransientError::SendFailure(
                "close transaction did not confirm".to_string(),
              )))
            }
          }
          Err(e) if e.is_close_as_success() => {
            log::info!("close treated as success: {}", e);
            Ok(Signature::default())
          }
          Err(e) => Err(e),
        }
      })
      .await?;
      last_sig = Some(sig);
    }

    Ok(last_sig)
  }

  /// `claim`.
  pub async fn claim(&self, position: &Position) -> Result<Signature, EngineError> {
    let tx = self.amm.build_claim_swap_fees(&position.position_id.0).await?;
    let sig = retry_linear(MAX_CLOSE_ATTEMPTS, OPEN_RETRY_DELAY, |attempt| async move {
      log::info!("[claim] attempt {} for position {}", attempt + 1, position.position_id);
      let sig = self.rpc.send(&self.operator, &tx).await?;
      if self.rpc.confirm(&sig).await? {
        Ok(sig)
      } else {
        Err(EngineError::Transient(crate::error::TransientError::SendFailure(
          "claim transaction did not confirm".to_string(),
        )))
      }
    })
    .await?;
    Ok(sig)
  }

  /// `decide`: pure, no side effects.
  #[allow(clippy::too_many_arguments)]
  pub fn decide(
    position: &Position,
    price: f64,
    position_percent: f64,
    fee_check_percent: f64,
    stop_loss_percent: f64,
    accumulated_fees_usd: f64,
    bin_data: Option<&[BinData]>,
  ) -> Decision {
    StrategyCalculator::decide(
      position,
      price,
      position_percent,
      fee_check_percent,
      stop_loss_percent,
      accumulated_fees_usd,
      bin_data,
    )
  }
}
