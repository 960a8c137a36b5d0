use crate::types::{
  BinData, Decision, DecisionKind, DecisionReason, HedgeDirection, HedgeSizing, Position,
};

const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
const STABLE_MINTS: [&str; 2] = [
  "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", // USDC
  "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", // USDT
];

/// Per-mint USD pricing rule: SOL tracks the pool price, known
/// stablecoins are pegged to 1.0, anything else is treated as quote-priced
/// (tracks the pool price too, see DESIGN.md for the reasoning).
fn mint_usd_price(mint: &str, pool_price_usd: f64) -> f64 {
  if mint == SOL_MINT {
    pool_price_usd
  } else if STABLE_MINTS.contains(&mint) {
    1.0
  } else {
    pool_price_usd
  }
}

fn to_human(amount: u128, decimals: u8) -> f64 {
  amount as f64 / 10f64.powi(decimals as i32)
}

/// Fee-vs-impermanent-loss arithmetic and hedge sizing.
pub struct StrategyCalculator;

impl StrategyCalculator {
  /// Estimates position USD value at an arbitrary price. Uses `bin_data`
  /// when present and non-empty; otherwise falls back to the position's
  /// initial deposit amounts, which is known to overstate value once a
  /// hedge has shifted the wallet's side composition (accepted tradeoff,
  /// see DESIGN.md).
  pub fn value_at(position: &Position, price: f64, bin_data: Option<&[BinData]>) -> f64 {
    let px_x = mint_usd_price(&position.mint_x, price);
    let px_y = mint_usd_price(&position.mint_y, price);

    let (amount_x, amount_y) = match bin_data {
      Some(bins) if !bins.is_empty() => {
        let x: u128 = bins.iter().map(|b| b.amount_x).sum();
        let y: u128 = bins.iter().map(|b| b.amount_y).sum();
        (x, y)
      }
      _ => (position.initial_amount_x, position.initial_amount_y),
    };

    to_human(amount_x, position.decimals_x) * px_x + to_human(amount_y, position.decimals_y) * px_y
  }

  /// Claimable-fees USD value. Never negative or stale: callers pass `None`
  /// on a read failure and this returns `0.0`.
  pub fn claimable_fees_usd(
    position: &Position,
    price: f64,
    fees: Option<(u128, u128)>,
  ) -> f64 {
    let Some((fee_x, fee_y)) = fees else {
      return 0.0;
    };
    let px_x = mint_usd_price(&position.mint_x, price);
    let px_y = mint_usd_price(&position.mint_y, price);
    let usd = to_human(fee_x, position.decimals_x) * px_x + to_human(fee_y, position.decimals_y) * px_y;
    log::debug!(
      "position {} claimable_fees_usd={}",
      position.position_id,
      crate::trunc!(usd, 2)
    );
    usd
  }

  /// Fee-vs-loss decision: computes `sl_price`, `estimated_loss_usd`, and
  /// `net_result_usd`, returning whether accumulated fees cover the loss.
  pub fn should_close_for_stop_loss(
    position: &Position,
    price: f64,
    stop_loss_percent: f64,
    accumulated_fees_usd: f64,
    bin_data: Option<&[BinData]>,
  ) -> bool {
    let sl_price = position.lower_bound_price * (1.0 + stop_loss_percent / 100.0);
    let estimated_loss =
      (Self::value_at(position, price, bin_data) - Self::value_at(position, sl_price, bin_data)).max(0.0);
    if estimated_loss <= 0.0 {
      return false;
    }
    let net_result = accumulated_fees_usd - estimated_loss;
    log::debug!(
      "position {} estimated_loss_usd={} net_result_usd={}",
      position.position_id,
      crate::trunc!(estimated_loss, 2),
      crate::trunc!(net_result, 2)
    );
    net_result >= 0.0
  }

  /// Fee-vs-impermanent-loss decision table: breach above takes profit,
  /// breach below rebalances (with or without fee coverage), and the
  /// fee-check band inside the range closes preventively when fees cover
  /// the loss.
  pub fn decide(
    position: &Position,
    price: f64,
    position_percent: f64,
    fee_check_percent: f64,
    stop_loss_percent: f64,
    accumulated_fees_usd: f64,
    bin_data: Option<&[BinData]>,
  ) -> Decision {
    if price > position.upper_bound_price {
      return Decision {
        kind: DecisionKind::OpenNewAbove,
        reason: DecisionReason::TakeProfitBreach,
      };
    }

    if price < position.lower_bound_price {
      let covers = Self::should_close_for_stop_loss(
        position,
        price,
        stop_loss_percent,
        accumulated_fees_usd,
        bin_data,
      );
      return Decision {
        kind: DecisionKind::OpenNewBelow,
        reason: if covers {
          DecisionReason::RebalanceDownFeesCover
        } else {
          DecisionReason::RebalanceDownAcceptLoss
        },
      };
    }

    let at_fee_check = position_percent <= fee_check_percent && price >= position.lower_bound_price;
    if at_fee_check {
      let covers = Self::should_close_for_stop_loss(
        position,
        price,
        stop_loss_percent,
        accumulated_fees_usd,
        bin_data,
      );
      return if covers {
        Decision {
          kind: DecisionKind::Close,
          reason: DecisionReason::PreventiveCloseNearLowerWall,
        }
      } else {
        Decision::none(DecisionReason::WaitFeesInsufficient)
      };
    }

    Decision::none(DecisionReason::WithinSafeRange)
  }

  /// Percent distance of `current_price` from the base price a hedge step
  /// is measured against (`last_hedge_price`, or `initial_price` before the
  /// first hedge). Used by `HedgeManager` to gate oscillation, separately
  /// from `hedge_ratio` which also folds in `hedge_amount_percent`.
  pub fn price_step_percent(position: &Position, current_price: f64) -> f64 {
    let base_price = position.last_hedge_price.unwrap_or(position.initial_price);
    ((base_price - current_price) / base_price * 100.0).abs()
  }

  /// Mirror-hedge sizing. `position_value_usd` should already
  /// reflect `value_at(current_price, ...)`.
  pub fn hedge_sizing(
    position: &Position,
    current_price: f64,
    hedge_percent: f64,
    position_value_usd: f64,
  ) -> HedgeSizing {
    let base_price = position.last_hedge_price.unwrap_or(position.initial_price);
    let delta = (base_price - current_price) / base_price;
    let hedge_ratio = (hedge_percent / 100.0) * delta;

    if delta > 0.0 {
      HedgeSizing {
        direction: HedgeDirection::BuyX,
        hedge_ratio: hedge_ratio.abs(),
        input_amount: hedge_ratio.abs() * position_value_usd,
      }
    } else {
      HedgeSizing {
        direction: HedgeDirection::SellX,
        hedge_ratio: hedge_ratio.abs(),
        input_amount: hedge_ratio.abs() * position_value_usd / current_price,
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::*;

  fn position() -> Position {
    Position {
      position_id: "pos-1".into(),
      pool_address: "pool".to_string(),
      owner_address: "owner".to_string(),
      mint_x: SOL_MINT.to_string(),
      decimals_x: 9,
      mint_y: STABLE_MINTS[0].to_string(),
      decimals_y: 6,
      initial_amount_x: 1_000_000_000,
      initial_amount_y: 100_000_000,
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

  /// Scenario 1: take-profit breach regardless of fees.
  #[test]
  fn take_profit_breach_always_opens_above() {
    let pos = position();
    let d = StrategyCalculator::decide(&pos, 104.50, 130.0, 50.0, -2.0, 0.0, None);
    assert_eq!(d.kind, DecisionKind::OpenNewAbove);
  }

  /// Scenario 2: stop-loss with fees covering loss.
  #[test]
  fn stop_loss_with_fees_covering_opens_below() {
    let mut pos = position();
    pos.lower_bound_price = 96.0;
    // value_at(95.5) and value_at(94.08) derived from the 1 SOL / 100 USDC
    // deposit used across this test module, not literally $190/$186.30;
    // the decision path is what's under test, not the exact USD figures.
    let d = StrategyCalculator::decide(&pos, 95.5, 10.0, 50.0, -2.0, 4.50, None);
    assert_eq!(d.kind, DecisionKind::OpenNewBelow);
  }

  /// Scenario 3: fee-check level without coverage stays put.
  #[test]
  fn fee_check_without_coverage_is_none() {
    let pos = position();
    let d = StrategyCalculator::decide(&pos, 99.80, 47.5, 50.0, -2.0, 0.20, None);
    assert_eq!(d.kind, DecisionKind::None);
  }

  #[test]
  fn zero_estimated_loss_never_triggers_close_alone() {
    let pos = position();
    // price == lower_bound_price means value_at(price) == value_at(sl_price)
    // is not guaranteed zero in general, but with sl_price > price here
    // (stop_loss_percent positive is invalid input) loss floors at 0.
    let covers = StrategyCalculator::should_close_for_stop_loss(&pos, 96.0, 0.0, 0.0, None);
    assert!(!covers);
  }

  /// Monotonicity: more fees cannot turn `close` into `none`.
  #[test]
  fn more_fees_never_turns_close_into_none() {
    let pos = position();
    let low_fees = StrategyCalculator::decide(&pos, 99.80, 47.5, 50.0, -2.0, 0.20, None);
    let high_fees = StrategyCalculator::decide(&pos, 99.80, 47.5, 50.0, -2.0, 50.0, None);
    if low_fees.kind == DecisionKind::Close {
      assert_eq!(high_fees.kind, DecisionKind::Close);
    }
  }

  /// Scenario 6: hedge after a price drop.
  #[test]
  fn hedge_after_price_drop_buys_x() {
    let pos = position();
    let sizing = StrategyCalculator::hedge_sizing(&pos, 95.0, 50.0, 200.0);
    assert_eq!(sizing.direction, HedgeDirection::BuyX);
    assert!((sizing.hedge_ratio - 0.025).abs() < 1e-9);
    assert!((sizing.input_amount - 5.0).abs() < 1e-9);
  }

  #[test]
  fn price_step_percent_measures_from_last_hedge_not_open() {
    let mut pos = position();
    pos.initial_price = 100.0;
    pos.last_hedge_price = Some(98.0);
    let step = StrategyCalculator::price_step_percent(&pos, 97.0);
    assert!((step - (1.0 / 98.0 * 100.0)).abs() < 1e-9);
  }

  #[test]
  fn hedge_after_price_rise_sells_x() {
    let mut pos = position();
    pos.last_hedge_price = Some(100.0);
    let sizing = StrategyCalculator::hedge_sizing(&pos, 110.0, 50.0, 200.0);
    assert_eq!(sizing.direction, HedgeDirection::SellX);
  }
}
