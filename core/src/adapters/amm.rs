use std::sync::Arc;

use async_trait::async_trait;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;

use crate::error::EngineError;
use crate::types::BinData;

/// A snapshot of a pool's on-chain state, everything `PriceMonitor` needs in
/// one round-trip: the active bin, the bin step, and the pool's own reported
/// USD price.
#[derive(Debug, Clone, Copy)]
pub struct PoolSnapshot {
  pub active_bin_id: i32,
  pub bin_step: u32,
  /// Pool-reported current price, USD per unit of X.
  pub usd_price: f64,
  pub active_bin_x: u128,
  pub active_bin_y: u128,
}

#[derive(Debug, Clone)]
pub struct MintInfo {
  pub mint: String,
  pub decimals: u8,
}

/// An unsigned transaction message: a batch of instructions plus any
/// additional signers the AMM adapter generated (e.g. a fresh position
/// keypair). `RpcAdapter` completes it with a recent blockhash and fee payer
/// before signing and sending ("Transactions carry a message to
/// be completed with a fresh recent-blockhash and fee payer before signing").
pub struct UnsignedTx {
  pub instructions: Vec<Instruction>,
  pub additional_signers: Vec<Arc<Keypair>>,
  pub label: &'static str,
}

impl UnsignedTx {
  pub fn new(label: &'static str, instructions: Vec<Instruction>) -> Self {
    Self {
      instructions,
      additional_signers: vec![],
      label,
    }
  }

  pub fn with_signer(mut self, signer: Arc<Keypair>) -> Self {
    self.additional_signers.push(signer);
    self
  }
}

pub struct OpenPositionArgs<'a> {
  pub pool_address: &'a str,
  pub owner: &'a str,
  pub amount_x: u128,
  pub amount_y: u128,
  pub min_bin_id: i32,
  pub max_bin_id: i32,
  /// Position keypair generated once outside the retry loop so
  /// its address is stable across retries.
  pub position_key: Arc<Keypair>,
}

pub struct ClosePositionArgs<'a> {
  pub pool_address: &'a str,
  pub position_id: &'a str,
  pub owner: &'a str,
  pub min_used_bin: i32,
  pub max_used_bin: i32,
}

/// Narrow interface onto the liquidity-book AMM SDK. The core never
/// constructs bin-AMM instructions directly or implements the AMM's pricing
/// math; it only consumes this trait.
#[async_trait]
pub trait AmmAdapter: Send + Sync {
  /// The AMM program's on-chain address, used to validate account ownership
  /// during close pre-flight.
  fn program_id(&self) -> Pubkey;

  async fn pool_snapshot(&self, pool_address: &str) -> Result<PoolSnapshot, EngineError>;

  async fn token_mints(&self, pool_address: &str) -> Result<(MintInfo, MintInfo), EngineError>;

  /// Claimable fee amounts in smallest units, `(x, y)`. A failure to read
  /// fees is treated as `0`, never a stale/negative number, by the caller
  /// (`StrategyCalculator`); this trait just surfaces the raw error.
  async fn claimable_fees(&self, position_id: &str) -> Result<(u128, u128), EngineError>;

  /// Per-bin token quantities for a position, fetched best-effort: callers
  /// fall back to a coarser valuation when this is unavailable.
  async fn bin_liquidity(&self, position_id: &str) -> Result<Vec<BinData>, EngineError>;

  /// Whether the given position id still has any liquidity deposited.
  async fn has_liquidity(&self, position_id: &str) -> Result<bool, EngineError>;

  async fn build_open_position_and_deposit(
    &self,
    args: OpenPositionArgs<'_>,
  ) -> Result<Vec<UnsignedTx>, EngineError>;

  async fn build_remove_liquidity_and_close(
    &self,
    args: ClosePositionArgs<'_>,
  ) -> Result<Vec<UnsignedTx>, EngineError>;

  async fn build_close_position(
    &self,
    args: ClosePositionArgs<'_>,
  ) -> Result<UnsignedTx, EngineError>;

  async fn build_claim_swap_fees(&self, position_id: &str) -> Result<UnsignedTx, EngineError>;
}
