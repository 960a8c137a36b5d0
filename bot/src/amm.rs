//! Concrete `AmmAdapter` for the bin-AMM program this deployment targets.
//!
//! `lb-hedge-core` deliberately never vendors a third-party DLMM program's
//! IDL (see its adapter traits); this module is the integration seam a real
//! deployment fills in. It defines its own minimal Borsh account/instruction
//! layout rather than decoding a specific external program, so swapping in
//! the real on-chain program for a given deployment means replacing this
//! file, not touching `core`.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use borsh::{BorshDeserialize, BorshSerialize};
use lb_hedge_core::adapters::{AmmAdapter, ClosePositionArgs, MintInfo, OpenPositionArgs, PoolSnapshot, RpcAdapter, UnsignedTx};
use lb_hedge_core::{BinData, EngineError, StructuralError};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::Signer;

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy)]
struct PoolAccount {
  bin_step: u16,
  active_bin_id: i32,
  token_x_mint: Pubkey,
  token_y_mint: Pubkey,
  decimals_x: u8,
  decimals_y: u8,
  reserve_x_amount: u64,
  reserve_y_amount: u64,
  /// Pool-reported USD price of token X, fixed-point with 6 decimals.
  usd_price_x_1e6: u64,
}

#[derive(BorshSerialize, BorshDeserialize, Clone, Copy)]
struct PositionAccount {
  pool: Pubkey,
  owner: Pubkey,
  min_bin_id: i32,
  max_bin_id: i32,
  fee_x_owed: u64,
  fee_y_owed: u64,
  liquidity_shares: u128,
}

#[derive(BorshSerialize, BorshDeserialize)]
enum AmmInstruction {
  OpenPositionAndDeposit {
    amount_x: u64,
    amount_y: u64,
    min_bin_id: i32,
    max_bin_id: i32,
  },
  RemoveLiquidityAndClose {
    min_bin_id: i32,
    max_bin_id: i32,
  },
  ClosePosition,
  ClaimSwapFees,
}

/// Reads pool/position state through `RpcAdapter` and builds instructions
/// addressed to `program_id`. Transaction-level signing/sending stays with
/// `RpcAdapter::send`, matching every other `AmmAdapter` consumer.
pub struct SolanaBinAmmAdapter<R: RpcAdapter> {
  rpc: Arc<R>,
  program_id: Pubkey,
}

impl<R: RpcAdapter> SolanaBinAmmAdapter<R> {
  pub fn new(rpc: Arc<R>, program_id: Pubkey) -> Self {
    Self { rpc, program_id }
  }

  fn parse_pubkey(s: &str) -> Result<Pubkey, EngineError> {
    Pubkey::from_str(s).map_err(|_| EngineError::Structural(StructuralError::PoolNotFound))
  }

  async fn pool_account(&self, pool_address: &str) -> Result<PoolAccount, EngineError> {
    let pubkey = Self::parse_pubkey(pool_address)?;
    let account = self
      .rpc
      .get_account_info(&pubkey)
      .await?
      .ok_or(EngineError::Structural(StructuralError::PoolNotFound))?;
    PoolAccount::try_from_slice(&account.data).map_err(|_| EngineError::Structural(StructuralError::PoolNotFound))
  }

  async fn position_account(&self, position_id: &str) -> Result<PositionAccount, EngineError> {
    let pubkey = Pubkey::from_str(position_id)
      .map_err(|_| EngineError::Structural(StructuralError::PositionNotFound(position_id.to_string())))?;
    let account = self.rpc.get_account_info(&pubkey).await?.ok_or_else(|| {
      EngineError::Structural(StructuralError::PositionNotFound(position_id.to_string()))
    })?;
    if account.owner != self.program_id {
      return Err(EngineError::Structural(StructuralError::WrongProgramOwner(
        position_id.to_string(),
      )));
    }
    PositionAccount::try_from_slice(&account.data)
      .map_err(|_| EngineError::Structural(StructuralError::PositionNotFound(position_id.to_string())))
  }
}

#[async_trait]
impl<R: RpcAdapter + 'static> AmmAdapter for SolanaBinAmmAdapter<R> {
  fn program_id(&self) -> Pubkey {
    self.program_id
  }

  async fn pool_snapshot(&self, pool_address: &str) -> Result<PoolSnapshot, EngineError> {
    let pool = self.pool_account(pool_address).await?;
    Ok(PoolSnapshot {
      active_bin_id: pool.active_bin_id,
      bin_step: pool.bin_step as u32,
      usd_price: pool.usd_price_x_1e6 as f64 / 1_000_000.0,
      active_bin_x: pool.reserve_x_amount as u128,
      active_bin_y: pool.reserve_y_amount as u128,
    })
  }

  async fn token_mints(&self, pool_address: &str) -> Result<(MintInfo, MintInfo), EngineError> {
    let pool = self.pool_account(pool_address).await?;
    Ok((
      MintInfo {
        mint: pool.token_x_mint.to_string(),
        decimals: pool.decimals_x,
      },
      MintInfo {
        mint: pool.token_y_mint.to_string(),
        decimals: pool.decimals_y,
      },
    ))
  }

  async fn claimable_fees(&self, position_id: &str) -> Result<(u128, u128), EngineError> {
    match self.position_account(position_id).await {
      Ok(position) => Ok((position.fee_x_owed as u128, position.fee_y_owed as u128)),
      Err(e) if e.is_structural() => {
        log::debug!("claimable_fees: treating {} as zero after {}", position_id, e);
        Ok((0, 0))
      }
      Err(e) => Err(e),
    }
  }

  async fn bin_liquidity(&self, _position_id: &str) -> Result<Vec<BinData>, EngineError> {
    // This program's minimal account layout doesn't expose a per-bin
    // breakdown; callers already treat this as best-effort.
    Ok(vec![])
  }

  async fn has_liquidity(&self, position_id: &str) -> Result<bool, EngineError> {
    match self.position_account(position_id).await {
      Ok(position) => Ok(position.liquidity_shares > 0),
      Err(e) if e.is_structural() => Ok(false),
      Err(e) => Err(e),
    }
  }

  async fn build_open_position_and_deposit(
    &self,
    args: OpenPositionArgs<'_>,
  ) -> Result<Vec<UnsignedTx>, EngineError> {
    let pool = Self::parse_pubkey(args.pool_address)?;
    let owner = Self::parse_pubkey(args.owner)?;
    let data = AmmInstruction::OpenPositionAndDeposit {
      amount_x: args.amount_x as u64,
      amount_y: args.amount_y as u64,
      min_bin_id: args.min_bin_id,
      max_bin_id: args.max_bin_id,
    }
    .try_to_vec()
    .map_err(|_| EngineError::Structural(StructuralError::InvalidRangeInterval(0)))?;
    let accounts = vec![
      AccountMeta::new(args.position_key.pubkey(), true),
      AccountMeta::new(pool, false),
      AccountMeta::new(owner, true),
      AccountMeta::new_readonly(solana_sdk::system_program::id(), false),
    ];
    let instruction = Instruction::new_with_bytes(self.program_id, &data, accounts);
    Ok(vec![
      UnsignedTx::new("open_position_and_deposit", vec![instruction]).with_signer(args.position_key.clone()),
    ])
  }

  async fn build_remove_liquidity_and_close(
    &self,
    args: ClosePositionArgs<'_>,
  ) -> Result<Vec<UnsignedTx>, EngineError> {
    let pool = Self::parse_pubkey(args.pool_address)?;
    let position = Self::parse_pubkey(args.position_id)?;
    let owner = Self::parse_pubkey(args.owner)?;
    let data = AmmInstruction::RemoveLiquidityAndClose {
      min_bin_id: args.min_used_bin,
      max_bin_id: args.max_used_bin,
    }
    .try_to_vec()
    .map_err(|_| EngineError::Structural(StructuralError::PositionNotFound(args.position_id.to_string())))?;
    let accounts = vec![
      AccountMeta::new(position, false),
      AccountMeta::new(pool, false),
      AccountMeta::new(owner, true),
    ];
    let instruction = Instruction::new_with_bytes(self.program_id, &data, accounts);
    Ok(vec![UnsignedTx::new("remove_liquidity_and_close", vec![instruction])])
  }

  async fn build_close_position(&self, args: ClosePositionArgs<'_>) -> Result<UnsignedTx, EngineError> {
    let pool = Self::parse_pubkey(args.pool_address)?;
    let position = Self::parse_pubkey(args.position_id)?;
    let owner = Self::parse_pubkey(args.owner)?;
    let data = AmmInstruction::ClosePosition
      .try_to_vec()
      .map_err(|_| EngineError::Structural(StructuralError::PositionNotFound(args.position_id.to_string())))?;
    let accounts = vec![
      AccountMeta::new(position, false),
      AccountMeta::new(pool, false),
      AccountMeta::new(owner, true),
    ];
    Ok(UnsignedTx::new(
      "close_position",
      vec![Instruction::new_with_bytes(self.program_id, &data, accounts)],
    ))
  }

  async fn build_claim_swap_fees(&self, position_id: &str) -> Result<UnsignedTx, EngineError> {
    let position_account = self.position_account(position_id).await?;
    let position = Self::parse_pubkey(position_id)?;
    let data = AmmInstruction::ClaimSwapFees
      .try_to_vec()
      .map_err(|_| EngineError::Structural(StructuralError::PositionNotFound(position_id.to_string())))?;
    let accounts = vec![
      AccountMeta::new(position, false),
      AccountMeta::new(position_account.pool, false),
      AccountMeta::new(position_account.owner, true),
    ];
    Ok(UnsignedTx::new(
      "claim_swap_fees",
      vec![Instruction::new_with_bytes(self.program_id, &data, accounts)],
    ))
  }
}
