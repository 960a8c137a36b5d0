//! Fakes used by unit/integration tests. Never compiled into release builds.
#![cfg(test)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};

use crate::adapters::amm::{ClosePositionArgs, MintInfo, OpenPositionArgs, PoolSnapshot, UnsignedTx};
use crate::adapters::rpc::RpcAdapter;
use crate::adapters::AmmAdapter;
use crate::error::EngineError;
use crate::types::BinData;

pub struct FakeAmmAdapter {
  pub snapshots: Mutex<HashMap<String, PoolSnapshot>>,
  pub fees: Mutex<HashMap<String, (u128, u128)>>,
  pub has_liquidity: Mutex<HashMap<String, bool>>,
}

impl FakeAmmAdapter {
  pub fn new() -> Self {
    Self {
      snapshots: Mutex::new(HashMap::new()),
      fees: Mutex::new(HashMap::new()),
      has_liquidity: Mutex::new(HashMap::new()),
    }
  }

  pub fn set_snapshot(&self, pool: &str, snapshot: PoolSnapshot) {
    self.snapshots.lock().unwrap().insert(pool.to_string(), snapshot);
  }

  pub fn set_fees(&self, position_id: &str, x: u128, y: u128) {
    self.fees.lock().unwrap().insert(position_id.to_string(), (x, y));
  }
}

#[async_trait]
impl AmmAdapter for FakeAmmAdapter {
  fn program_id(&self) -> Pubkey {
    Pubkey::default()
  }

  async fn pool_snapshot(&self, pool_address: &str) -> Result<PoolSnapshot, EngineError> {
    Ok(
      *self
        .snapshots
        .lock()
        .unwrap()
        .get(pool_address)
        .expect("snapshot must be seeded in test"),
    )
  }

  async fn token_mints(&self, _pool_address: &str) -> Result<(MintInfo, MintInfo), EngineError> {
    Ok((
      MintInfo {
        mint: "X".to_string(),
        decimals: 9,
      },
      MintInfo {
        mint: "Y".to_string(),
        decimals: 6,
      },
    ))
  }

  async fn claimable_fees(&self, position_id: &str) -> Result<(u128, u128), EngineError> {
    Ok(
      self
        .fees
        .lock()
        .unwrap()
        .get(position_id)
        .copied()
        .unwrap_or((0, 0)),
    )
  }

  async fn bin_liquidity(&self, _position_id: &str) -> Result<Vec<BinData>, EngineError> {
    Ok(vec![])
  }

  async fn has_liquidity(&self, position_id: &str) -> Result<bool, EngineError> {
    Ok(
      self
        .has_liquidity
        .lock()
        .unwrap()
        .get(position_id)
        .copied()
        .unwrap_or(false),
    )
  }

  async fn build_open_position_and_deposit(
    &self,
    _args: OpenPositionArgs<'_>,
  ) -> Result<Vec<UnsignedTx>, EngineError> {
    Ok(vec![UnsignedTx::new("open", vec![])])
  }

  async fn build_remove_liquidity_and_close(
    &self,
    _args: ClosePositionArgs<'_>,
  ) -> Result<Vec<UnsignedTx>, EngineError> {
    Ok(vec![UnsignedTx::new("remove_and_close", vec![])])
  }

  async fn build_close_position(&self, _args: ClosePositionArgs<'_>) -> Result<UnsignedTx, EngineError> {
    Ok(UnsignedTx::new("close", vec![]))
  }

  async fn build_claim_swap_fees(&self, _position_id: &str) -> Result<UnsignedTx, EngineError> {
    Ok(UnsignedTx::new("claim", vec![]))
  }
}

pub struct FakeRpcAdapter {
  pub fail_sends: AtomicU64,
  pub sent: Mutex<Vec<String>>,
  /// Accounts this fake reports as present, keyed by pubkey. Absent from
  /// this map means `get_account_info` returns `None`, the same "does not
  /// exist on-chain" signal a real RPC gives for an unfunded address.
  pub accounts: Mutex<HashMap<Pubkey, solana_sdk::account::Account>>,
  pub token_balances: Mutex<HashMap<Pubkey, u128>>,
}

impl FakeRpcAdapter {
  pub fn new() -> Self {
    Self {
      fail_sends: AtomicU64::new(0),
      sent: Mutex::new(vec![]),
      accounts: Mutex::new(HashMap::new()),
      token_balances: Mutex::new(HashMap::new()),
    }
  }

  /// Seeds a position/account as present and owned by `owner`, so
  /// `sync_active`-style reconciliation treats it as still live on-chain.
  pub fn set_account_owner(&self, pubkey: Pubkey, owner: Pubkey) {
    self.accounts.lock().unwrap().insert(
      pubkey,
      solana_sdk::account::Account {
        lamports: 1,
        data: vec![],
        owner,
        executable: false,
        rent_epoch: 0,
      },
    );
  }

  pub fn set_token_balance(&self, ata: Pubkey, amount: u128) {
    self.token_balances.lock().unwrap().insert(ata, amount);
  }
}

#[async_trait]
impl RpcAdapter for FakeRpcAdapter {
  async fn get_balance(&self, _pubkey: &Pubkey) -> Result<u64, EngineError> {
    Ok(10_000_000_000)
  }

  async fn get_account_info(
    &self,
    pubkey: &Pubkey,
  ) -> Result<Option<solana_sdk::account::Account>, EngineError> {
    Ok(self.accounts.lock().unwrap().get(pubkey).cloned())
  }

  async fn get_token_account_balance(&self, ata: &Pubkey) -> Result<u128, EngineError> {
    Ok(self.token_balances.lock().unwrap().get(ata).copied().unwrap_or(0))
  }

  async fn get_latest_blockhash(&self) -> Result<solana_sdk::hash::Hash, EngineError> {
    Ok(solana_sdk::hash::Hash::default())
  }

  async fn is_blockhash_valid(&self, _blockhash: &solana_sdk::hash::Hash) -> Result<bool, EngineError> {
    Ok(true)
  }

  async fn send(&self, payer: &Keypair, tx: &UnsignedTx) -> Result<Signature, EngineError> {
    if self.fail_sends.load(Ordering::SeqCst) > 0 {
      self.fail_sends.fetch_sub(1, Ordering::SeqCst);
      return Err(EngineError::Transient(crate::error::TransientError::SendFailure(
        "forced failure".to_string(),
      )));
    }
    self.sent.lock().unwrap().push(tx.label.to_string());
    let _ = payer.pubkey();
    let _: &[Instruction] = &tx.instructions;
    Ok(Signature::default())
  }

  async fn send_prebuilt_base64(&self, payer: &Keypair, swap_transaction_base64: &str) -> Result<Signature, EngineError> {
    if self.fail_sends.load(Ordering::SeqCst) > 0 {
      self.fail_sends.fetch_sub(1, Ordering::SeqCst);
      return Err(EngineError::Transient(crate::error::TransientError::SendFailure(
        "forced failure".to_string(),
      )));
    }
    self.sent.lock().unwrap().push(swap_transaction_base64.to_string());
    let _ = payer.pubkey();
    Ok(Signature::default())
  }

  async fn confirm(&self, _signature: &Signature) -> Result<bool, EngineError> {
    Ok(true)
  }
}
