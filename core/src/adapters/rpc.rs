use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::account::Account;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::message::{v0, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::VersionedTransaction;

use crate::adapters::amm::UnsignedTx;
use crate::error::{EngineError, TransientError};

/// Chain RPC capabilities consumed by the core, wrapped behind a
/// trait so `PositionManager`/`HedgeManager` can be tested against a fake
/// without a live validator. Build/sign/send/confirm stays a single
/// build-complete-sign-submit-poll pipeline over the plain `UnsignedTx`
/// message produced by `AmmAdapter`.
#[async_trait]
pub trait RpcAdapter: Send + Sync {
  async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, EngineError>;
  async fn get_account_info(&self, pubkey: &Pubkey) -> Result<Option<Account>, EngineError>;
  /// Balance of a token account in smallest units, `0` if the account does
  /// not exist yet (e.g. an ATA that has never been funded).
  async fn get_token_account_balance(&self, ata: &Pubkey) -> Result<u128, EngineError>;
  async fn get_latest_blockhash(&self) -> Result<Hash, EngineError>;
  async fn is_blockhash_valid(&self, blockhash: &Hash) -> Result<bool, EngineError>;

  /// Completes an `UnsignedTx` with a fresh blockhash and fee payer, signs
  /// with the operator key plus any adapter-supplied signers, and submits
  /// it. Rebuilding the transaction on retry is the caller's responsibility
  /// (`PositionManager`), not this trait: calling this twice sends two
  /// distinct transactions with two distinct blockhashes.
  async fn send(&self, payer: &Keypair, tx: &UnsignedTx) -> Result<Signature, EngineError>;

  /// Signs and submits a transaction the aggregator already built and
  /// base64-encoded (`POST /swap-instructions`'s `swap_transaction_base64`).
  /// Unlike `send`, the message comes pre-compiled with its own
  /// blockhash; this only attaches the operator's signature before
  /// submitting.
  async fn send_prebuilt_base64(&self, payer: &Keypair, swap_transaction_base64: &str) -> Result<Signature, EngineError>;

  async fn confirm(&self, signature: &Signature) -> Result<bool, EngineError>;
}

pub struct SolanaRpcAdapter {
  rpc: Arc<RpcClient>,
  confirm_timeout: Duration,
}

impl SolanaRpcAdapter {
  pub fn new(rpc_url: String, rpc_timeout: Duration, confirm_timeout: Duration) -> Self {
    Self {
      rpc: Arc::new(RpcClient::new_with_timeout(rpc_url, rpc_timeout)),
      confirm_timeout,
    }
  }

  pub fn rpc(&self) -> Arc<RpcClient> {
    self.rpc.clone()
  }
}

#[async_trait]
impl RpcAdapter for SolanaRpcAdapter {
  async fn get_balance(&self, pubkey: &Pubkey) -> Result<u64, EngineError> {
    self.rpc.get_balance(pubkey).await.map_err(|e| {
      log::warn!("get_balance failed: {}", e);
      EngineError::Transient(TransientError::RpcTimeout)
    })
  }

  async fn get_account_info(&self, pubkey: &Pubkey) -> Result<Option<Account>, EngineError> {
    match self.rpc.get_account(pubkey).await {
      Ok(account) => Ok(Some(account)),
      Err(e) => {
        // Solana RPC returns an error (not `None`) for missing accounts;
        // treat "AccountNotFound"-shaped errors as `None`, anything else as
        // a transient RPC failure, matching close pre-flight.
        let msg = e.to_string();
        if msg.contains("AccountNotFound") || msg.contains("could not find account") {
          Ok(None)
        } else {
          log::warn!("get_account_info failed: {}", msg);
          Err(EngineError::Transient(TransientError::RpcTimeout))
        }
      }
    }
  }

  async fn get_token_account_balance(&self, ata: &Pubkey) -> Result<u128, EngineError> {
    match self.rpc.get_token_account_balance(ata).await {
      Ok(balance) => Ok(balance.amount.parse().unwrap_or(0)),
      Err(e) => {
        let msg = e.to_string();
        if msg.contains("AccountNotFound") || msg.contains("could not find account") {
          Ok(0)
        } else {
          log::warn!("get_token_account_balance failed: {}", msg);
          Err(EngineError::Transient(TransientError::RpcTimeout))
        }
      }
    }
  }

  async fn get_latest_blockhash(&self) -> Result<Hash, EngineError> {
    self.rpc.get_latest_blockhash().await.map_err(|e| {
      log::warn!("get_latest_blockhash failed: {}", e);
      EngineError::Transient(TransientError::RpcTimeout)
    })
  }

  async fn is_blockhash_valid(&self, blockhash: &Hash) -> Result<bool, EngineError> {
    self
      .rpc
      .is_blockhash_valid(blockhash, CommitmentConfig::confirmed())
      .await
      .map_err(|e| {
        log::warn!("is_blockhash_valid failed: {}", e);
        EngineError::Transient(TransientError::RpcTimeout)
      })
  }

  async fn send(&self, payer: &Keypair, tx: &UnsignedTx) -> Result<Signature, EngineError> {
    let blockhash = self.get_latest_blockhash().await?;
    let msg = VersionedMessage::V0(
      v0::Message::try_compile(&payer.pubkey(), &tx.instructions, &[], blockhash)
        .map_err(|e| EngineError::Transient(TransientError::SendFailure(e.to_string())))?,
    );
    let mut signers: Vec<&Keypair> = vec![payer];
    for s in &tx.additional_signers {
      signers.push(s.as_ref());
    }
    let versioned = VersionedTransaction::try_new(msg, &signers)
      .map_err(|e| EngineError::Transient(TransientError::SendFailure(e.to_string())))?;

    let config = RpcSendTransactionConfig {
      skip_preflight: false,
      max_retries: Some(3),
      ..Default::default()
    };
    let sig = self
      .rpc
      .send_transaction_with_config(&versioned, config)
      .await
      .map_err(|e| {
        log::error!("[{}] send_transaction failed: {}", tx.label, e);
        EngineError::Transient(TransientError::SendFailure(e.to_string()))
      })?;
    log::info!("[{}] submitted signature {}", tx.label, sig);
    Ok(sig)
  }

  async fn send_prebuilt_base64(&self, payer: &Keypair, swap_transaction_base64: &str) -> Result<Signature, EngineError> {
    let bytes = base64::engine::general_purpose::STANDARD
      .decode(swap_transaction_base64)
      .map_err(|e| EngineError::Transient(TransientError::SendFailure(format!("bad base64 swap tx: {}", e))))?;
    let unsigned: VersionedTransaction = bincode::deserialize(&bytes)
      .map_err(|e| EngineError::Transient(TransientError::SendFailure(format!("bad swap tx encoding: {}", e))))?;
    let signed = VersionedTransaction::try_new(unsigned.message, &[payer])
      .map_err(|e| EngineError::Transient(TransientError::SendFailure(e.to_string())))?;

    let config = RpcSendTransactionConfig {
      skip_preflight: false,
      max_retries: Some(3),
      ..Default::default()
    };
    let sig = self
      .rpc
      .send_transaction_with_config(&signed, config)
      .await
      .map_err(|e| {
        log::error!("[hedge-swap] send_transaction failed: {}", e);
        EngineError::Transient(TransientError::SendFailure(e.to_string()))
      })?;
    log::info!("[hedge-swap] submitted signature {}", sig);
    Ok(sig)
  }

  async fn confirm(&self, signature: &Signature) -> Result<bool, EngineError> {
    let deadline = tokio::time::Instant::now() + self.confirm_timeout;
    loop {
      match self.rpc.get_signature_status(signature).await {
        Ok(Some(Ok(_))) => return Ok(true),
        Ok(Some(Err(e))) => {
          log::error!("transaction {} confirmed with error: {}", signature, e);
          return Ok(false);
        }
        Ok(None) => {
          if tokio::time::Instant::now() >= deadline {
            return Err(EngineError::Transient(TransientError::BlockhashExpired));
          }
          tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Err(e) => {
          log::warn!("get_signature_status failed: {}", e);
          if tokio::time::Instant::now() >= deadline {
            return Err(EngineError::Transient(TransientError::RpcTimeout));
          }
          tokio::time::sleep(Duration::from_millis(500)).await;
        }
      }
    }
  }
}
