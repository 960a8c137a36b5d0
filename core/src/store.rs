use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;

use crate::error::{EngineError, FatalError};
use crate::types::{Position, PositionId, PositionStatus};

/// Durable, append-oriented position persistence: one JSON
/// document per position under `<root>/<position_id>.json`, written via
/// temp-file + rename for atomicity. Never deletes records; `closed` is a
/// terminal state recorded in-place. One file per entity keeps concurrent
/// saves of different positions from contending on the same inode.
pub struct PositionStore {
  root: PathBuf,
  /// In-memory mirror kept consistent with disk by `save`; reads never hit
  /// disk on the hot path ("read-through cache" lives in
  /// `PositionMonitor`, but the store itself also avoids redundant disk
  /// reads for `getActive`/`getById`).
  cache: RwLock<std::collections::HashMap<PositionId, Position>>,
}

impl PositionStore {
  pub async fn open(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
    let root = root.into();
    std::fs::create_dir_all(&root)
      .map_err(|e| EngineError::Fatal(FatalError::PersistenceWriteFailure(e.to_string())))?;
    let store = Self {
      root,
      cache: RwLock::new(std::collections::HashMap::new()),
    };
    store.load_all().await?;
    Ok(store)
  }

  fn path_for(&self, id: &PositionId) -> PathBuf {
    self.root.join(format!("{}.json", id.0))
  }

  async fn load_all(&self) -> Result<(), EngineError> {
    let mut cache = self.cache.write().await;
    let entries = match std::fs::read_dir(&self.root) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
      Err(e) => return Err(EngineError::Fatal(FatalError::PersistenceWriteFailure(e.to_string()))),
    };
    for entry in entries.flatten() {
      let path = entry.path();
      if path.extension().and_then(|e| e.to_str()) != Some("json") {
        continue;
      }
      let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) => {
          log::warn!("failed to read position file {:?}: {}", path, e);
          continue;
        }
      };
      match serde_json::from_str::<Position>(&contents) {
        Ok(position) => {
          cache.insert(position.position_id.clone(), position);
        }
        Err(e) => log::warn!("failed to parse position file {:?}: {}", path, e),
      }
    }
    Ok(())
  }

  /// Atomic write-to-temp-then-rename.
  pub async fn save(&self, position: Position) -> Result<(), EngineError> {
    let path = self.path_for(&position.position_id);
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(&position)
      .map_err(|e| EngineError::Fatal(FatalError::PersistenceWriteFailure(e.to_string())))?;
    write_atomic(&tmp_path, &path, &json)
      .map_err(|e| EngineError::Fatal(FatalError::PersistenceWriteFailure(e.to_string())))?;
    self
      .cache
      .write()
      .await
      .insert(position.position_id.clone(), position);
    Ok(())
  }

  pub async fn get_by_id(&self, id: &PositionId) -> Option<Position> {
    self.cache.read().await.get(id).cloned()
  }

  pub async fn get_active(&self, owner_address: &str) -> Vec<Position> {
    self
      .cache
      .read()
      .await
      .values()
      .filter(|p| p.owner_address == owner_address && p.status == PositionStatus::Active)
      .cloned()
      .collect()
  }

  pub async fn all_active(&self) -> Vec<Position> {
    self
      .cache
      .read()
      .await
      .values()
      .filter(|p| p.status == PositionStatus::Active)
      .cloned()
      .collect()
  }

  pub async fn len(&self) -> usize {
    self.cache.read().await.len()
  }
}

fn write_atomic(tmp_path: &Path, final_path: &Path, contents: &str) -> io::Result<()> {
  std::fs::write(tmp_path, contents)?;
  std::fs::rename(tmp_path, final_path)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::BoundedHistory;

  fn sample(id: &str, status: PositionStatus) -> Position {
    Position {
      position_id: id.into(),
      pool_address: "pool".to_string(),
      owner_address: "owner".to_string(),
      mint_x: "X".to_string(),
      decimals_x: 9,
      mint_y: "Y".to_string(),
      decimals_y: 6,
      initial_amount_x: 0,
      initial_amount_y: 0,
      min_bin_id: -1,
      max_bin_id: 1,
      initial_price: 1.0,
      lower_bound_price: 0.5,
      upper_bound_price: 1.5,
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

  #[tokio::test]
  async fn save_then_reopen_preserves_single_record() {
    let dir = tempdir();
    {
      let store = PositionStore::open(&dir).await.unwrap();
      store.save(sample("a", PositionStatus::Active)).await.unwrap();
      store
        .save(sample("a", PositionStatus::Closed))
        .await
        .unwrap();
      assert_eq!(store.len().await, 1);
    }
    let reopened = PositionStore::open(&dir).await.unwrap();
    assert_eq!(reopened.len().await, 1);
    let p = reopened.get_by_id(&"a".into()).await.unwrap();
    assert_eq!(p.status, PositionStatus::Closed);
  }

  #[tokio::test]
  async fn get_active_filters_by_owner_and_status() {
    let dir = tempdir();
    let store = PositionStore::open(&dir).await.unwrap();
    store.save(sample("a", PositionStatus::Active)).await.unwrap();
    store.save(sample("b", PositionStatus::Closed)).await.unwrap();
    let active = store.get_active("owner").await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].position_id.0, "a");
  }

  fn tempdir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("lb-hedge-core-test-{}", uuid::Uuid::new_v4()));
    dir
  }
}
