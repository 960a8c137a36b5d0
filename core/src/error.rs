use thiserror::Error;

/// Transient failures: worth retrying with fresh state (blockhash, quote).
#[derive(Debug, Error, Clone)]
pub enum TransientError {
  #[error("rpc call timed out")]
  RpcTimeout,
  #[error("recent blockhash expired before confirmation")]
  BlockhashExpired,
  #[error("failed to submit transaction: {0}")]
  SendFailure(String),
  #[error("aggregator endpoint unavailable: {0}")]
  AggregatorUnavailable(String),
}

/// Structural failures: retrying will not help; the supervisor records and
/// cools down instead.
#[derive(Debug, Error, Clone)]
pub enum StructuralError {
  #[error("position {0} not found")]
  PositionNotFound(String),
  #[error("position {0} already closed")]
  PositionAlreadyClosed(String),
  #[error("on-chain account for position {0} is not owned by the AMM program")]
  WrongProgramOwner(String),
  #[error("wallet balance insufficient for this action")]
  InsufficientBalance,
  #[error("no pool found for the requested token pair")]
  PoolNotFound,
  #[error("range_interval {0} is out of the [1, 100] bound")]
  InvalidRangeInterval(i64),
  #[error("position {0} still holds bin liquidity; a direct close is not possible")]
  PositionNotEmpty(String),
}

/// Fatal failures: abort the process with a non-zero exit code.
#[derive(Debug, Error, Clone)]
pub enum FatalError {
  #[error("failed to persist position record: {0}")]
  PersistenceWriteFailure(String),
  #[error("OPERATOR_SECRET_KEY is not configured")]
  OperatorKeyMissing,
}

/// Top-level error type threaded through the core. Policy outcomes
/// (`HedgeDustBelowMinimum`, `DecisionNone`) are modeled as plain enum
/// variants elsewhere (see `Decision`), not as errors.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
  #[error(transparent)]
  Transient(#[from] TransientError),
  #[error(transparent)]
  Structural(#[from] StructuralError),
  #[error(transparent)]
  Fatal(#[from] FatalError),
}

impl EngineError {
  /// Whether this error belongs to a retryable family.
  pub fn is_transient(&self) -> bool {
    matches!(self, EngineError::Transient(_))
  }

  pub fn is_structural(&self) -> bool {
    matches!(self, EngineError::Structural(_))
  }

  /// Errors the supervisor treats as "already closed" and drives to
  /// `status = closed` rather than surfacing.
  pub fn is_close_as_success(&self) -> bool {
    matches!(
      self,
      EngineError::Structural(StructuralError::PositionAlreadyClosed(_))
        | EngineError::Structural(StructuralError::WrongProgramOwner(_))
    )
  }
}
