pub mod adapters;
pub mod error;
pub mod hedge;
pub mod monitor;
pub mod pool_selector;
pub mod position_manager;
pub mod price_monitor;
pub mod store;
pub mod strategy;
pub mod types;
pub mod util;

#[cfg(test)]
mod testutil;

pub use error::{EngineError, FatalError, StructuralError, TransientError};
pub use hedge::HedgeManager;
pub use monitor::{PendingUserSwap, PositionMonitor, TickSummary};
pub use pool_selector::PoolSelector;
pub use position_manager::{CloseReason, PositionManager};
pub use price_monitor::PriceMonitor;
pub use store::PositionStore;
pub use strategy::StrategyCalculator;
pub use types::{
  AutoClaim, BinData, Decision, DecisionKind, DecisionReason, GlobalConfig, HedgeDirection,
  HedgeSizing, HedgeSwap, MergedConfig, MirrorSwapConfig, MonitoringConfig, Position, PositionId,
  PositionStatus, PoolConfig,
};
