pub mod aggregator;
pub mod amm;
pub mod discovery;
pub mod pool_config;
pub mod rpc;

pub use aggregator::{AggregatorClient, HttpAggregatorClient, Quote};
pub use amm::{AmmAdapter, ClosePositionArgs, MintInfo, OpenPositionArgs, PoolSnapshot, UnsignedTx};
pub use discovery::{DiscoveryClient, HttpDiscoveryClient, PoolSummary};
pub use pool_config::{PoolConfigProvider, StaticPoolConfigProvider};
pub use rpc::{RpcAdapter, SolanaRpcAdapter};
