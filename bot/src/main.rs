use std::process::ExitCode;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use lb_hedge_core::adapters::{HttpAggregatorClient, HttpDiscoveryClient, StaticPoolConfigProvider};
use lb_hedge_core::{HedgeManager, PoolSelector, PositionManager, PositionMonitor, PositionStore, PriceMonitor};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signer::Signer;

mod amm;
mod config;

use amm::SolanaBinAmmAdapter;
use config::Config;

#[derive(Parser)]
#[command(name = "lb-hedge-bot", about = "Concentrated-liquidity position monitor and hedging bot")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Starts the supervisor loop; runs until Ctrl-C or a fatal error.
  Run,
  /// Prints a summary of every active position on disk.
  Status,
  /// Requests a graceful shutdown of a `run` process started from this
  /// directory, via the PID file `run` writes on startup.
  Stop,
}

fn main() -> ExitCode {
  dotenv::dotenv().ok();
  lb_hedge_core::util::init_logger();

  let cli = Cli::parse();
  let rt = match tokio::runtime::Runtime::new() {
    Ok(rt) => rt,
    Err(e) => {
      log::error!("failed to start async runtime: {}", e);
      return ExitCode::from(1);
    }
  };

  match cli.command {
    Commands::Run => rt.block_on(run_cmd()),
    Commands::Status => rt.block_on(status_cmd()),
    Commands::Stop => stop_cmd(),
  }
}

const PID_FILE: &str = "data/lb-hedge-bot.pid";

async fn run_cmd() -> ExitCode {
  let cfg = match Config::read() {
    Ok(cfg) => cfg,
    Err(e) => {
      log::error!("configuration error: {}", e);
      return ExitCode::from(1);
    }
  };

  let program_id = match std::env::var("AMM_PROGRAM_ID").ok().and_then(|s| Pubkey::from_str(&s).ok()) {
    Some(id) => id,
    None => {
      log::error!("AMM_PROGRAM_ID is not set to a valid pubkey");
      return ExitCode::from(1);
    }
  };

  let rpc_timeout = Duration::from_millis(cfg.rpc_timeout_ms);
  let rpc = Arc::new(lb_hedge_core::adapters::SolanaRpcAdapter::new(
    cfg.rpc_url.clone(),
    rpc_timeout,
    Duration::from_secs(90),
  ));
  let operator = Arc::new(cfg.operator);

  // Preflight: an operator that can't even fetch its own balance means the
  // RPC endpoint is unreachable or misconfigured; fail fast rather than
  // spin up the supervisor against a dead endpoint.
  if let Err(e) = preflight_rpc(&rpc, &operator).await {
    log::error!("RPC preflight failed: {}", e);
    return ExitCode::from(2);
  }

  let amm = Arc::new(SolanaBinAmmAdapter::new(rpc.clone(), program_id));
  let aggregator = match HttpAggregatorClient::new(cfg.aggregator_base_url.clone(), Duration::from_secs(10)) {
    Ok(client) => Arc::new(client),
    Err(e) => {
      log::error!("failed to build aggregator client: {}", e);
      return ExitCode::from(1);
    }
  };
  let discovery = match HttpDiscoveryClient::new(cfg.discovery_base_url.clone(), Duration::from_secs(10)) {
    Ok(client) => Arc::new(client),
    Err(e) => {
      log::error!("failed to build discovery client: {}", e);
      return ExitCode::from(1);
    }
  };

  let store = match PositionStore::open(cfg.data_dir.clone()).await {
    Ok(store) => Arc::new(store),
    Err(e) => {
      log::error!("failed to open position store: {}", e);
      return ExitCode::from(1);
    }
  };

  let price_monitor = Arc::new(PriceMonitor::new(amm.clone()));
  let position_manager = Arc::new(PositionManager::new(
    amm.clone(),
    rpc.clone(),
    price_monitor.clone(),
    operator.clone(),
  ));
  let pool_selector = Arc::new(PoolSelector::new(amm.clone(), discovery.clone()));
  let hedge_manager = HedgeManager::new(
    amm.clone(),
    rpc.clone(),
    aggregator.clone(),
    price_monitor.clone(),
    store.clone(),
    operator.clone(),
  );
  let pool_configs = Arc::new(StaticPoolConfigProvider::new(cfg.pools.clone()));

  let monitor = PositionMonitor::new(
    amm,
    rpc,
    aggregator,
    price_monitor,
    position_manager,
    pool_selector,
    hedge_manager,
    store,
    pool_configs,
    cfg.global,
  );

  if let Err(e) = write_pid_file() {
    log::warn!("failed to write pid file, `stop` will not find this process: {}", e);
  }

  let run = Arc::new(AtomicBool::new(true));
  let shutdown_flag = run.clone();
  tokio::spawn(async move {
    let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(stream) => stream,
      Err(e) => {
        log::warn!("failed to install SIGTERM handler: {}", e);
        let _ = tokio::signal::ctrl_c().await;
        shutdown_flag.store(false, Ordering::SeqCst);
        return;
      }
    };
    tokio::select! {
      _ = tokio::signal::ctrl_c() => log::info!("received ctrl-c, shutting down"),
      _ = terminate.recv() => log::info!("received SIGTERM (from `lb-hedge-bot stop`), shutting down"),
    }
    shutdown_flag.store(false, Ordering::SeqCst);
  });

  monitor.run(run).await;
  remove_pid_file();
  ExitCode::from(0)
}

async fn preflight_rpc<R: lb_hedge_core::adapters::RpcAdapter>(
  rpc: &Arc<R>,
  operator: &solana_sdk::signature::Keypair,
) -> anyhow::Result<()> {
  const ATTEMPTS: u32 = 3;
  let mut last_err = None;
  for attempt in 1..=ATTEMPTS {
    match rpc.get_balance(&operator.pubkey()).await {
      Ok(lamports) => {
        log::info!("operator wallet {} balance: {} lamports", operator.pubkey(), lamports);
        return Ok(());
      }
      Err(e) => {
        log::warn!("preflight RPC attempt {}/{} failed: {}", attempt, ATTEMPTS, e);
        last_err = Some(e);
        tokio::time::sleep(Duration::from_secs(2)).await;
      }
    }
  }
  Err(anyhow::anyhow!(
    "RPC unreachable after {} attempts: {}",
    ATTEMPTS,
    last_err.map(|e| e.to_string()).unwrap_or_default()
  ))
}

async fn status_cmd() -> ExitCode {
  let cfg = match Config::read() {
    Ok(cfg) => cfg,
    Err(e) => {
      log::error!("configuration error: {}", e);
      return ExitCode::from(1);
    }
  };
  let store = match PositionStore::open(cfg.data_dir).await {
    Ok(store) => store,
    Err(e) => {
      log::error!("failed to open position store: {}", e);
      return ExitCode::from(1);
    }
  };
  let active = store.all_active().await;
  if active.is_empty() {
    println!("no active positions");
    return ExitCode::from(0);
  }
  println!("{:<44} {:<44} {:>12} {:>10}", "position", "pool", "price", "status");
  for position in active {
    println!(
      "{:<44} {:<44} {:>12} {:>10}",
      position.position_id,
      position.pool_address,
      position
        .current_price
        .map(|p| format!("{:.4}", p))
        .unwrap_or_else(|| "-".to_string()),
      format!("{:?}", position.status)
    );
  }
  ExitCode::from(0)
}

fn stop_cmd() -> ExitCode {
  let pid = match std::fs::read_to_string(PID_FILE) {
    Ok(contents) => contents.trim().to_string(),
    Err(e) => {
      log::error!("no running instance found ({}): {}", PID_FILE, e);
      return ExitCode::from(1);
    }
  };
  let status = std::process::Command::new("kill").arg("-TERM").arg(&pid).status();
  match status {
    Ok(status) if status.success() => {
      println!("sent shutdown signal to pid {}", pid);
      ExitCode::from(0)
    }
    Ok(status) => {
      log::error!("kill exited with {}", status);
      ExitCode::from(1)
    }
    Err(e) => {
      log::error!("failed to invoke kill: {}", e);
      ExitCode::from(1)
    }
  }
}

fn write_pid_file() -> std::io::Result<()> {
  if let Some(parent) = std::path::Path::new(PID_FILE).parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(PID_FILE, std::process::id().to_string())
}

fn remove_pid_file() {
  let _ = std::fs::remove_file(PID_FILE);
}
