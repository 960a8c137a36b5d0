use std::time::Duration;

/// Retries an async action a fixed number of times with a constant delay
/// between attempts, rebuilding the action from scratch on every attempt.
///
/// Used by `PositionManager::open`, where each retry must rebuild the
/// transaction so a fresh recent-blockhash is fetched: the callback closes
/// over everything needed to build-and-send exactly once per call, so
/// "retry" here means "call again", not "resend the same bytes".
pub async fn retry_linear<F, Fut, T, E>(
  attempts: usize,
  delay: Duration,
  mut action: F,
) -> Result<T, E>
where
  F: FnMut(usize) -> Fut,
  Fut: std::future::Future<Output = Result<T, E>>,
{
  let attempts = attempts.max(1);
  let mut last_err = None;
  for attempt in 0..attempts {
    match action(attempt).await {
      Ok(v) => return Ok(v),
      Err(e) => {
        log::warn!("attempt {}/{} failed", attempt + 1, attempts);
        last_err = Some(e);
        if attempt + 1 < attempts {
          tokio::time::sleep(delay).await;
        }
      }
    }
  }
  Err(last_err.expect("at least one attempt runs"))
}

/// Retries an async action with exponential backoff capped at `max_delay`,
/// doubling the delay on every failed attempt.
pub async fn retry_backoff<F, Fut, T, E>(
  attempts: usize,
  base_delay: Duration,
  max_delay: Duration,
  mut action: F,
) -> Result<T, E>
where
  F: FnMut(usize) -> Fut,
  Fut: std::future::Future<Output = Result<T, E>>,
{
  let attempts = attempts.max(1);
  let mut last_err = None;
  for attempt in 0..attempts {
    match action(attempt).await {
      Ok(v) => return Ok(v),
      Err(e) => {
        last_err = Some(e);
        if attempt + 1 < attempts {
          let backoff = base_delay.saturating_mul(1 << attempt.min(8));
          tokio::time::sleep(backoff.min(max_delay)).await;
        }
      }
    }
  }
  Err(last_err.expect("at least one attempt runs"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[tokio::test]
  async fn retry_linear_succeeds_eventually() {
    let calls = AtomicUsize::new(0);
    let result: Result<u32, &'static str> = retry_linear(3, Duration::from_millis(1), |_| {
      let n = calls.fetch_add(1, Ordering::SeqCst);
      async move {
        if n < 2 {
          Err("not yet")
        } else {
          Ok(42)
        }
      }
    })
    .await;
    assert_eq!(result, Ok(42));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn retry_linear_exhausts() {
    let result: Result<u32, &'static str> =
      retry_linear(3, Duration::from_millis(1), |_| async { Err("nope") }).await;
    assert_eq!(result, Err("nope"));
  }
}
