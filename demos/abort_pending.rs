use std::time::Duration;
use throttle_pool::{Limiter, LimiterConfig, Pool, PoolError};
use tokio::time::sleep;
use tracing::info;

#[derive(Default)]
struct Slot;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Abort Pending Example ---");

  let pool = Pool::<Slot>::with_capacity(1);
  let limiter = Limiter::new(pool, LimiterConfig::default());

  let running = {
    let limiter = limiter.clone();
    tokio::spawn(async move {
      limiter
        .run(|_slot| async {
          info!("Long call started; it will survive the abort.");
          sleep(Duration::from_secs(1)).await;
          "long call finished"
        })
        .await
    })
  };
  sleep(Duration::from_millis(100)).await;

  let mut pending = Vec::new();
  for i in 0..3 {
    let limiter = limiter.clone();
    pending.push(tokio::spawn(async move {
      (i, limiter.run(|_slot| async { "should never run" }).await)
    }));
  }
  sleep(Duration::from_millis(100)).await;

  info!("Aborting while three calls wait for the single slot.");
  limiter.abort(Some("shutting down"));

  for call in pending {
    let (i, outcome) = call.await.expect("call task panicked");
    match outcome {
      Err(PoolError::Aborted(reason)) => info!("Pending call {} rejected: {}", i, reason),
      other => info!("Pending call {} unexpectedly finished: {:?}", i, other),
    }
  }

  match running.await.expect("long call task panicked") {
    Ok(result) => info!("{}", result),
    Err(e) => tracing::error!("Long call failed: {:?}", e),
  }
  info!("--- Abort Pending Example End ---");
}
