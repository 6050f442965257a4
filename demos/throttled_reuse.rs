use std::time::Duration;
use throttle_pool::{Limiter, LimiterConfig, Pool};
use tokio::time::Instant;
use tracing::info;

#[derive(Default)]
struct Connection;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Throttled Reuse Example (min busy 500ms) ---");

  let pool = Pool::<Connection>::with_capacity(1);
  let limiter = Limiter::new(
    pool,
    LimiterConfig {
      min_duration: Duration::from_millis(500),
      ..LimiterConfig::default()
    },
  );

  let started = Instant::now();
  for i in 0..3 {
    let answered = limiter
      .run(move |_connection| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        i
      })
      .await
      .expect("call failed");
    info!(
      "Call {} answered at {:?}; its connection stays busy until the 500ms mark.",
      answered,
      started.elapsed()
    );
  }

  info!(
    "Three sequential calls took {:?}: reuse is throttled, results are not.",
    started.elapsed()
  );
  info!("--- Throttled Reuse Example End ---");
}
