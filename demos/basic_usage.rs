use std::sync::Arc;
use std::time::Duration;
use throttle_pool::{Limiter, LimiterConfig, Pool};
use tracing::info;

struct Session {
  id: u64,
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false) // Disable module paths for cleaner example output
    .init();

  info!("--- Basic Usage Example ---");

  // Up to three lazily created sessions, shared by five calls.
  let pool = Pool::from_factory(|created| (created < 3).then(|| Session { id: created }));
  let limiter = Limiter::new(pool.clone(), LimiterConfig::default());

  let mut calls = Vec::new();
  for i in 0..5 {
    let limiter = limiter.clone();
    calls.push(tokio::spawn(async move {
      limiter
        .run(move |session: Arc<Session>| async move {
          info!("Call {} running on session {}", i, session.id);
          tokio::time::sleep(Duration::from_millis(200)).await;
          format!("call {} served by session {}", i, session.id)
        })
        .await
    }));
  }

  for call in calls {
    match call.await.expect("call task panicked") {
      Ok(result) => info!("Result: {}", result),
      Err(e) => tracing::error!("Call failed: {:?}", e),
    }
  }

  info!("Pool holds {} sessions after the burst.", pool.total_size());
  info!("--- Basic Usage Example End ---");
}
