use std::sync::Arc;
use std::time::Duration;
use throttle_pool::{Pool, PoolEvent};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Release Notification Example ---");

  let pool = Pool::from_factory(|created| (created < 2).then(|| format!("worker-{}", created)));
  pool.register_listener(PoolEvent::Acquire, |worker: &Arc<String>| {
    info!("listener: {} acquired", worker);
  });
  pool.register_listener(PoolEvent::Release, |worker: &Arc<String>| {
    info!("listener: {} released", worker);
  });

  let a = pool.try_acquire().expect("first worker");
  let b = pool.try_acquire().expect("second worker");

  let waiter = {
    let pool = pool.clone();
    tokio::spawn(async move {
      let token = CancellationToken::new();
      info!("Waiter suspended until a worker frees up.");
      let worker = pool.acquire(&token).await.expect("acquire failed");
      info!("Waiter got {}.", worker);
      pool.release(&worker);
    })
  };

  sleep(Duration::from_millis(200)).await;
  pool.release(&a);
  waiter.await.expect("waiter panicked");
  pool.release(&b);

  info!("{} workers available at the end.", pool.available_size());
  info!("--- Release Notification Example End ---");
}
