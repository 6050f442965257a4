use crate::error::PoolError;
use crate::pool::Pool;

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Tuning knobs for [`Limiter`].
#[derive(Debug, Clone)]
pub struct LimiterConfig {
  /// Minimum time a resource stays busy per call, independent of how
  /// quickly the call itself finishes. Zero disables the throttle.
  pub min_duration: Duration,
  /// Reason reported to callers rejected by [`Limiter::abort`] when the
  /// abort itself does not supply one.
  pub abort_reason: String,
}

impl Default for LimiterConfig {
  fn default() -> Self {
    Self {
      min_duration: Duration::ZERO,
      abort_reason: "limiter aborted".to_string(),
    }
  }
}

/// Serializes async calls against a pool's resources.
///
/// Each call acquires a resource, runs with it, and releases it. The
/// resource's busy time is stretched to a configured minimum so reuse
/// rate can be throttled without delaying the caller's answer, and calls
/// still waiting for a resource can be abandoned as a group via
/// [`abort`](Limiter::abort).
///
/// Clones share the pool, the cancellation signal and the configuration;
/// an abort through any clone rejects the pending calls of all of them.
pub struct Limiter<T> {
  pool: Arc<Pool<T>>,
  cancel: CancellationToken,
  abort_reason: Arc<Mutex<String>>,
  min_duration: Duration,
}

impl<T> Clone for Limiter<T> {
  fn clone(&self) -> Self {
    Self {
      pool: self.pool.clone(),
      cancel: self.cancel.clone(),
      abort_reason: self.abort_reason.clone(),
      min_duration: self.min_duration,
    }
  }
}

impl<T: Send + Sync + 'static> Limiter<T> {
  pub fn new(pool: Arc<Pool<T>>, config: LimiterConfig) -> Self {
    Self {
      pool,
      cancel: CancellationToken::new(),
      abort_reason: Arc::new(Mutex::new(config.abort_reason)),
      min_duration: config.min_duration,
    }
  }

  /// Runs `call` with an acquired resource.
  ///
  /// The returned future resolves as soon as `call` finishes. When the
  /// call ran shorter than the configured minimum duration, the resource
  /// itself stays in use on a background task for the remainder: the
  /// throttle delays reuse of the resource, never the caller's result.
  ///
  /// A panicking `call` is caught and reported as
  /// [`PoolError::CallPanicked`], and its resource is released
  /// immediately, with no throttle hold. Fallible calls that return
  /// `Result` pass through untouched as ordinary values.
  ///
  /// If [`abort`](Limiter::abort) fires while this call is still waiting
  /// for a resource, it is rejected with the abort reason and `call` is
  /// never invoked; no resource is taken. An already-aborted limiter
  /// rejects immediately, even when a resource is free.
  pub async fn run<F, Fut>(&self, call: F) -> Result<Fut::Output, PoolError>
  where
    F: FnOnce(Arc<T>) -> Fut,
    Fut: Future,
  {
    let resource = match self.pool.acquire(&self.cancel).await {
      Ok(resource) => resource,
      Err(PoolError::AcquireCancelled) => {
        let reason = self.abort_reason.lock().clone();
        debug!(%reason, "Rejecting limited call: aborted while waiting for a resource.");
        return Err(PoolError::Aborted(reason));
      }
      Err(other) => return Err(other),
    };

    let started = Instant::now();
    let run_resource = resource.clone();
    let outcome = AssertUnwindSafe(async move { call(run_resource).await })
      .catch_unwind()
      .await;

    match outcome {
      Ok(value) => {
        self.release_throttled(resource, started);
        Ok(value)
      }
      Err(_panic) => {
        warn!("Limited call panicked; releasing its resource immediately.");
        self.pool.release(&resource);
        Err(PoolError::CallPanicked)
      }
    }
  }

  /// Rejects every call currently waiting for a resource, with `reason`
  /// when given, else the configured abort reason.
  ///
  /// Calls already running keep their resource and finish normally;
  /// cancellation is not preemptive. Calls made after the abort are
  /// rejected as soon as they would start waiting.
  pub fn abort(&self, reason: Option<&str>) {
    if let Some(reason) = reason {
      *self.abort_reason.lock() = reason.to_string();
    }
    debug!("Limiter abort requested; cancelling pending acquisitions.");
    self.cancel.cancel();
  }

  pub fn is_aborted(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Holds `resource` in use until `min_duration` has elapsed since
  /// `started`, then releases it. The hold runs on a background task so
  /// the caller's result is never delayed by the throttle.
  fn release_throttled(&self, resource: Arc<T>, started: Instant) {
    let elapsed = started.elapsed();
    if elapsed >= self.min_duration {
      self.pool.release(&resource);
      return;
    }
    let remaining = self.min_duration - elapsed;
    trace!(?remaining, "Holding resource in use to satisfy the minimum busy duration.");
    let pool = self.pool.clone();
    tokio::spawn(async move {
      tokio::time::sleep(remaining).await;
      pool.release(&resource);
    });
  }
}

impl<T> fmt::Debug for Limiter<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Limiter")
      .field("min_duration", &self.min_duration)
      .field("aborted", &self.cancel.is_cancelled())
      .finish_non_exhaustive()
  }
}
