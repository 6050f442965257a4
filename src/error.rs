use thiserror::Error;

/// Errors that can occur within the `throttle_pool` pool and limiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("resource factory exhausted after producing {produced} of {requested} resources")]
  FactoryExhausted { produced: usize, requested: usize },

  #[error("resource acquisition was cancelled before a resource became available")]
  AcquireCancelled,

  #[error("limiter aborted: {0}")]
  Aborted(String),

  #[error("limited call panicked during execution")]
  CallPanicked,
}
