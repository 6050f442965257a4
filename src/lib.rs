//! A Tokio-based bounded pool of opaque resources with release
//! notification, plus a limiter for throttled, cancellable access to
//! pooled resources.

mod deferred;
mod error;
mod events;
mod limiter;
mod options;
mod pool;

pub use deferred::{Deferred, DeferredListener};
pub use error::PoolError;
pub use events::{ListenerId, PoolEvent};
pub use limiter::{Limiter, LimiterConfig};
pub use options::{FactoryFn, PoolOptions, ResetFn};
pub use pool::Pool;
