use std::sync::Arc;

/// Produces resources on demand.
///
/// Called with the number of resources the pool has requested from the
/// factory so far (a monotonically increasing count); returns `None` once
/// exhausted. Exhaustion is a first-class signal, not an error.
pub type FactoryFn<T> = Arc<dyn Fn(u64) -> Option<T> + Send + Sync + 'static>;

/// Cleanup hook run on release, before a resource becomes reusable.
pub type ResetFn<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;

/// Construction options for [`Pool`](crate::Pool).
///
/// The pool also accepts two shorthands, covered by
/// [`Pool::with_capacity`](crate::Pool::with_capacity) (a plain count of
/// lazily default-constructed resources) and
/// [`Pool::from_factory`](crate::Pool::from_factory) (a bare factory
/// closure).
pub struct PoolOptions<T> {
  pub(crate) create: FactoryFn<T>,
  pub(crate) reset: Option<ResetFn<T>>,
  pub(crate) initial_size: usize,
}

impl<T> PoolOptions<T> {
  pub fn with_factory(create: impl Fn(u64) -> Option<T> + Send + Sync + 'static) -> Self {
    Self {
      create: Arc::new(create),
      reset: None,
      initial_size: 0,
    }
  }

  /// Installs a cleanup hook, run synchronously on every release before
  /// the resource re-enters the available set.
  pub fn reset(mut self, reset: impl Fn(&T) + Send + Sync + 'static) -> Self {
    self.reset = Some(Arc::new(reset));
    self
  }

  /// Eagerly fills the pool with `n` resources at construction time.
  ///
  /// If the factory runs out first, [`Pool::new`](crate::Pool::new)
  /// reports the failure instead of constructing silently short.
  pub fn initial_size(mut self, n: usize) -> Self {
    self.initial_size = n;
    self
  }
}

impl<T: Default> From<usize> for PoolOptions<T> {
  /// A plain count: lazily create up to `capacity` default-constructed
  /// resources, then report exhaustion.
  fn from(capacity: usize) -> Self {
    Self::with_factory(move |created| (created < capacity as u64).then(T::default))
  }
}
