use crate::deferred::{Deferred, DeferredListener};
use crate::error::PoolError;
use crate::events::{EventListeners, ListenerId, PoolEvent};
use crate::options::{FactoryFn, PoolOptions, ResetFn};

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use futures::future::{join_all, select_all};
use futures::stream::{self, Stream};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Bookkeeping for one currently held resource.
struct InUseEntry<T> {
  resource: Arc<T>,
  /// Completed exactly once, at the moment this resource is released.
  released: Deferred<()>,
}

struct PoolState<T> {
  /// Resources ready to be handed out, oldest first.
  available: VecDeque<Arc<T>>,
  in_use: Vec<InUseEntry<T>>,
  /// How many resources have been requested from the factory over the
  /// pool's lifetime, including requests it answered with `None`.
  created: u64,
  /// Rotated and completed at the end of every release, once the resource
  /// is back in the available set. Waiters race this alongside the
  /// per-resource deferreds: a release whose in-use entry left the
  /// registry before a waiter snapshotted its wait set would otherwise
  /// complete a deferred nobody is watching.
  release_pulse: Deferred<()>,
}

/// What a single pass over the pool's state produced: either a resource
/// from the available set, or the release signals to wait on.
enum Attempt<T> {
  Acquired(Arc<T>),
  Wait(Vec<DeferredListener<()>>),
}

/// A bounded pool of opaque resources.
///
/// Resources are handed out as `Arc<T>` under unique ownership per
/// acquisition and identity-compared on release (`Arc::ptr_eq`); the pool
/// never inspects their contents beyond passing them to the factory and
/// reset callbacks. The factory signals exhaustion by returning `None`,
/// which bounds the population.
///
/// Acquisition comes in a synchronous flavor ([`try_acquire`]) and a
/// suspending one ([`acquire`]); releases wake suspended waiters through
/// per-resource [`Deferred`]s. `Acquire`/`Release` handlers can be
/// attached via [`register_listener`].
///
/// [`try_acquire`]: Pool::try_acquire
/// [`acquire`]: Pool::acquire
/// [`register_listener`]: Pool::register_listener
pub struct Pool<T> {
  state: Mutex<PoolState<T>>,
  create: FactoryFn<T>,
  reset: Option<ResetFn<T>>,
  listeners: EventListeners<T>,
}

impl<T> Pool<T> {
  fn build(options: PoolOptions<T>) -> Arc<Self> {
    Arc::new(Self {
      state: Mutex::new(PoolState {
        available: VecDeque::new(),
        in_use: Vec::new(),
        created: 0,
        release_pulse: Deferred::new(),
      }),
      create: options.create,
      reset: options.reset,
      listeners: EventListeners::new(),
    })
  }

  /// Creates a pool from fully populated options.
  ///
  /// A non-zero `initial_size` triggers an eager [`bulk_create`] here and
  /// propagates its exhaustion failure; resources created before the
  /// failure stay in the pool.
  ///
  /// [`bulk_create`]: Pool::bulk_create
  pub fn new(options: PoolOptions<T>) -> Result<Arc<Self>, PoolError> {
    let initial_size = options.initial_size;
    let pool = Self::build(options);
    if initial_size > 0 {
      pool.bulk_create(initial_size)?;
    }
    Ok(pool)
  }

  /// Shorthand for a pool that lazily creates up to `capacity`
  /// default-constructed resources.
  pub fn with_capacity(capacity: usize) -> Arc<Self>
  where
    T: Default,
  {
    Self::build(PoolOptions::from(capacity))
  }

  /// Shorthand for a pool built around a bare factory closure.
  pub fn from_factory(create: impl Fn(u64) -> Option<T> + Send + Sync + 'static) -> Arc<Self> {
    Self::build(PoolOptions::with_factory(create))
  }

  /// Synchronously requests `n` resources from the factory, in order,
  /// parking each in the available set.
  ///
  /// On exhaustion the resources already created are kept, not rolled
  /// back; the error reports how far the fill got.
  pub fn bulk_create(&self, n: usize) -> Result<(), PoolError> {
    for produced in 0..n {
      match self.request_from_factory() {
        Some(resource) => {
          self.state.lock().available.push_back(resource);
        }
        None => {
          warn!(produced, requested = n, "Factory ran out during eager fill; keeping partial fill.");
          return Err(PoolError::FactoryExhausted { produced, requested: n });
        }
      }
    }
    trace!(count = n, "Eagerly filled pool.");
    Ok(())
  }

  /// Synchronously takes a resource if one can be had without waiting.
  ///
  /// Prefers the oldest member of the available set; falls back to lazy
  /// creation through the factory. Returns `None` when the available set
  /// is empty and the factory is exhausted; callers must check, this is
  /// not an error.
  pub fn try_acquire(&self) -> Option<Arc<T>> {
    let taken = {
      let mut state = self.state.lock();
      Self::take_from_available(&mut state)
    };
    if let Some(resource) = taken {
      self.listeners.emit(PoolEvent::Acquire, &resource);
      return Some(resource);
    }
    self.create_for_use()
  }

  /// Takes a resource, suspending until one can be had.
  ///
  /// Waiters race the release of every resource currently in use and
  /// retry from the top whenever any of them frees up. Several waiters
  /// may wake for a single release; the one that wins the retry gets the
  /// resource and the rest go back to waiting, so waiters are served
  /// eventually but in no particular order. Only immediately-available
  /// resources are handed out first-come-first-served.
  ///
  /// `cancel` revokes the wait: once it fires, the call returns
  /// [`PoolError::AcquireCancelled`] instead of continuing. With nothing
  /// in use and the factory exhausted there is no release to wait for,
  /// and the call parks until cancelled.
  pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Arc<T>, PoolError> {
    loop {
      if cancel.is_cancelled() {
        return Err(PoolError::AcquireCancelled);
      }

      // The wait set is snapshotted in the same critical section as the
      // availability check: any release that has not yet put its resource
      // back completes either its own deferred or the pulse, and both are
      // in the snapshot.
      let wait_on = match self.take_or_observe() {
        Attempt::Acquired(resource) => {
          self.listeners.emit(PoolEvent::Acquire, &resource);
          return Ok(resource);
        }
        Attempt::Wait(signals) => signals,
      };

      if let Some(resource) = self.create_for_use() {
        return Ok(resource);
      }

      tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          trace!("Suspended acquisition cancelled.");
          return Err(PoolError::AcquireCancelled);
        }
        _ = Self::any_release(wait_on) => {}
      }
    }
  }

  /// Returns `resource` to the pool.
  ///
  /// Calling this with a resource the pool does not currently hold in
  /// use (including a second release of the same resource) is a safe
  /// no-op.
  /// Otherwise the reset hook runs before the resource re-enters the
  /// available set, and waiters are woken last, once it is actually
  /// reusable. A panicking reset propagates to the caller and leaves the
  /// resource outside both collections.
  pub fn release(&self, resource: &Arc<T>) {
    let entry = {
      let mut state = self.state.lock();
      match state.in_use.iter().position(|entry| Arc::ptr_eq(&entry.resource, resource)) {
        Some(index) => state.in_use.remove(index),
        None => {
          trace!("Ignoring release of a resource not currently in use.");
          return;
        }
      }
    };

    if let Some(reset) = &self.reset {
      reset(&entry.resource);
    }
    self.listeners.emit(PoolEvent::Release, &entry.resource);
    let pulse = {
      let mut state = self.state.lock();
      state.available.push_back(entry.resource);
      std::mem::replace(&mut state.release_pulse, Deferred::new())
    };
    entry.released.complete(());
    pulse.complete(());
  }

  /// Discards every resource the pool knows about, available and in-use
  /// alike, without running the reset hook; the discarded resources are
  /// simply no longer tracked. The creation counter keeps its value, so a
  /// factory keyed off it stays exhausted. Waiters racing the discarded
  /// resources re-check the pool and park again if nothing can be
  /// produced.
  pub fn clear(&self) {
    let dropped = {
      let mut state = self.state.lock();
      let dropped = state.available.len() + state.in_use.len();
      state.available.clear();
      state.in_use.clear();
      dropped
    };
    if dropped > 0 {
      debug!(dropped, "Cleared pool.");
    }
  }

  pub fn available_size(&self) -> usize {
    self.state.lock().available.len()
  }

  pub fn in_use_size(&self) -> usize {
    self.state.lock().in_use.len()
  }

  /// Available plus in-use, read atomically.
  pub fn total_size(&self) -> usize {
    let state = self.state.lock();
    state.available.len() + state.in_use.len()
  }

  /// How many resources have been requested from the factory over the
  /// pool's lifetime. Never decreases; unaffected by [`clear`](Pool::clear).
  pub fn created_count(&self) -> u64 {
    self.state.lock().created
  }

  /// Registers a handler for `event`, dispatched synchronously and in
  /// registration order before the triggering acquire or release returns.
  pub fn register_listener(
    &self,
    event: PoolEvent,
    handler: impl Fn(&Arc<T>) + Send + Sync + 'static,
  ) -> ListenerId {
    self.listeners.register(event, handler)
  }

  /// Removes the handler registered under `id` for `event`.
  pub fn unregister_listener(&self, event: PoolEvent, id: ListenerId) -> bool {
    self.listeners.unregister(event, id)
  }

  /// Removes every handler registered for `event`.
  pub fn clear_listeners(&self, event: PoolEvent) {
    self.listeners.clear(event)
  }

  /// Lazily hands out resources through repeated synchronous
  /// acquisitions, ending the first time nothing more can be had without
  /// waiting. The yielded resources are in use until released.
  pub fn try_acquire_iter(&self) -> impl Iterator<Item = Arc<T>> + '_ {
    std::iter::from_fn(move || self.try_acquire())
  }

  /// An endless stream of suspending acquisitions, for consumption loops
  /// that take resources as fast as the pool can supply them. The stream
  /// never ends on its own; it terminates only when `cancel` fires, so
  /// callers bound iteration externally.
  pub fn acquire_stream<'a>(&'a self, cancel: &'a CancellationToken) -> impl Stream<Item = Arc<T>> + 'a {
    stream::unfold((), move |()| async move {
      match self.acquire(cancel).await {
        Ok(resource) => Some((resource, ())),
        Err(_) => None,
      }
    })
  }

  /// Settles once every resource currently in use has been released.
  ///
  /// Only the resources in use at the moment of the call are observed;
  /// acquisitions that happen afterwards do not extend the wait. Resolves
  /// immediately when nothing is in use.
  pub async fn quiesce(&self) {
    let signals: Vec<DeferredListener<()>> = {
      let state = self.state.lock();
      state.in_use.iter().map(|entry| entry.released.listen()).collect()
    };
    if signals.is_empty() {
      return;
    }
    join_all(signals.into_iter().map(|listener| listener.wait())).await;
  }

  fn take_from_available(state: &mut PoolState<T>) -> Option<Arc<T>> {
    let resource = state.available.pop_front()?;
    state.in_use.push(InUseEntry {
      resource: resource.clone(),
      released: Deferred::new(),
    });
    Some(resource)
  }

  fn take_or_observe(&self) -> Attempt<T> {
    let mut state = self.state.lock();
    if let Some(resource) = Self::take_from_available(&mut state) {
      return Attempt::Acquired(resource);
    }
    let mut signals: Vec<DeferredListener<()>> =
      state.in_use.iter().map(|entry| entry.released.listen()).collect();
    // The pulse covers releases whose in-use entry is already gone from
    // the registry but whose resource has not yet reached the available
    // set; their per-resource deferred can no longer enter this snapshot.
    signals.push(state.release_pulse.listen());
    Attempt::Wait(signals)
  }

  /// One factory request, with the lifetime counter bumped whether or not
  /// the factory produces.
  fn request_from_factory(&self) -> Option<Arc<T>> {
    let count = {
      let mut state = self.state.lock();
      let count = state.created;
      state.created += 1;
      count
    };
    (self.create)(count).map(Arc::new)
  }

  /// Lazy creation during acquisition: a fresh resource goes straight
  /// into the in-use registry, never through the available set.
  fn create_for_use(&self) -> Option<Arc<T>> {
    let resource = self.request_from_factory()?;
    self.state.lock().in_use.push(InUseEntry {
      resource: resource.clone(),
      released: Deferred::new(),
    });
    debug!("Lazily created resource straight into the in-use registry.");
    self.listeners.emit(PoolEvent::Acquire, &resource);
    Some(resource)
  }

  /// Resolves when any of `signals` completes. An abandoned signal (its
  /// deferred dropped without completing) counts as a wake so the caller
  /// re-validates. The set is never empty: it always carries the release
  /// pulse, which only ever fires on an actual release, so with nothing
  /// in use this parks until the caller's cancellation token wins.
  async fn any_release(signals: Vec<DeferredListener<()>>) {
    let waits = signals.into_iter().map(|listener| Box::pin(listener.wait()));
    let _ = select_all(waits).await;
  }
}

impl<T> fmt::Debug for Pool<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("Pool")
      .field("available", &state.available.len())
      .field("in_use", &state.in_use.len())
      .field("created", &state.created)
      .finish_non_exhaustive()
  }
}
