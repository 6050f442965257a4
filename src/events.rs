use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, trace};

lazy_static::lazy_static! {
  static ref NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(0);
}

/// The two lifecycle events a pool emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolEvent {
  /// A resource was handed out, either from the available set or freshly
  /// created by the factory.
  Acquire,
  /// A resource was returned and is about to re-enter the available set.
  Release,
}

/// Identifies a registered handler so it can later be unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler<T> = Arc<dyn Fn(&Arc<T>) + Send + Sync + 'static>;

/// A per-pool observer list with synchronous, in-order dispatch.
///
/// One instance per pool; no global state.
pub(crate) struct EventListeners<T> {
  acquire: RwLock<Vec<(ListenerId, Handler<T>)>>,
  release: RwLock<Vec<(ListenerId, Handler<T>)>>,
}

impl<T> EventListeners<T> {
  pub(crate) fn new() -> Self {
    Self {
      acquire: RwLock::new(Vec::new()),
      release: RwLock::new(Vec::new()),
    }
  }

  fn slot(&self, event: PoolEvent) -> &RwLock<Vec<(ListenerId, Handler<T>)>> {
    match event {
      PoolEvent::Acquire => &self.acquire,
      PoolEvent::Release => &self.release,
    }
  }

  pub(crate) fn register(
    &self,
    event: PoolEvent,
    handler: impl Fn(&Arc<T>) + Send + Sync + 'static,
  ) -> ListenerId {
    let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, AtomicOrdering::Relaxed));
    self.slot(event).write().push((id, Arc::new(handler)));
    trace!(?event, ?id, "Registered pool event handler.");
    id
  }

  /// Removes the handler registered under `id`. Returns `false` when no
  /// handler for `event` carries that id.
  pub(crate) fn unregister(&self, event: PoolEvent, id: ListenerId) -> bool {
    let mut handlers = self.slot(event).write();
    let before = handlers.len();
    handlers.retain(|(handler_id, _)| *handler_id != id);
    handlers.len() != before
  }

  pub(crate) fn clear(&self, event: PoolEvent) {
    self.slot(event).write().clear();
  }

  /// Invokes every handler for `event`, in registration order, on the
  /// calling thread. A panicking handler is logged and skipped; the
  /// remaining handlers still run.
  pub(crate) fn emit(&self, event: PoolEvent, resource: &Arc<T>) {
    // Handlers are cloned out of the lock so they may re-enter the pool
    // (and this registry) freely.
    let handlers: Vec<Handler<T>> = self.slot(event).read().iter().map(|(_, h)| h.clone()).collect();
    if handlers.is_empty() {
      return;
    }
    trace!(?event, handler_count = handlers.len(), "Dispatching pool event.");
    for handler in handlers {
      if std::panic::catch_unwind(AssertUnwindSafe(|| handler(resource))).is_err() {
        error!(?event, "A pool event handler panicked; continuing with remaining handlers.");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use parking_lot::Mutex;

  #[test]
  fn test_dispatches_in_registration_order() {
    let listeners = EventListeners::<u32>::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    for tag in ["first", "second", "third"] {
      let order = order.clone();
      listeners.register(PoolEvent::Acquire, move |_| order.lock().push(tag));
    }

    listeners.emit(PoolEvent::Acquire, &Arc::new(1));
    assert_eq!(*order.lock(), vec!["first", "second", "third"]);
  }

  #[test]
  fn test_unregister_removes_only_the_named_handler() {
    let listeners = EventListeners::<u32>::new();
    let hits = Arc::new(Mutex::new(Vec::new()));

    let keep = {
      let hits = hits.clone();
      listeners.register(PoolEvent::Release, move |_| hits.lock().push("keep"))
    };
    let drop_id = {
      let hits = hits.clone();
      listeners.register(PoolEvent::Release, move |_| hits.lock().push("drop"))
    };

    assert!(listeners.unregister(PoolEvent::Release, drop_id));
    assert!(!listeners.unregister(PoolEvent::Release, drop_id));
    // Ids are event-scoped: `keep` is not registered for Acquire.
    assert!(!listeners.unregister(PoolEvent::Acquire, keep));

    listeners.emit(PoolEvent::Release, &Arc::new(1));
    assert_eq!(*hits.lock(), vec!["keep"]);
  }

  #[test]
  fn test_clear_empties_one_event_only() {
    let listeners = EventListeners::<u32>::new();
    let hits = Arc::new(Mutex::new(Vec::new()));

    {
      let hits = hits.clone();
      listeners.register(PoolEvent::Acquire, move |_| hits.lock().push("acquire"));
    }
    {
      let hits = hits.clone();
      listeners.register(PoolEvent::Release, move |_| hits.lock().push("release"));
    }

    listeners.clear(PoolEvent::Acquire);
    listeners.emit(PoolEvent::Acquire, &Arc::new(1));
    listeners.emit(PoolEvent::Release, &Arc::new(1));
    assert_eq!(*hits.lock(), vec!["release"]);
  }

  #[test]
  fn test_panicking_handler_does_not_stop_later_handlers() {
    let listeners = EventListeners::<u32>::new();
    let hits = Arc::new(Mutex::new(Vec::new()));

    listeners.register(PoolEvent::Acquire, |_| panic!("handler blew up"));
    {
      let hits = hits.clone();
      listeners.register(PoolEvent::Acquire, move |_| hits.lock().push("survivor"));
    }

    listeners.emit(PoolEvent::Acquire, &Arc::new(1));
    assert_eq!(*hits.lock(), vec!["survivor"]);
  }
}
