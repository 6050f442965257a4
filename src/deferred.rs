use std::fmt;

use tokio::sync::watch;

/// A future paired with an externally callable completion hook.
///
/// Completion is one-shot: the first `complete` wins and later calls are
/// ignored. Any number of [`DeferredListener`]s may wait on the same
/// deferred, and all of them observe the completion value. This lets a
/// releaser push a signal to waiters that have no advance handle to the
/// thing being waited for.
pub struct Deferred<T: Clone> {
  tx: watch::Sender<Option<T>>,
}

impl<T: Clone> Deferred<T> {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(None);
    Self { tx }
  }

  /// Completes the deferred with `value`.
  ///
  /// Returns `false` if it had already been completed, in which case
  /// `value` is discarded.
  pub fn complete(&self, value: T) -> bool {
    self.tx.send_if_modified(|slot| {
      if slot.is_none() {
        *slot = Some(value);
        true
      } else {
        false
      }
    })
  }

  pub fn is_completed(&self) -> bool {
    self.tx.borrow().is_some()
  }

  /// Returns an owned listener that resolves once the deferred completes.
  ///
  /// The listener outlives the `Deferred` itself: dropping a
  /// never-completed deferred resolves its listeners to `None`.
  pub fn listen(&self) -> DeferredListener<T> {
    DeferredListener {
      rx: self.tx.subscribe(),
    }
  }
}

impl<T: Clone> Default for Deferred<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Clone> fmt::Debug for Deferred<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Deferred")
      .field("completed", &self.is_completed())
      .field("listener_count", &self.tx.receiver_count())
      .finish()
  }
}

/// An owned wait handle produced by [`Deferred::listen`].
#[derive(Debug, Clone)]
pub struct DeferredListener<T: Clone> {
  rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> DeferredListener<T> {
  /// Waits for the paired deferred to complete.
  ///
  /// Resolves to `None` when the deferred was dropped without ever being
  /// completed.
  pub async fn wait(mut self) -> Option<T> {
    loop {
      if let Some(value) = self.rx.borrow_and_update().clone() {
        return Some(value);
      }
      if self.rx.changed().await.is_err() {
        return None;
      }
    }
  }

  /// Non-blocking probe of the paired deferred's state.
  pub fn is_completed(&self) -> bool {
    self.rx.borrow().is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_completes_once_and_ignores_later_values() {
    let deferred = Deferred::new();
    assert!(!deferred.is_completed());

    assert!(deferred.complete(1u32));
    assert!(!deferred.complete(2u32));
    assert!(deferred.is_completed());

    assert_eq!(deferred.listen().wait().await, Some(1));
  }

  #[tokio::test]
  async fn test_wakes_every_listener_with_the_same_value() {
    let deferred = Deferred::new();
    let first = deferred.listen();
    let second = deferred.listen();

    let waiters = tokio::spawn(async move {
      let (a, b) = tokio::join!(first.wait(), second.wait());
      (a, b)
    });

    tokio::task::yield_now().await;
    deferred.complete("released".to_string());

    let (a, b) = waiters.await.unwrap();
    assert_eq!(a.as_deref(), Some("released"));
    assert_eq!(b.as_deref(), Some("released"));
  }

  #[tokio::test]
  async fn test_listener_created_after_completion_resolves_immediately() {
    let deferred = Deferred::new();
    deferred.complete(7u32);
    assert_eq!(deferred.listen().wait().await, Some(7));
  }

  #[tokio::test]
  async fn test_abandoned_deferred_resolves_listeners_to_none() {
    let deferred = Deferred::<u32>::new();
    let listener = deferred.listen();
    drop(deferred);
    assert_eq!(listener.wait().await, None);
  }
}
