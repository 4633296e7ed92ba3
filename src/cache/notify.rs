//! Ordered delivery of entry state changes to listeners.
//!
//! State changes are queued while the store lock is held, so the queue order
//! is the order the changes happened. Whichever caller finds the queue idle
//! delivers everything pending, including changes queued by other threads or
//! by listeners re-entering the store. A listener therefore never sees an
//! older state after a newer one.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::entry::{Listener, QuerySnapshot};

/// A snapshot paired with the listeners it goes to.
pub(crate) struct Notification {
  snapshot: QuerySnapshot,
  listeners: Vec<Listener>,
}

impl Notification {
  pub fn new(snapshot: QuerySnapshot, listeners: Vec<Listener>) -> Self {
    Self {
      snapshot,
      listeners,
    }
  }

  fn deliver(self) {
    for listener in &self.listeners {
      listener(&self.snapshot);
    }
  }
}

#[derive(Default)]
struct Queue {
  pending: VecDeque<Notification>,
  draining: bool,
}

#[derive(Default)]
pub(crate) struct Dispatcher {
  queue: Mutex<Queue>,
}

impl Dispatcher {
  fn lock(&self) -> MutexGuard<'_, Queue> {
    self.queue.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Queue a notification. Call with the store lock held.
  pub fn push(&self, notification: Notification) {
    self.lock().pending.push_back(notification);
  }

  /// Deliver queued notifications in order, unless another caller already is.
  ///
  /// Call without the store lock held.
  pub fn drain(&self) {
    {
      let mut queue = self.lock();
      if queue.draining {
        return;
      }
      queue.draining = true;
    }

    let mut guard = DrainGuard {
      dispatcher: self,
      armed: true,
    };
    loop {
      let next = {
        let mut queue = self.lock();
        match queue.pending.pop_front() {
          Some(next) => next,
          None => {
            // Released under the same lock that observed the empty queue, so
            // a concurrent push either lands before this or drains itself.
            queue.draining = false;
            guard.armed = false;
            return;
          }
        }
      };
      next.deliver();
    }
  }
}

/// Releases the drain flag if a listener panics mid-delivery.
struct DrainGuard<'a> {
  dispatcher: &'a Dispatcher,
  armed: bool,
}

impl Drop for DrainGuard<'_> {
  fn drop(&mut self) {
    if self.armed {
      self.dispatcher.lock().draining = false;
    }
  }
}
