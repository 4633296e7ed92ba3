//! Transient notifications that expire on their own.
//!
//! Every toast gets an independent expiry timer. Removal is always by id,
//! never by position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default lifetime of a toast.
pub const DEFAULT_TOAST_TIMEOUT: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  #[default]
  Error,
  Success,
  Info,
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Severity::Error => "error",
      Severity::Success => "success",
      Severity::Info => "info",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToastEntry {
  /// Unique for the lifetime of the queue, increasing in enqueue order
  pub id: u64,
  pub message: String,
  pub severity: Severity,
  pub created_at: DateTime<Utc>,
}

/// Visible toasts in enqueue order.
pub type ToastList = Arc<Vec<ToastEntry>>;

#[derive(Default)]
struct ToastState {
  entries: Vec<ToastEntry>,
  timers: HashMap<u64, JoinHandle<()>>,
  last_id: u64,
}

struct Inner {
  state: Mutex<ToastState>,
  snapshot: watch::Sender<ToastList>,
  timeout: Duration,
}

impl Inner {
  fn lock(&self) -> MutexGuard<'_, ToastState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn publish(&self, state: &ToastState) {
    // `send_replace` updates the value even with no receivers.
    self.snapshot.send_replace(Arc::new(state.entries.clone()));
  }

  /// Remove `id` if still present. Returns whether anything was removed.
  fn remove(&self, id: u64, cancel_timer: bool) -> bool {
    let mut state = self.lock();
    let timer = state.timers.remove(&id);
    if cancel_timer {
      if let Some(timer) = timer {
        timer.abort();
      }
    }

    let Some(pos) = state.entries.iter().position(|t| t.id == id) else {
      return false;
    };
    state.entries.remove(pos);
    self.publish(&state);
    true
  }
}

/// Ordered queue of toasts with automatic expiry.
///
/// Cloning shares the queue. Construct one per process (or per test).
#[derive(Clone)]
pub struct ToastQueue {
  inner: Arc<Inner>,
}

impl Default for ToastQueue {
  fn default() -> Self {
    Self::new(DEFAULT_TOAST_TIMEOUT)
  }
}

impl ToastQueue {
  /// Create an empty queue whose toasts expire after `timeout`.
  pub fn new(timeout: Duration) -> Self {
    let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
    Self {
      inner: Arc::new(Inner {
        state: Mutex::new(ToastState::default()),
        snapshot,
        timeout,
      }),
    }
  }

  pub fn timeout(&self) -> Duration {
    self.inner.timeout
  }

  /// Append a toast and schedule its expiry. Returns its id.
  ///
  /// Must be called within a tokio runtime.
  pub fn enqueue(&self, message: impl Into<String>, severity: Severity) -> u64 {
    let mut state = self.inner.lock();
    state.last_id += 1;
    let id = state.last_id;

    let toast = ToastEntry {
      id,
      message: message.into(),
      severity,
      created_at: Utc::now(),
    };
    debug!(id, %severity, message = %toast.message, "toast enqueued");
    state.entries.push(toast);

    let inner: Weak<Inner> = Arc::downgrade(&self.inner);
    let timeout = self.inner.timeout;
    let timer = tokio::spawn(async move {
      tokio::time::sleep(timeout).await;
      if let Some(inner) = inner.upgrade() {
        if inner.remove(id, false) {
          debug!(id, "toast expired");
        }
      }
    });
    state.timers.insert(id, timer);

    self.inner.publish(&state);
    id
  }

  /// Remove a toast early. Unknown or already-removed ids are ignored.
  pub fn dismiss(&self, id: u64) -> bool {
    let removed = self.inner.remove(id, true);
    if removed {
      debug!(id, "toast dismissed");
    }
    removed
  }

  /// Dismiss every visible toast.
  pub fn clear(&self) {
    let mut state = self.inner.lock();
    for (_, timer) in state.timers.drain() {
      timer.abort();
    }
    state.entries.clear();
    self.inner.publish(&state);
  }

  /// Visible toasts, oldest first.
  pub fn toasts(&self) -> ToastList {
    self.inner.snapshot.borrow().clone()
  }

  pub fn len(&self) -> usize {
    self.inner.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.lock().entries.is_empty()
  }

  /// Receive the visible list every time it changes.
  pub fn subscribe(&self) -> watch::Receiver<ToastList> {
    self.inner.snapshot.subscribe()
  }
}

impl fmt::Debug for ToastQueue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ToastQueue")
      .field("toasts", &self.toasts())
      .field("timeout", &self.inner.timeout)
      .finish()
  }
}
