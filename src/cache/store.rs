//! Shared query cache: one entry per key, at most one fetch in flight per key,
//! invalidation by resource name.

use chrono::Utc;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, Listener, QuerySnapshot, QueryStatus};
use super::key::QueryKey;
use super::notify::{Dispatcher, Notification};
use crate::api::{ApiError, DomainApi, Page};

/// Tuning for fetch retries and retention of unobserved entries.
#[derive(Debug, Clone)]
pub struct CacheOptions {
  /// Automatic retries after a failed page fetch
  pub retry: u32,
  /// Delay before each retry
  pub retry_delay: Duration,
  /// How long an entry survives after its last subscriber leaves
  pub gc_time: Duration,
}

impl Default for CacheOptions {
  fn default() -> Self {
    Self {
      retry: 1,
      retry_delay: Duration::from_secs(1),
      gc_time: Duration::from_secs(5 * 60),
    }
  }
}

#[derive(Default)]
struct CacheState {
  entries: HashMap<QueryKey, CacheEntry>,
  next_subscriber: u64,
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
  // Listeners run outside the lock, so a poisoned lock still holds
  // consistent entries.
  state.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared<A> {
  api: Arc<A>,
  state: Arc<Mutex<CacheState>>,
  dispatcher: Dispatcher,
  options: CacheOptions,
}

/// Cache of fetched pages shared by every consumer.
///
/// Construct one per process (or per test) and hand clones to consumers;
/// clones share the same entries.
pub struct QueryCache<A: DomainApi> {
  shared: Arc<Shared<A>>,
}

impl<A: DomainApi> Clone for QueryCache<A> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<A: DomainApi> QueryCache<A> {
  pub fn new(api: Arc<A>) -> Self {
    Self::with_options(api, CacheOptions::default())
  }

  pub fn with_options(api: Arc<A>, options: CacheOptions) -> Self {
    Self {
      shared: Arc::new(Shared {
        api,
        state: Arc::new(Mutex::new(CacheState::default())),
        dispatcher: Dispatcher::default(),
        options,
      }),
    }
  }

  /// Register interest in `key`.
  ///
  /// Creates the entry if needed and starts a fetch when the fetch policy
  /// allows one. Subscribers joining while a fetch is in flight share its
  /// result. `listener` runs on every later state change of the entry, in
  /// subscription order. Dropping the returned handle unsubscribes.
  ///
  /// Must be called within a tokio runtime.
  pub fn subscribe<F>(&self, key: QueryKey, listener: F) -> Subscription
  where
    F: Fn(&QuerySnapshot) + Send + Sync + 'static,
  {
    let listener: Listener = Arc::new(listener);

    let id = {
      let mut state = lock(&self.shared.state);
      let id = state.next_subscriber;
      state.next_subscriber += 1;

      let entry = state
        .entries
        .entry(key)
        .or_insert_with(|| CacheEntry::new(key));
      entry.cancel_gc();
      entry.subscribers.insert(id, listener);
      debug!(%key, subscribers = entry.subscribers.len(), "subscribed");

      if entry.wants_fetch_on_subscribe() {
        let notification = self.shared.start_fetch(entry);
        self.shared.dispatcher.push(notification);
      }
      id
    };
    self.shared.dispatcher.drain();

    Subscription {
      key,
      id,
      state: Arc::downgrade(&self.shared.state),
      gc_time: self.shared.options.gc_time,
      released: false,
    }
  }

  /// Current state of `key`. Never blocks on a fetch; unknown keys read as
  /// Idle with no data.
  pub fn get(&self, key: &QueryKey) -> QuerySnapshot {
    lock(&self.shared.state)
      .entries
      .get(key)
      .map(CacheEntry::snapshot)
      .unwrap_or_default()
  }

  /// Mark every entry of `resource` Stale and refetch the observed ones.
  ///
  /// Entries without subscribers stay Stale until the next subscribe.
  /// Returns the number of entries marked.
  pub fn invalidate(&self, resource: &str) -> usize {
    let dispatcher = &self.shared.dispatcher;
    let mut marked = 0;
    let mut refetched = 0;

    {
      let mut state = lock(&self.shared.state);
      for entry in state
        .entries
        .values_mut()
        .filter(|e| e.key.belongs_to(resource))
      {
        marked += 1;
        entry.status = QueryStatus::Stale;
        // Only Errored entries carry an error
        entry.error = None;
        dispatcher.push(entry.notification());

        if entry.is_observed() && entry.can_start_fetch() {
          refetched += 1;
          dispatcher.push(self.shared.start_fetch(entry));
        }
      }
    }

    info!(resource, marked, refetched, "invalidated cache");
    dispatcher.drain();
    marked
  }

  /// Keys currently held, in no particular order.
  pub fn keys(&self) -> Vec<QueryKey> {
    lock(&self.shared.state).entries.keys().copied().collect()
  }

  pub fn subscriber_count(&self, key: &QueryKey) -> usize {
    lock(&self.shared.state)
      .entries
      .get(key)
      .map_or(0, |e| e.subscribers.len())
  }

  pub fn is_fetching(&self, key: &QueryKey) -> bool {
    lock(&self.shared.state)
      .entries
      .get(key)
      .is_some_and(|e| e.in_flight.is_some())
  }
}

impl<A: DomainApi> Shared<A> {
  /// Move `entry` to Fetching and spawn its fetch.
  ///
  /// Called with the state lock held; the request future is created here so
  /// that the in-flight handle is recorded before the lock is released.
  fn start_fetch(self: &Arc<Self>, entry: &mut CacheEntry) -> Notification {
    let key = entry.key;
    debug!(%key, "starting fetch");

    let request = self.api.fetch_page(key.request());
    let shared = Arc::clone(self);
    entry.status = QueryStatus::Fetching;
    entry.in_flight = Some(tokio::spawn(async move {
      shared.run_fetch(key, request).await;
    }));
    entry.notification()
  }

  async fn run_fetch(
    self: Arc<Self>,
    key: QueryKey,
    mut request: BoxFuture<'static, Result<Page, ApiError>>,
  ) {
    let mut attempt = 0;
    let result = loop {
      match request.await {
        Err(err) if attempt < self.options.retry && err.is_retryable() => {
          attempt += 1;
          debug!(%key, attempt, error = %err, "retrying fetch");
          tokio::time::sleep(self.options.retry_delay).await;
          request = self.api.fetch_page(key.request());
        }
        result => break result,
      }
    };

    self.settle(key, result);
    self.dispatcher.drain();
  }

  /// Apply a finished fetch to its entry.
  ///
  /// An entry invalidated while the fetch was in flight keeps the new data
  /// but stays Stale, and is fetched once more if anyone is watching.
  fn settle(self: &Arc<Self>, key: QueryKey, result: Result<Page, ApiError>) {
    let mut state = lock(&self.state);
    let Some(entry) = state.entries.get_mut(&key) else {
      return;
    };

    entry.in_flight = None;
    let invalidated = entry.status.is_stale();

    match result {
      Ok(page) => {
        debug!(%key, items = page.items.len(), total = page.total, "fetch succeeded");
        entry.data = Some(Arc::new(page));
        entry.error = None;
        entry.updated_at = Some(Utc::now());
        entry.status = QueryStatus::Fresh;
      }
      Err(err) => {
        warn!(%key, error = %err, "fetch failed");
        entry.error = Some(err);
        entry.status = QueryStatus::Errored;
      }
    }
    if invalidated {
      entry.status = QueryStatus::Stale;
      entry.error = None;
    }

    self.dispatcher.push(entry.notification());
    if invalidated && entry.is_observed() {
      let notification = self.start_fetch(entry);
      self.dispatcher.push(notification);
    } else if !entry.is_observed() {
      schedule_gc(entry, Arc::downgrade(&self.state), self.options.gc_time);
    }
  }
}

/// Remove `entry` after `gc_time` unless it gains a subscriber or a fetch
/// in the meantime.
fn schedule_gc(entry: &mut CacheEntry, state: Weak<Mutex<CacheState>>, gc_time: Duration) {
  let Ok(runtime) = tokio::runtime::Handle::try_current() else {
    return;
  };

  entry.cancel_gc();
  let key = entry.key;
  entry.gc = Some(runtime.spawn(async move {
    tokio::time::sleep(gc_time).await;
    let Some(state) = state.upgrade() else {
      return;
    };
    let mut state = lock(&state);
    if state.entries.get(&key).is_some_and(CacheEntry::is_collectable) {
      state.entries.remove(&key);
      debug!(%key, "collected unobserved entry");
    }
  }));
}

/// Active interest in one cache key. Unsubscribes on drop.
pub struct Subscription {
  key: QueryKey,
  id: u64,
  state: Weak<Mutex<CacheState>>,
  gc_time: Duration,
  released: bool,
}

impl Subscription {
  pub fn key(&self) -> QueryKey {
    self.key
  }

  /// Current state of the subscribed entry.
  pub fn snapshot(&self) -> QuerySnapshot {
    self
      .state
      .upgrade()
      .and_then(|state| lock(&state).entries.get(&self.key).map(CacheEntry::snapshot))
      .unwrap_or_default()
  }

  pub fn unsubscribe(mut self) {
    self.release();
  }

  fn release(&mut self) {
    if std::mem::replace(&mut self.released, true) {
      return;
    }
    let Some(state) = self.state.upgrade() else {
      return;
    };

    let mut guard = lock(&state);
    if let Some(entry) = guard.entries.get_mut(&self.key) {
      entry.subscribers.remove(&self.id);
      debug!(key = %self.key, subscribers = entry.subscribers.len(), "unsubscribed");
      if !entry.is_observed() {
        schedule_gc(entry, Arc::downgrade(&state), self.gc_time);
      }
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.release();
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("key", &self.key)
      .field("id", &self.id)
      .finish_non_exhaustive()
  }
}
