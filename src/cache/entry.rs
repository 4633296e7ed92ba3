//! Per-key cache state and the snapshots handed to consumers.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::key::QueryKey;
use super::notify::Notification;
use crate::api::{ApiError, Page};

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryStatus {
  /// Created but never fetched
  #[default]
  Idle,
  /// A fetch is in flight
  Fetching,
  /// Last fetch succeeded and nothing has invalidated it since
  Fresh,
  /// Invalidated; data (if any) is no longer authoritative
  Stale,
  /// Last fetch failed
  Errored,
}

impl QueryStatus {
  pub fn is_fetching(&self) -> bool {
    matches!(self, QueryStatus::Fetching)
  }

  pub fn is_fresh(&self) -> bool {
    matches!(self, QueryStatus::Fresh)
  }

  pub fn is_stale(&self) -> bool {
    matches!(self, QueryStatus::Stale)
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryStatus::Errored)
  }
}

/// Point-in-time view of one cache entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySnapshot {
  pub status: QueryStatus,
  /// Last successfully fetched page. Kept while a refetch is in flight or
  /// after a failed refetch.
  pub data: Option<Arc<Page>>,
  pub error: Option<ApiError>,
  /// When `data` was fetched
  pub updated_at: Option<DateTime<Utc>>,
  /// Incremented on every state change of the entry. A higher version is
  /// always the more recent state.
  pub version: u64,
}

impl QuerySnapshot {
  pub fn data(&self) -> Option<&Page> {
    self.data.as_deref()
  }

  pub fn error_message(&self) -> Option<&str> {
    self.error.as_ref().map(ApiError::message)
  }

  /// Whether this snapshot describes a later state than `other`.
  pub fn is_newer_than(&self, other: &QuerySnapshot) -> bool {
    self.version > other.version
  }
}

/// Callback registered by a subscriber.
pub type Listener = Arc<dyn Fn(&QuerySnapshot) + Send + Sync>;

pub(crate) struct CacheEntry {
  pub key: QueryKey,
  pub status: QueryStatus,
  pub data: Option<Arc<Page>>,
  pub error: Option<ApiError>,
  pub updated_at: Option<DateTime<Utc>>,
  pub version: u64,
  /// The single outstanding fetch for this key, if any.
  pub in_flight: Option<JoinHandle<()>>,
  /// Ordered by subscriber id, which is assigned in subscription order.
  pub subscribers: BTreeMap<u64, Listener>,
  /// Pending removal once the entry became unobserved.
  pub gc: Option<JoinHandle<()>>,
}

impl CacheEntry {
  pub fn new(key: QueryKey) -> Self {
    Self {
      key,
      status: QueryStatus::Idle,
      data: None,
      error: None,
      updated_at: None,
      version: 0,
      in_flight: None,
      subscribers: BTreeMap::new(),
      gc: None,
    }
  }

  pub fn snapshot(&self) -> QuerySnapshot {
    QuerySnapshot {
      status: self.status,
      data: self.data.clone(),
      error: self.error.clone(),
      updated_at: self.updated_at,
      version: self.version,
    }
  }

  /// Fetches start only from Idle or Stale, and never alongside another.
  pub fn can_start_fetch(&self) -> bool {
    self.in_flight.is_none() && matches!(self.status, QueryStatus::Idle | QueryStatus::Stale)
  }

  /// A new subscriber also retries an entry whose last fetch failed.
  pub fn wants_fetch_on_subscribe(&self) -> bool {
    self.can_start_fetch() || (self.in_flight.is_none() && self.status.is_error())
  }

  pub fn is_observed(&self) -> bool {
    !self.subscribers.is_empty()
  }

  pub fn is_collectable(&self) -> bool {
    !self.is_observed() && self.in_flight.is_none()
  }

  pub fn cancel_gc(&mut self) {
    if let Some(handle) = self.gc.take() {
      handle.abort();
    }
  }

  /// Record a state change and capture it for the current subscribers.
  pub fn notification(&mut self) -> Notification {
    self.version += 1;
    Notification::new(self.snapshot(), self.subscribers.values().cloned().collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pagination::PageRequest;

  fn entry() -> CacheEntry {
    CacheEntry::new(QueryKey::domains(PageRequest::new(1, 25).unwrap()))
  }

  #[test]
  fn test_new_entry_is_idle() {
    let entry = entry();
    let snap = entry.snapshot();
    assert_eq!(snap.status, QueryStatus::Idle);
    assert!(snap.data().is_none());
    assert!(snap.error_message().is_none());
    assert!(entry.can_start_fetch());
  }

  #[test]
  fn test_fetch_policy() {
    let mut entry = entry();

    entry.status = QueryStatus::Fresh;
    assert!(!entry.can_start_fetch());
    assert!(!entry.wants_fetch_on_subscribe());

    entry.status = QueryStatus::Stale;
    assert!(entry.can_start_fetch());

    entry.status = QueryStatus::Errored;
    assert!(!entry.can_start_fetch());
    assert!(entry.wants_fetch_on_subscribe());
  }

  #[test]
  fn test_notification_bumps_version() {
    let mut entry = entry();
    let before = entry.snapshot();

    entry.status = QueryStatus::Stale;
    let _ = entry.notification();
    let after = entry.snapshot();

    assert_eq!(after.version, before.version + 1);
    assert!(after.is_newer_than(&before));
    assert!(!before.is_newer_than(&after));
  }
}
