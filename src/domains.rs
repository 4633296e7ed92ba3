//! Consumer-facing API for the domain dashboard.
//!
//! Page queries read through the shared cache; mutations go straight to the
//! service and, only when they succeed, invalidate every cached domain page.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::api::{ApiError, DomainApi, DomainClient, DomainRecord};
use crate::cache::{
  CacheOptions, QueryCache, QueryKey, QuerySnapshot, QueryStatus, Subscription, DOMAINS,
};
use crate::config::Config;
use crate::pagination::PageRequest;
use crate::toast::{Severity, ToastQueue};

/// Process-wide synchronization state: the page cache and the toast queue.
///
/// Cloning shares both. Tests construct isolated instances with `new`.
pub struct DomainsService<A: DomainApi = DomainClient> {
  api: Arc<A>,
  cache: QueryCache<A>,
  toasts: ToastQueue,
  page_size: u32,
}

impl<A: DomainApi> Clone for DomainsService<A> {
  fn clone(&self) -> Self {
    Self {
      api: Arc::clone(&self.api),
      cache: self.cache.clone(),
      toasts: self.toasts.clone(),
      page_size: self.page_size,
    }
  }
}

impl DomainsService<DomainClient> {
  /// Build the HTTP-backed service described by `config`.
  pub fn from_config(config: &Config) -> Result<Self, ApiError> {
    let client = DomainClient::new(&config.api_url(), config.request_timeout())?;
    Ok(Self::new(
      Arc::new(client),
      config.cache_options(),
      ToastQueue::new(config.toast_timeout()),
      config.page_size,
    ))
  }
}

impl<A: DomainApi> DomainsService<A> {
  pub fn new(api: Arc<A>, options: CacheOptions, toasts: ToastQueue, page_size: u32) -> Self {
    Self {
      cache: QueryCache::with_options(Arc::clone(&api), options),
      api,
      toasts,
      page_size,
    }
  }

  pub fn cache(&self) -> &QueryCache<A> {
    &self.cache
  }

  pub fn toasts(&self) -> &ToastQueue {
    &self.toasts
  }

  /// Configured default number of domains per page.
  pub fn page_size(&self) -> u32 {
    self.page_size
  }

  /// Subscribe to one page of domains.
  ///
  /// The returned query follows the cache entry until it is dropped.
  pub fn use_domains_page(&self, page: u32, limit: u32) -> Result<PageQuery, ApiError> {
    let request = PageRequest::new(page, limit)?;
    let key = QueryKey::domains(request);

    let (tx, rx) = watch::channel(QuerySnapshot::default());
    let tx = Arc::new(tx);
    let listener_tx = Arc::clone(&tx);
    let subscription = self.cache.subscribe(key, move |snapshot| {
      publish_if_newer(&listener_tx, snapshot);
    });
    publish_if_newer(&tx, &subscription.snapshot());

    Ok(PageQuery {
      request,
      subscription,
      rx,
    })
  }

  /// Add a domain. On success every cached domain page is invalidated; on
  /// failure the cache is left untouched and the error is returned.
  pub async fn add_domain(&self, name: &str) -> Result<DomainRecord, ApiError> {
    let name = name.trim();
    if name.is_empty() {
      let err = ApiError::invalid_input("Domain name cannot be empty");
      self.toasts.enqueue(err.message(), Severity::Error);
      return Err(err);
    }

    match self.api.create_domain(name).await {
      Ok(record) => {
        info!(domain = %record.domain_name, "domain added");
        self.cache.invalidate(DOMAINS);
        self.toasts.enqueue(
          format!("Domain {} added", record.domain_name),
          Severity::Success,
        );
        Ok(record)
      }
      Err(err) => {
        self.toasts.enqueue(err.message(), Severity::Error);
        Err(err)
      }
    }
  }

  /// Ask the service to re-resolve all domains, then invalidate on success.
  pub async fn trigger_refresh(&self) -> Result<(), ApiError> {
    match self.api.trigger_refresh().await {
      Ok(()) => {
        info!("domain refresh triggered");
        self.cache.invalidate(DOMAINS);
        self.toasts.enqueue("Domains refreshed", Severity::Success);
        Ok(())
      }
      Err(err) => {
        self.toasts.enqueue(err.message(), Severity::Error);
        Err(err)
      }
    }
  }

  pub fn enqueue_toast(&self, message: impl Into<String>, severity: Severity) -> u64 {
    self.toasts.enqueue(message, severity)
  }

  pub fn dismiss_toast(&self, id: u64) -> bool {
    self.toasts.dismiss(id)
  }
}

/// Replace the published snapshot unless it already holds a later state.
fn publish_if_newer(tx: &watch::Sender<QuerySnapshot>, snapshot: &QuerySnapshot) {
  tx.send_if_modified(|current| {
    if snapshot.is_newer_than(current) {
      *current = snapshot.clone();
      true
    } else {
      false
    }
  });
}

/// A live view of one page of domains.
#[derive(Debug)]
pub struct PageQuery {
  request: PageRequest,
  subscription: Subscription,
  rx: watch::Receiver<QuerySnapshot>,
}

impl PageQuery {
  pub fn request(&self) -> PageRequest {
    self.request
  }

  pub fn snapshot(&self) -> QuerySnapshot {
    self.rx.borrow().clone()
  }

  pub fn status(&self) -> QueryStatus {
    self.rx.borrow().status
  }

  /// Wait for the next state change. `None` once the cache is gone.
  pub async fn changed(&mut self) -> Option<QuerySnapshot> {
    self.rx.changed().await.ok()?;
    Some(self.rx.borrow_and_update().clone())
  }

  /// Wait until the page is Fresh or Errored.
  pub async fn settled(&mut self) -> QuerySnapshot {
    loop {
      let snapshot = self.rx.borrow_and_update().clone();
      if snapshot.status.is_fresh() || snapshot.status.is_error() {
        return snapshot;
      }
      if self.rx.changed().await.is_err() {
        return snapshot;
      }
    }
  }

  pub fn unsubscribe(self) {
    self.subscription.unsubscribe();
  }
}
