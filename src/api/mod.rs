//! Transport boundary to the domain-info service.

mod client;
mod error;
mod types;

pub use client::DomainClient;
pub use error::ApiError;
pub use types::{DomainRecord, Page};

use crate::pagination::PageRequest;
use futures::future::BoxFuture;

/// Operations the synchronization layer needs from the service.
///
/// `DomainClient` is the HTTP implementation; the cache and the facade only
/// see this trait. Returned futures own everything they need so they can be
/// spawned.
pub trait DomainApi: Send + Sync + 'static {
  fn fetch_page(&self, request: PageRequest) -> BoxFuture<'static, Result<Page, ApiError>>;

  fn create_domain(&self, name: &str) -> BoxFuture<'static, Result<DomainRecord, ApiError>>;

  fn trigger_refresh(&self) -> BoxFuture<'static, Result<(), ApiError>>;
}
