//! Client-side synchronization layer for the domain inventory dashboard.
//!
//! [`DomainsService`] is the entry point: it owns the page cache and the
//! toast queue, and couples mutations to cache invalidation.

pub mod api;
pub mod cache;
pub mod config;
pub mod domains;
pub mod logging;
pub mod pagination;
pub mod toast;

pub use api::{ApiError, DomainApi, DomainClient, DomainRecord, Page};
pub use cache::{QueryCache, QueryKey, QuerySnapshot, QueryStatus};
pub use config::Config;
pub use domains::{DomainsService, PageQuery};
pub use pagination::PageRequest;
pub use toast::{Severity, ToastEntry, ToastQueue};
