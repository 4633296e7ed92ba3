//! Page/limit handling for the domain collection.
//!
//! Consumers address pages 1-based; the service is queried with `limit` and
//! `offset`. This module is the only place that translates between the two.

use crate::api::ApiError;

/// A validated request for one page of the collection.
///
/// Part of the cache key: two requests for the same page with different
/// limits are distinct and cached independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageRequest {
  page: u32,
  limit: u32,
}

impl PageRequest {
  /// Create a request for `page` (1-based) holding at most `limit` items.
  pub fn new(page: u32, limit: u32) -> Result<Self, ApiError> {
    if page == 0 {
      return Err(ApiError::invalid_input("Page numbers start at 1"));
    }
    if limit == 0 {
      return Err(ApiError::invalid_input("Page size must be greater than zero"));
    }
    Ok(Self { page, limit })
  }

  pub fn page(&self) -> u32 {
    self.page
  }

  pub fn limit(&self) -> u32 {
    self.limit
  }

  /// Number of items preceding this page.
  pub fn offset(&self) -> u64 {
    u64::from(self.page - 1) * u64::from(self.limit)
  }

  /// Whether a page after this one exists, given a `total` from the same fetch.
  pub fn has_next(&self, total: u64) -> bool {
    self.offset() + u64::from(self.limit) < total
  }

  /// The following page with the same limit.
  pub fn next(&self) -> Self {
    Self {
      page: self.page.saturating_add(1),
      limit: self.limit,
    }
  }

  /// The preceding page, if any.
  pub fn prev(&self) -> Option<Self> {
    (self.page > 1).then(|| Self {
      page: self.page - 1,
      limit: self.limit,
    })
  }
}

/// Number of pages needed to show `total` items at `limit` per page.
pub fn page_count(total: u64, limit: u32) -> u64 {
  if limit == 0 {
    return 0;
  }
  total.div_ceil(u64::from(limit))
}
