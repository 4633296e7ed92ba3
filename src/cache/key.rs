use crate::pagination::PageRequest;
use std::fmt;

/// Resource name of the domain collection.
pub const DOMAINS: &str = "domains";

/// Identity of one cached page: resource name plus the full pagination
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
  resource: &'static str,
  request: PageRequest,
}

impl QueryKey {
  pub fn new(resource: &'static str, request: PageRequest) -> Self {
    Self { resource, request }
  }

  /// Key for a page of the domain collection.
  pub fn domains(request: PageRequest) -> Self {
    Self::new(DOMAINS, request)
  }

  pub fn resource(&self) -> &'static str {
    self.resource
  }

  pub fn request(&self) -> PageRequest {
    self.request
  }

  /// Whether an invalidation of `resource` covers this key.
  pub fn belongs_to(&self, resource: &str) -> bool {
    self.resource == resource
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}:page={}:limit={}",
      self.resource,
      self.request.page(),
      self.request.limit()
    )
  }
}
