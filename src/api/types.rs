//! Serde types matching the domain-info service responses.
//!
//! Unknown fields are ignored and missing optional fields decode to `None`,
//! which means "not yet resolved" rather than "empty".

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// One inventoried domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
  pub domain_name: String,
  #[serde(default)]
  pub ip_address: Option<String>,
  /// Resolved subdomains. Older service versions wrap the list in an object.
  #[serde(
    default,
    deserialize_with = "deserialize_subdomains",
    skip_serializing_if = "Option::is_none"
  )]
  pub subdomains: Option<Vec<String>>,
  /// DNS records keyed by record type (`A`, `MX`, ...).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dns_settings: Option<BTreeMap<String, Vec<String>>>,
  #[serde(default)]
  pub geo_city: Option<String>,
  #[serde(default)]
  pub geo_country: Option<String>,
  #[serde(default)]
  pub network_owner_name: Option<String>,
  pub is_anycast_node: bool,
  #[serde(default)]
  pub is_active: Option<bool>,
}

impl DomainRecord {
  /// Whether any auxiliary resolution data (subdomains or DNS records) has
  /// been resolved for this domain.
  pub fn has_resolution_data(&self) -> bool {
    self.subdomains.is_some() || self.dns_settings.is_some()
  }
}

/// One fetched slice of the domain collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
  /// Items in service order.
  pub items: Vec<DomainRecord>,
  /// Total count across all pages as of fetch time.
  pub total: u64,
}

/// Body sent when adding a domain.
#[derive(Debug, Serialize)]
pub(crate) struct CreateDomainRequest<'a> {
  pub domain_name: &'a str,
}

/// Error body carried by non-2xx responses.
///
/// `detail` is kept as a raw value because validation failures send a list
/// of objects instead of a string.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
  #[serde(default)]
  pub detail: Option<serde_json::Value>,
}

impl ApiErrorBody {
  pub fn detail_message(&self) -> Option<&str> {
    self.detail.as_ref().and_then(|d| d.as_str())
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SubdomainsWire {
  List(Vec<String>),
  Wrapped { subdomains: Vec<String> },
}

fn deserialize_subdomains<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
  D: Deserializer<'de>,
{
  let wire: Option<SubdomainsWire> = Option::deserialize(deserializer)?;
  Ok(wire.map(|w| match w {
    SubdomainsWire::List(list) => list,
    SubdomainsWire::Wrapped { subdomains } => subdomains,
  }))
}
