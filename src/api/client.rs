use crate::api::error::ApiError;
use crate::api::types::{ApiErrorBody, CreateDomainRequest, DomainRecord, Page};
use crate::api::DomainApi;
use crate::pagination::PageRequest;
use futures::future::BoxFuture;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const LOAD_FAILED: &str = "Failed to load domains";
const ADD_FAILED: &str = "Failed to add domain";
const REFRESH_FAILED: &str = "Failed to refresh domains";

/// HTTP client for the domain-info service.
///
/// Stateless between calls; cloning shares the underlying connection pool.
#[derive(Clone)]
pub struct DomainClient {
  http: reqwest::Client,
  base: String,
}

impl DomainClient {
  /// Create a client for an already-normalized base URL (e.g.
  /// `http://localhost:8000/api`). Without a `timeout`, requests run until the
  /// service or the connection gives up.
  pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ApiError> {
    let mut builder =
      reqwest::Client::builder().user_agent(concat!("domain-sync/", env!("CARGO_PKG_VERSION")));
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }
    let http = builder.build().map_err(ApiError::network)?;
    Self::from_reqwest(base_url, http)
  }

  /// Create a client around an existing `reqwest::Client`.
  pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, ApiError> {
    Url::parse(base_url)
      .map_err(|e| ApiError::invalid_input(format!("Invalid API URL {}: {}", base_url, e)))?;

    Ok(Self {
      http,
      base: base_url.trim_end_matches('/').to_string(),
    })
  }

  pub fn base_url(&self) -> &str {
    &self.base
  }

  /// URL listing one page of domains.
  pub fn page_url(&self, request: PageRequest) -> Result<Url, ApiError> {
    let mut url = self.endpoint("domain-info/")?;
    url
      .query_pairs_mut()
      .append_pair("limit", &request.limit().to_string())
      .append_pair("offset", &request.offset().to_string());
    Ok(url)
  }

  /// Fetch one page of domains.
  pub async fn fetch_page(&self, request: PageRequest) -> Result<Page, ApiError> {
    let url = self.page_url(request)?;
    debug!(page = request.page(), limit = request.limit(), %url, "fetching domains page");

    let response = self.http.get(url).send().await.map_err(ApiError::network)?;
    let response = check_status(response, LOAD_FAILED).await?;
    decode_json(response).await
  }

  /// Register a new domain.
  pub async fn create_domain(&self, name: &str) -> Result<DomainRecord, ApiError> {
    let name = name.trim();
    if name.is_empty() {
      return Err(ApiError::invalid_input("Domain name cannot be empty"));
    }

    let url = self.endpoint("domain-info/")?;
    debug!(domain = name, "adding domain");

    let response = self
      .http
      .post(url)
      .json(&CreateDomainRequest { domain_name: name })
      .send()
      .await
      .map_err(ApiError::network)?;
    let response = check_status(response, ADD_FAILED).await?;
    decode_json(response).await
  }

  /// Ask the service to re-resolve every stored domain.
  pub async fn trigger_refresh(&self) -> Result<(), ApiError> {
    let url = self.endpoint("domain-info/refresh")?;
    debug!("triggering domain refresh");

    let response = self.http.post(url).send().await.map_err(ApiError::network)?;
    check_status(response, REFRESH_FAILED).await?;
    Ok(())
  }

  fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    let raw = format!("{}/{}", self.base, path);
    Url::parse(&raw).map_err(|e| ApiError::invalid_input(format!("Invalid URL {}: {}", raw, e)))
  }
}

impl DomainApi for DomainClient {
  fn fetch_page(&self, request: PageRequest) -> BoxFuture<'static, Result<Page, ApiError>> {
    let client = self.clone();
    Box::pin(async move { client.fetch_page(request).await })
  }

  fn create_domain(&self, name: &str) -> BoxFuture<'static, Result<DomainRecord, ApiError>> {
    let client = self.clone();
    let name = name.to_string();
    Box::pin(async move { client.create_domain(&name).await })
  }

  fn trigger_refresh(&self) -> BoxFuture<'static, Result<(), ApiError>> {
    let client = self.clone();
    Box::pin(async move { client.trigger_refresh().await })
  }
}

/// Pass through 2xx responses; turn anything else into a `Service` error.
///
/// The message comes from a string `detail` in a JSON body. A JSON body
/// without one yields `fallback`; a non-JSON body yields the status reason.
async fn check_status(response: Response, fallback: &str) -> Result<Response, ApiError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let body = response.bytes().await.unwrap_or_default();
  let message = error_message(status, &body, fallback);
  warn!(status = status.as_u16(), %message, "domain service returned an error");

  Err(ApiError::Service {
    status: status.as_u16(),
    message,
  })
}

fn error_message(status: StatusCode, body: &[u8], fallback: &str) -> String {
  match serde_json::from_slice::<ApiErrorBody>(body) {
    Ok(err) => err
      .detail_message()
      .map(String::from)
      .unwrap_or_else(|| fallback.to_string()),
    Err(_) => status
      .canonical_reason()
      .map(String::from)
      .unwrap_or_else(|| fallback.to_string()),
  }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
  let body = response.bytes().await.map_err(ApiError::network)?;
  serde_json::from_slice(&body).map_err(|e| {
    warn!(error = %e, "malformed response body from domain service");
    ApiError::Decode {
      detail: e.to_string(),
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use wiremock::matchers::{body_json, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  async fn setup() -> (MockServer, DomainClient) {
    let server = MockServer::start().await;
    let base = format!("{}/api", server.uri());
    let client = DomainClient::from_reqwest(&base, reqwest::Client::new()).unwrap();
    (server, client)
  }

  fn record(name: &str) -> serde_json::Value {
    json!({ "domain_name": name, "is_anycast_node": false })
  }

  #[test]
  fn test_page_url_offsets() {
    let client =
      DomainClient::from_reqwest("http://localhost:8000/api", reqwest::Client::new()).unwrap();

    let url = client.page_url(PageRequest::new(1, 25).unwrap()).unwrap();
    assert_eq!(
      url.as_str(),
      "http://localhost:8000/api/domain-info/?limit=25&offset=0"
    );

    let url = client.page_url(PageRequest::new(3, 10).unwrap()).unwrap();
    assert_eq!(
      url.as_str(),
      "http://localhost:8000/api/domain-info/?limit=10&offset=20"
    );
  }

  #[test]
  fn test_rejects_invalid_base() {
    assert!(DomainClient::from_reqwest("not a url", reqwest::Client::new()).is_err());
  }

  #[test]
  fn test_error_message_fallbacks() {
    let msg = error_message(StatusCode::CONFLICT, br#"{"detail":"exists"}"#, ADD_FAILED);
    assert_eq!(msg, "exists");

    let msg = error_message(StatusCode::CONFLICT, br#"{"other":1}"#, ADD_FAILED);
    assert_eq!(msg, ADD_FAILED);

    let msg = error_message(StatusCode::BAD_GATEWAY, b"<html>oops</html>", ADD_FAILED);
    assert_eq!(msg, "Bad Gateway");
  }

  #[tokio::test]
  async fn test_fetch_page_sends_limit_and_offset() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
      .and(path("/api/domain-info/"))
      .and(query_param("limit", "10"))
      .and(query_param("offset", "20"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "items": [record("a.com"), record("b.com")],
        "total": 42,
      })))
      .expect(1)
      .mount(&server)
      .await;

    let page = client
      .fetch_page(PageRequest::new(3, 10).unwrap())
      .await
      .unwrap();

    assert_eq!(page.total, 42);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].domain_name, "a.com");
    assert_eq!(page.items[1].domain_name, "b.com");
  }

  #[tokio::test]
  async fn test_timeout_only_when_configured() {
    let server = MockServer::start().await;
    let base = format!("{}/api", server.uri());

    Mock::given(method("GET"))
      .and(path("/api/domain-info/"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(json!({ "items": [], "total": 0 }))
          .set_delay(Duration::from_millis(300)),
      )
      .mount(&server)
      .await;

    let request = PageRequest::new(1, 25).unwrap();

    let unbounded = DomainClient::new(&base, None).unwrap();
    assert_eq!(unbounded.fetch_page(request).await.unwrap().total, 0);

    let bounded = DomainClient::new(&base, Some(Duration::from_millis(50))).unwrap();
    let err = bounded.fetch_page(request).await.unwrap_err();
    assert!(matches!(err, ApiError::Network { .. }));
  }

  #[tokio::test]
  async fn test_fetch_page_service_error_detail() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
      .and(path("/api/domain-info/"))
      .respond_with(
        ResponseTemplate::new(503).set_body_json(json!({ "detail": "Database unavailable" })),
      )
      .mount(&server)
      .await;

    let err = client
      .fetch_page(PageRequest::new(1, 25).unwrap())
      .await
      .unwrap_err();

    assert_eq!(
      err,
      ApiError::Service {
        status: 503,
        message: "Database unavailable".to_string()
      }
    );
  }

  #[tokio::test]
  async fn test_fetch_page_malformed_success_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
      .and(path("/api/domain-info/"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([record("a.com")])))
      .mount(&server)
      .await;

    let err = client
      .fetch_page(PageRequest::new(1, 25).unwrap())
      .await
      .unwrap_err();

    assert!(matches!(err, ApiError::Decode { .. }));
    assert_eq!(
      err.message(),
      "Received an unexpected response from the server"
    );
  }

  #[tokio::test]
  async fn test_create_domain() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
      .and(path("/api/domain-info/"))
      .and(body_json(json!({ "domain_name": "example.com" })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "domain_name": "example.com",
        "ip_address": "93.184.216.34",
        "is_anycast_node": true,
        "registrar": "ignored",
      })))
      .expect(1)
      .mount(&server)
      .await;

    let created = client.create_domain("  example.com ").await.unwrap();
    assert_eq!(created.domain_name, "example.com");
    assert_eq!(created.ip_address.as_deref(), Some("93.184.216.34"));
    assert!(created.is_anycast_node);
  }

  #[tokio::test]
  async fn test_create_domain_rejects_blank_name() {
    let (server, client) = setup().await;

    let err = client.create_domain("   ").await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_create_domain_non_json_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
      .and(path("/api/domain-info/"))
      .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
      .mount(&server)
      .await;

    let err = client.create_domain("example.com").await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.message(), "Internal Server Error");
  }

  #[tokio::test]
  async fn test_trigger_refresh_empty_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
      .and(path("/api/domain-info/refresh"))
      .respond_with(ResponseTemplate::new(200))
      .expect(1)
      .mount(&server)
      .await;

    client.trigger_refresh().await.unwrap();
  }

  #[tokio::test]
  async fn test_trigger_refresh_error_without_detail() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
      .and(path("/api/domain-info/refresh"))
      .respond_with(ResponseTemplate::new(400).set_body_json(json!({})))
      .mount(&server)
      .await;

    let err = client.trigger_refresh().await.unwrap_err();
    assert_eq!(err.message(), REFRESH_FAILED);
  }

  #[tokio::test]
  async fn test_network_error() {
    // Nothing listens on the discard port.
    let client = DomainClient::from_reqwest("http://127.0.0.1:9/api", reqwest::Client::new())
      .unwrap();

    let err = client
      .fetch_page(PageRequest::new(1, 25).unwrap())
      .await
      .unwrap_err();
    assert!(matches!(err, ApiError::Network { .. }));
    assert!(!err.message().is_empty());
  }
}
