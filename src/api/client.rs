//! Request engine: URL and header construction, response caching, retries.

use chrono::Duration as ChronoDuration;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::cache::{CacheStats, Clock, SystemClock, TtlCache};

use super::error::ApiError;
use super::headers::{Headers, AUTHORIZATION, CONTENT_TYPE};
use super::interceptor::Interceptor;
use super::retry::RetryPolicy;
use super::transport::{HttpRequest, ReqwestTransport, Transport};
use super::types::{
  FilePart, Method, QueryParams, RequestBody, RequestDescriptor, RequestOptions, ResponseEnvelope,
};

/// Client-wide defaults applied when a call does not override them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
  pub timeout: Duration,
  pub retry: u32,
  pub retry_delay: Duration,
  pub cache_ttl: Duration,
}

impl Default for ClientOptions {
  fn default() -> Self {
    Self {
      timeout: Duration::from_millis(10_000),
      retry: 3,
      retry_delay: Duration::from_millis(1000),
      cache_ttl: Duration::from_secs(5 * 60),
    }
  }
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
  base_url: String,
  headers: Headers,
  options: ClientOptions,
  transport: Option<Arc<dyn Transport>>,
  clock: Arc<dyn Clock>,
  interceptors: Vec<Arc<dyn Interceptor>>,
}

impl ApiClientBuilder {
  /// Extra default headers, layered over `Content-Type: application/json`.
  pub fn headers(mut self, headers: Headers) -> Self {
    self.headers.merge(&headers);
    self
  }

  pub fn options(mut self, options: ClientOptions) -> Self {
    self.options = options;
    self
  }

  pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
    self.transport = Some(transport);
    self
  }

  /// Clock used for cache expiry and envelope timestamps.
  pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
    self.interceptors.push(interceptor);
    self
  }

  pub fn build(self) -> ApiClient {
    let transport = self
      .transport
      .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));

    ApiClient {
      inner: Arc::new(ClientInner {
        base_url: self.base_url,
        default_headers: RwLock::new(self.headers),
        cache: Arc::new(TtlCache::with_clock(self.clock.clone())),
        transport,
        clock: self.clock,
        interceptors: self.interceptors,
        options: self.options,
      }),
    }
  }
}

struct ClientInner {
  base_url: String,
  default_headers: RwLock<Headers>,
  cache: Arc<TtlCache<ResponseEnvelope>>,
  transport: Arc<dyn Transport>,
  clock: Arc<dyn Clock>,
  interceptors: Vec<Arc<dyn Interceptor>>,
  options: ClientOptions,
}

/// HTTP API client with GET caching and exponential-backoff retries.
///
/// Clones share headers and cache. Header changes are visible to the very
/// next call. Concurrent identical cached GETs are not coalesced: each one
/// that misses dispatches on its own.
#[derive(Clone)]
pub struct ApiClient {
  inner: Arc<ClientInner>,
}

impl ApiClient {
  pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
    let mut headers = Headers::new();
    headers.set(CONTENT_TYPE, "application/json");

    ApiClientBuilder {
      base_url: base_url.into(),
      headers,
      options: ClientOptions::default(),
      transport: None,
      clock: Arc::new(SystemClock),
      interceptors: Vec::new(),
    }
  }

  /// Client over `reqwest` with default options.
  pub fn new(base_url: impl Into<String>) -> Self {
    Self::builder(base_url).build()
  }

  pub fn base_url(&self) -> &str {
    &self.inner.base_url
  }

  pub fn options(&self) -> &ClientOptions {
    &self.inner.options
  }

  // ------------------------------------------------------------------
  // Client-wide state
  // ------------------------------------------------------------------

  /// Merge `headers` into the defaults sent with every call.
  pub fn set_default_headers(&self, headers: &Headers) {
    self.inner.default_headers.write().merge(headers);
  }

  pub fn default_headers(&self) -> Headers {
    self.inner.default_headers.read().clone()
  }

  pub fn set_auth_token(&self, token: &str) {
    self
      .inner
      .default_headers
      .write()
      .set(AUTHORIZATION, format!("Bearer {}", token));
  }

  pub fn remove_auth_token(&self) {
    self.inner.default_headers.write().remove(AUTHORIZATION);
  }

  pub fn clear_cache(&self) {
    self.inner.cache.clear();
  }

  /// Drop expired cache entries. Returns how many were removed.
  pub fn clear_expired_cache(&self) -> usize {
    self.inner.cache.clear_expired()
  }

  pub fn cache_stats(&self) -> CacheStats {
    self.inner.cache.stats()
  }

  /// Periodically sweep expired cache entries.
  ///
  /// The task ends on its own once every clone of the client is dropped.
  pub fn spawn_cache_sweeper(&self, period: Duration) -> JoinHandle<()> {
    let cache: Weak<TtlCache<ResponseEnvelope>> = Arc::downgrade(&self.inner.cache);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(period);
      // The first tick completes immediately.
      ticker.tick().await;
      loop {
        ticker.tick().await;
        let Some(cache) = cache.upgrade() else {
          break;
        };
        let removed = cache.clear_expired();
        if removed > 0 {
          debug!("Swept {} expired cache entries", removed);
        }
      }
    })
  }

  // ------------------------------------------------------------------
  // Requests
  // ------------------------------------------------------------------

  /// Issue one call described by `descriptor`.
  pub async fn request(&self, descriptor: RequestDescriptor) -> Result<ResponseEnvelope, ApiError> {
    let RequestDescriptor {
      method,
      path,
      params,
      body,
      options,
    } = descriptor;

    let url = self.build_url(&path, &params).map_err(ApiError::into_final)?;
    let key = cache_key(method, &url, body.as_ref());
    let cacheable = options.cache && method == Method::Get;

    if cacheable {
      if let Some(hit) = self.inner.cache.get(&key) {
        debug!("Cache hit: {}", key);
        return Ok(hit);
      }
      debug!("Cache miss: {}", key);
    }

    let request = HttpRequest {
      method,
      url,
      headers: self.request_headers(&options),
      body: if method == Method::Get { None } else { body },
    };

    let timeout = options.timeout.unwrap_or(self.inner.options.timeout);
    let policy = RetryPolicy::new(
      options.retry.unwrap_or(self.inner.options.retry),
      options
        .retry_delay
        .unwrap_or(self.inner.options.retry_delay),
    );

    let envelope = policy
      .run(|| self.dispatch(request.clone(), timeout))
      .await
      .map_err(ApiError::into_final)?;

    if cacheable {
      let ttl = options.cache_ttl.unwrap_or(self.inner.options.cache_ttl);
      let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX);
      self.inner.cache.set(key, envelope.clone(), ttl);
    }

    Ok(envelope)
  }

  pub async fn get(
    &self,
    path: &str,
    params: QueryParams,
    options: RequestOptions,
  ) -> Result<ResponseEnvelope, ApiError> {
    self
      .request(
        RequestDescriptor::new(Method::Get, path)
          .params(params)
          .options(options),
      )
      .await
  }

  pub async fn post(
    &self,
    path: &str,
    body: Option<Value>,
    options: RequestOptions,
  ) -> Result<ResponseEnvelope, ApiError> {
    self.send_json(Method::Post, path, body, options).await
  }

  pub async fn put(
    &self,
    path: &str,
    body: Option<Value>,
    options: RequestOptions,
  ) -> Result<ResponseEnvelope, ApiError> {
    self.send_json(Method::Put, path, body, options).await
  }

  pub async fn patch(
    &self,
    path: &str,
    body: Option<Value>,
    options: RequestOptions,
  ) -> Result<ResponseEnvelope, ApiError> {
    self.send_json(Method::Patch, path, body, options).await
  }

  pub async fn delete(
    &self,
    path: &str,
    options: RequestOptions,
  ) -> Result<ResponseEnvelope, ApiError> {
    self
      .request(RequestDescriptor::new(Method::Delete, path).options(options))
      .await
  }

  /// POST `file` as multipart form data.
  ///
  /// Any `Content-Type` header is dropped so the transport can set the
  /// multipart boundary itself.
  pub async fn upload(
    &self,
    path: &str,
    file: FilePart,
    mut options: RequestOptions,
  ) -> Result<ResponseEnvelope, ApiError> {
    options.headers.remove(CONTENT_TYPE);
    options.remove_headers.push(CONTENT_TYPE.to_string());

    self
      .request(
        RequestDescriptor::new(Method::Post, path)
          .body(Some(RequestBody::Multipart(vec![file])))
          .options(options),
      )
      .await
  }

  async fn send_json(
    &self,
    method: Method,
    path: &str,
    body: Option<Value>,
    options: RequestOptions,
  ) -> Result<ResponseEnvelope, ApiError> {
    self
      .request(
        RequestDescriptor::new(method, path)
          .body(body.map(RequestBody::Json))
          .options(options),
      )
      .await
  }

  // ------------------------------------------------------------------
  // Internals
  // ------------------------------------------------------------------

  /// Resolve `path` against the base URL and append non-null params.
  ///
  /// The base URL's path is treated as a directory, so a relative `path`
  /// lands beneath it (`.../api` + `users` is `.../api/users`). A path
  /// starting with `/` replaces the base path and keeps only the origin.
  fn build_url(&self, path: &str, params: &QueryParams) -> Result<Url, ApiError> {
    let base = &self.inner.base_url;
    let mut url = if base.is_empty() {
      Url::parse(path)
    } else {
      Url::parse(base).and_then(|mut b| {
        if !b.path().ends_with('/') {
          let dir = format!("{}/", b.path());
          b.set_path(&dir);
        }
        b.join(path)
      })
    }
    .map_err(|e| ApiError::invalid_request(format!("Invalid URL '{}{}': {}", base, path, e)))?;

    let pairs = params.encoded_pairs();
    if !pairs.is_empty() {
      let mut query = url.query_pairs_mut();
      for (key, value) in pairs {
        query.append_pair(key, &value);
      }
    }

    Ok(url)
  }

  fn request_headers(&self, options: &RequestOptions) -> Headers {
    let mut headers = self.inner.default_headers.read().clone();
    headers.merge(&options.headers);
    for name in &options.remove_headers {
      headers.remove(name);
    }
    headers
  }

  /// One attempt: send, enforce the timeout, check status, normalize.
  async fn dispatch(
    &self,
    request: HttpRequest,
    timeout: Duration,
  ) -> Result<ResponseEnvelope, ApiError> {
    for interceptor in &self.inner.interceptors {
      interceptor.on_request(&request);
    }

    let started = Instant::now();
    let outcome = match tokio::time::timeout(timeout, self.inner.transport.send(request.clone())).await
    {
      Ok(outcome) => outcome,
      Err(_) => Err(ApiError::timeout(timeout.as_millis())),
    };

    for interceptor in &self.inner.interceptors {
      interceptor.on_response(&request, &outcome, started.elapsed());
    }

    let response = outcome?;
    if !response.is_success() {
      return Err(ApiError::http(response.status, &response.status_text));
    }

    let body: Value = if response.body.iter().all(u8::is_ascii_whitespace) {
      Value::Null
    } else {
      serde_json::from_slice(&response.body)
        .map_err(|e| ApiError::serialization(format!("Failed to parse response body: {}", e)))?
    };

    Ok(ResponseEnvelope::from_body(
      body,
      response.status,
      self.inner.clock.now(),
    ))
  }
}

/// `METHOD:url:body` signature identifying a cacheable call.
pub fn cache_key(method: Method, url: &Url, body: Option<&RequestBody>) -> String {
  format!(
    "{}:{}:{}",
    method,
    url,
    body.map(RequestBody::cache_repr).unwrap_or_default()
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::error::ErrorKind;
  use crate::api::testing::{json_response, ScriptedTransport};
  use crate::cache::ManualClock;
  use serde_json::json;

  fn client_with(transport: Arc<ScriptedTransport>) -> ApiClient {
    ApiClient::builder("https://api.example.com")
      .transport(transport)
      .build()
  }

  fn no_retry() -> RequestOptions {
    RequestOptions::new().retry(0)
  }

  #[tokio::test]
  async fn test_cached_get_dispatches_once() {
    let transport = Arc::new(
      ScriptedTransport::always(Err(ApiError::network("should not be called again")))
        .then(Ok(json_response(200, json!({"data": [{"id": 1}], "success": true})))),
    );
    let client = client_with(transport.clone());
    let options = RequestOptions::cached(Duration::from_millis(5000));

    let first = client
      .get("/users", QueryParams::new(), options.clone())
      .await
      .unwrap();
    let second = client
      .get("/users", QueryParams::new(), options)
      .await
      .unwrap();

    assert_eq!(transport.call_count(), 1);
    assert_eq!(first.data, json!([{"id": 1}]));
    assert_eq!(first.data, second.data);
    assert!(first.success && second.success);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failing_get_is_attempted_retry_plus_one_times() {
    let transport = Arc::new(ScriptedTransport::always(Err(ApiError::network(
      "Network error",
    ))));
    let client = client_with(transport.clone());

    let err = client
      .get("/fail", QueryParams::new(), RequestOptions::new().retry(2))
      .await
      .unwrap_err();

    assert_eq!(err.message, "Network error");
    assert_eq!(err.kind, ErrorKind::Transport);
    assert_eq!(err.status, None);
    assert_eq!(transport.call_count(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_retry_recovers_on_third_attempt() {
    let transport = Arc::new(
      ScriptedTransport::ok(json!({"data": "third"}))
        .then(Err(ApiError::network("first")))
        .then(Ok(json_response(500, json!({})))),
    );
    let client = client_with(transport.clone());

    let envelope = client
      .get("/flaky", QueryParams::new(), RequestOptions::new().retry(2))
      .await
      .unwrap();

    assert_eq!(envelope.data, json!("third"));
    assert_eq!(transport.call_count(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_http_error_carries_status_after_retries() {
    let transport = Arc::new(ScriptedTransport::always(Ok(json_response(
      404,
      json!({"error": "missing"}),
    ))));
    let client = client_with(transport.clone());

    let err = client
      .get("/missing", QueryParams::new(), RequestOptions::new().retry(1))
      .await
      .unwrap_err();

    assert_eq!(err.message, "HTTP 404: Not Found");
    assert_eq!(err.status, Some(404));
    assert_eq!(err.code, Some(404));
    // Client errors are retried like any other failure.
    assert_eq!(transport.call_count(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_timeout_is_a_transport_failure() {
    let transport = Arc::new(
      ScriptedTransport::ok(json!({"data": 1})).with_latency(Duration::from_secs(30)),
    );
    let client = client_with(transport.clone());

    let err = client
      .get(
        "/slow",
        QueryParams::new(),
        RequestOptions::new()
          .timeout(Duration::from_millis(50))
          .retry(1)
          .retry_delay(Duration::from_millis(10)),
      )
      .await
      .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Transport);
    assert_eq!(err.message, "Request timed out after 50ms");
    assert_eq!(transport.call_count(), 2);
  }

  #[tokio::test]
  async fn test_query_params_are_appended_in_order() {
    let transport = Arc::new(ScriptedTransport::ok(json!({"success": true})));
    let client = client_with(transport.clone());

    let params = QueryParams::new()
      .with("page", 1)
      .with("limit", 10)
      .with("skip", Value::Null);
    client.get("/users", params, no_retry()).await.unwrap();

    let requests = transport.requests();
    assert_eq!(
      requests[0].url.as_str(),
      "https://api.example.com/users?page=1&limit=10"
    );
    assert_eq!(requests[0].method, Method::Get);
  }

  #[tokio::test]
  async fn test_plain_path_has_no_query_string() {
    let transport = Arc::new(ScriptedTransport::ok(json!({})));
    let client = client_with(transport.clone());

    client
      .get("/test", QueryParams::new().with("x", Value::Null), no_retry())
      .await
      .unwrap();
    assert_eq!(transport.requests()[0].url.as_str(), "https://api.example.com/test");
  }

  #[tokio::test]
  async fn test_base_url_path_is_a_prefix_for_relative_paths() {
    for base in ["https://api.example.com/api", "https://api.example.com/api/"] {
      let transport = Arc::new(ScriptedTransport::ok(json!({})));
      let client = ApiClient::builder(base)
        .transport(transport.clone())
        .build();

      client
        .get("users/7", QueryParams::new().with("page", 1), no_retry())
        .await
        .unwrap();
      client.get("/health", QueryParams::new(), no_retry()).await.unwrap();

      let requests = transport.requests();
      assert_eq!(
        requests[0].url.as_str(),
        "https://api.example.com/api/users/7?page=1"
      );
      assert_eq!(requests[1].url.as_str(), "https://api.example.com/health");
    }
  }

  #[tokio::test]
  async fn test_per_call_header_override_is_scoped_to_the_call() {
    let transport = Arc::new(ScriptedTransport::ok(json!({})));
    let client = client_with(transport.clone());
    client.set_default_headers(&[("X-Client", "default")].into_iter().collect());

    client
      .get(
        "/a",
        QueryParams::new(),
        no_retry().header("X-Client", "override"),
      )
      .await
      .unwrap();
    assert_eq!(transport.last_headers().get("X-Client"), Some("override"));

    client.get("/b", QueryParams::new(), no_retry()).await.unwrap();
    assert_eq!(transport.last_headers().get("X-Client"), Some("default"));
    assert_eq!(
      transport.last_headers().get(CONTENT_TYPE),
      Some("application/json")
    );
  }

  #[tokio::test]
  async fn test_auth_token_is_visible_to_the_next_call() {
    let transport = Arc::new(ScriptedTransport::ok(json!({})));
    let client = client_with(transport.clone());

    client.set_auth_token("test-token");
    client.get("/me", QueryParams::new(), no_retry()).await.unwrap();
    assert_eq!(
      transport.last_headers().get(AUTHORIZATION),
      Some("Bearer test-token")
    );

    client.remove_auth_token();
    client.get("/me", QueryParams::new(), no_retry()).await.unwrap();
    assert!(!transport.last_headers().contains(AUTHORIZATION));
  }

  #[tokio::test]
  async fn test_upload_never_sends_json_content_type() {
    let transport = Arc::new(ScriptedTransport::ok(json!({"data": {"url": "/f/1"}})));
    let client = client_with(transport.clone());
    client.set_default_headers(&[("content-type", "application/json")].into_iter().collect());

    let file = FilePart::new("avatar.png", vec![1, 2, 3]).with_mime_type("image/png");
    let envelope = client
      .upload(
        "/files",
        file.clone(),
        no_retry().header(CONTENT_TYPE, "application/json"),
      )
      .await
      .unwrap();

    let request = &transport.requests()[0];
    assert_eq!(request.method, Method::Post);
    assert!(!request.headers.contains(CONTENT_TYPE));
    assert_eq!(request.body, Some(RequestBody::Multipart(vec![file])));
    assert_eq!(envelope.data, json!({"url": "/f/1"}));

    // The client default is untouched.
    assert_eq!(
      client.default_headers().get(CONTENT_TYPE),
      Some("application/json")
    );
  }

  #[tokio::test]
  async fn test_post_sends_body_and_is_never_cached() {
    let transport = Arc::new(ScriptedTransport::ok(json!({"id": 1})));
    let client = client_with(transport.clone());
    let body = json!({"name": "John"});

    for _ in 0..2 {
      client
        .post(
          "/users",
          Some(body.clone()),
          no_retry().cache(true),
        )
        .await
        .unwrap();
    }

    assert_eq!(transport.call_count(), 2);
    assert_eq!(
      transport.requests()[0].body,
      Some(RequestBody::Json(body))
    );
    assert_eq!(client.cache_stats().size, 0);
  }

  #[tokio::test]
  async fn test_get_drops_body_from_dispatch() {
    let transport = Arc::new(ScriptedTransport::ok(json!({})));
    let client = client_with(transport.clone());

    client
      .request(RequestDescriptor::new(Method::Get, "/search").json(json!({"q": 1})))
      .await
      .unwrap();
    assert_eq!(transport.requests()[0].body, None);
  }

  #[tokio::test]
  async fn test_expired_cache_entry_triggers_new_dispatch() {
    let clock = Arc::new(ManualClock::default());
    let transport = Arc::new(ScriptedTransport::ok(json!({"data": 1})));
    let client = ApiClient::builder("https://api.example.com")
      .transport(transport.clone())
      .clock(clock.clone())
      .build();
    let options = RequestOptions::cached(Duration::from_secs(5)).retry(0);

    client.get("/x", QueryParams::new(), options.clone()).await.unwrap();
    clock.advance(ChronoDuration::seconds(4));
    client.get("/x", QueryParams::new(), options.clone()).await.unwrap();
    assert_eq!(transport.call_count(), 1);

    clock.advance(ChronoDuration::seconds(2));
    client.get("/x", QueryParams::new(), options).await.unwrap();
    assert_eq!(transport.call_count(), 2);
  }

  #[tokio::test]
  async fn test_cache_stats_and_clearing() {
    let clock = Arc::new(ManualClock::default());
    let transport = Arc::new(ScriptedTransport::ok(json!({})));
    let client = ApiClient::builder("https://api.example.com")
      .transport(transport.clone())
      .clock(clock.clone())
      .build();

    client
      .get("/short", QueryParams::new(), RequestOptions::cached(Duration::from_secs(1)))
      .await
      .unwrap();
    client
      .get("/long", QueryParams::new(), RequestOptions::cached(Duration::from_secs(60)))
      .await
      .unwrap();

    let stats = client.cache_stats();
    assert_eq!(stats.size, 2);
    assert!(stats
      .keys
      .contains(&"GET:https://api.example.com/short:".to_string()));

    clock.advance(ChronoDuration::seconds(2));
    assert_eq!(client.clear_expired_cache(), 1);
    assert_eq!(client.cache_stats().keys, vec!["GET:https://api.example.com/long:".to_string()]);

    client.clear_cache();
    assert_eq!(client.cache_stats().size, 0);
    assert_eq!(client.default_headers().get(CONTENT_TYPE), Some("application/json"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_identical_gets_are_not_coalesced() {
    let transport = Arc::new(
      ScriptedTransport::ok(json!({"data": 1})).with_latency(Duration::from_millis(100)),
    );
    let client = client_with(transport.clone());
    let options = RequestOptions::cached(Duration::from_secs(60));

    let (a, b) = futures::join!(
      client.get("/users", QueryParams::new(), options.clone()),
      client.get("/users", QueryParams::new(), options.clone()),
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(transport.call_count(), 2);
  }

  #[tokio::test]
  async fn test_invalid_json_is_a_serialization_error() {
    let transport = Arc::new(ScriptedTransport::always(Ok(
      crate::api::transport::HttpResponse {
        status: 200,
        status_text: "OK".to_string(),
        headers: Headers::new(),
        body: b"<html>".to_vec(),
      },
    )));
    let client = client_with(transport);

    let err = client
      .get("/html", QueryParams::new(), no_retry())
      .await
      .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Serialization);
  }

  #[tokio::test]
  async fn test_empty_body_normalizes_to_null_data() {
    let transport = Arc::new(ScriptedTransport::always(Ok(
      crate::api::transport::HttpResponse {
        status: 204,
        status_text: "No Content".to_string(),
        headers: Headers::new(),
        body: Vec::new(),
      },
    )));
    let client = client_with(transport);

    let envelope = client.delete("/users/1", no_retry()).await.unwrap();
    assert_eq!(envelope.data, Value::Null);
    assert_eq!(envelope.code, Some(204));
    assert!(envelope.success);
  }

  #[tokio::test]
  async fn test_invalid_base_url_is_reported() {
    let transport = Arc::new(ScriptedTransport::ok(json!({})));
    let client = ApiClient::builder("not a url")
      .transport(transport.clone())
      .build();

    let err = client
      .get("/x", QueryParams::new(), no_retry())
      .await
      .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidRequest);
    assert_eq!(transport.call_count(), 0);
  }

  #[test]
  fn test_cache_key_distinguishes_method_url_and_body() {
    let url = Url::parse("https://api.example.com/users?page=1").unwrap();
    let other_url = Url::parse("https://api.example.com/users?page=2").unwrap();
    let body = RequestBody::Json(json!({"a": 1}));
    let other_body = RequestBody::Json(json!({"a": 2}));

    let base = cache_key(Method::Get, &url, Some(&body));
    assert_eq!(base, cache_key(Method::Get, &url, Some(&body)));
    assert_eq!(base, r#"GET:https://api.example.com/users?page=1:{"a":1}"#);
    assert_ne!(base, cache_key(Method::Post, &url, Some(&body)));
    assert_ne!(base, cache_key(Method::Get, &other_url, Some(&body)));
    assert_ne!(base, cache_key(Method::Get, &url, Some(&other_body)));
    assert_ne!(base, cache_key(Method::Get, &url, None));
  }

  #[tokio::test(start_paused = true)]
  async fn test_cache_sweeper_removes_expired_entries() {
    let clock = Arc::new(ManualClock::default());
    let transport = Arc::new(ScriptedTransport::ok(json!({})));
    let client = ApiClient::builder("https://api.example.com")
      .transport(transport)
      .clock(clock.clone())
      .build();

    client
      .get("/x", QueryParams::new(), RequestOptions::cached(Duration::from_secs(1)))
      .await
      .unwrap();
    let handle = client.spawn_cache_sweeper(Duration::from_secs(300));

    clock.advance(ChronoDuration::seconds(2));
    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(client.cache_stats().size, 0);

    drop(client);
    tokio::time::sleep(Duration::from_secs(301)).await;
    assert!(handle.is_finished());
  }
}
