//! Request and response shapes used by the API client.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use super::headers::Headers;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
  Patch,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
      Method::Patch => "PATCH",
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Ordered query parameters. Null values are skipped when the URL is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(Vec<(String, Value)>);

impl QueryParams {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.push(key, value);
    self
  }

  pub fn push(&mut self, key: impl Into<String>, value: impl Into<Value>) {
    self.0.push((key.into(), value.into()));
  }

  /// Push only when `value` is present.
  pub fn push_opt<V: Into<Value>>(&mut self, key: impl Into<String>, value: Option<V>) {
    if let Some(value) = value {
      self.push(key, value);
    }
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Key/value pairs as they will appear in the query string.
  pub fn encoded_pairs(&self) -> Vec<(&str, String)> {
    self
      .0
      .iter()
      .filter_map(|(k, v)| coerce_query_value(v).map(|v| (k.as_str(), v)))
      .collect()
  }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for QueryParams {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
  }
}

/// String form of a query value, or `None` for null.
fn coerce_query_value(value: &Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::String(s) => Some(s.clone()),
    Value::Bool(b) => Some(b.to_string()),
    Value::Number(n) => Some(n.to_string()),
    Value::Array(items) => Some(
      items
        .iter()
        .map(|item| coerce_query_value(item).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(","),
    ),
    Value::Object(_) => Some(value.to_string()),
  }
}

/// A file attached to a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
  /// Form field name
  pub field: String,
  pub file_name: String,
  pub mime_type: Option<String>,
  pub bytes: Vec<u8>,
}

impl FilePart {
  pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
    Self {
      field: "file".to_string(),
      file_name: file_name.into(),
      mime_type: None,
      bytes,
    }
  }

  pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
    self.mime_type = Some(mime_type.into());
    self
  }
}

/// Outgoing request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
  Json(Value),
  Multipart(Vec<FilePart>),
}

impl RequestBody {
  /// Text used for the cache key.
  pub fn cache_repr(&self) -> String {
    match self {
      RequestBody::Json(value) => value.to_string(),
      RequestBody::Multipart(_) => "{}".to_string(),
    }
  }
}

/// Per-call behaviour overrides. Unset fields fall back to client defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
  /// Headers layered over the client defaults for this call only
  pub headers: Headers,
  /// Header names dropped from the merged set for this call only
  pub remove_headers: Vec<String>,
  pub cache: bool,
  pub cache_ttl: Option<Duration>,
  pub timeout: Option<Duration>,
  pub retry: Option<u32>,
  pub retry_delay: Option<Duration>,
}

impl RequestOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Enable caching with the given lifetime.
  pub fn cached(ttl: Duration) -> Self {
    Self {
      cache: true,
      cache_ttl: Some(ttl),
      ..Self::default()
    }
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.set(name, value);
    self
  }

  pub fn without_header(mut self, name: impl Into<String>) -> Self {
    self.remove_headers.push(name.into());
    self
  }

  pub fn cache(mut self, enabled: bool) -> Self {
    self.cache = enabled;
    self
  }

  pub fn cache_ttl(mut self, ttl: Duration) -> Self {
    self.cache_ttl = Some(ttl);
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn retry(mut self, retry: u32) -> Self {
    self.retry = Some(retry);
    self
  }

  pub fn retry_delay(mut self, delay: Duration) -> Self {
    self.retry_delay = Some(delay);
    self
  }
}

/// Everything needed to issue one call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
  pub method: Method,
  pub path: String,
  pub params: QueryParams,
  pub body: Option<RequestBody>,
  pub options: RequestOptions,
}

impl RequestDescriptor {
  pub fn new(method: Method, path: impl Into<String>) -> Self {
    Self {
      method,
      path: path.into(),
      params: QueryParams::new(),
      body: None,
      options: RequestOptions::default(),
    }
  }

  pub fn params(mut self, params: QueryParams) -> Self {
    self.params = params;
    self
  }

  pub fn json(mut self, body: Value) -> Self {
    self.body = Some(RequestBody::Json(body));
    self
  }

  pub fn body(mut self, body: Option<RequestBody>) -> Self {
    self.body = body;
    self
  }

  pub fn options(mut self, options: RequestOptions) -> Self {
    self.options = options;
    self
  }
}

/// Normalized result of any call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
  pub data: Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub code: Option<i64>,
  pub success: bool,
  pub timestamp: DateTime<Utc>,
}

impl ResponseEnvelope {
  /// Wrap a parsed response body.
  ///
  /// `data` is the body's `data` field when present and non-null, otherwise
  /// the whole body. `success` is false only when the body says so. `code`
  /// falls back to the HTTP status.
  pub fn from_body(body: Value, status: u16, timestamp: DateTime<Utc>) -> Self {
    let message = body
      .get("message")
      .and_then(Value::as_str)
      .map(String::from);
    let code = body
      .get("code")
      .and_then(Value::as_i64)
      .or(Some(i64::from(status)));
    let success = body.get("success") != Some(&Value::Bool(false));

    let data = match body.get("data") {
      Some(data) if !data.is_null() => data.clone(),
      _ => body,
    };

    Self {
      data,
      message,
      code,
      success,
      timestamp,
    }
  }

  /// Deserialize `data` into a concrete type.
  pub fn data_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
    T::deserialize(&self.data)
  }
}
