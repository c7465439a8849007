//! HTTP transport boundary.
//!
//! The client builds [`HttpRequest`] values and hands them to a [`Transport`]
//! which performs the network round-trip. Status interpretation stays in the
//! client, so a transport returns non-2xx responses as data.

use async_trait::async_trait;
use url::Url;

use super::error::ApiError;
use super::headers::Headers;
use super::types::{FilePart, Method, RequestBody};

/// A fully resolved outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: Method,
  pub url: Url,
  pub headers: Headers,
  pub body: Option<RequestBody>,
}

/// A response as returned by the transport.
#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: u16,
  pub status_text: String,
  pub headers: Headers,
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Something that can execute an [`HttpRequest`].
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// Transport backed by `reqwest`.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_client(client: reqwest::Client) -> Self {
    Self { client }
  }
}

fn reqwest_method(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Delete => reqwest::Method::DELETE,
    Method::Patch => reqwest::Method::PATCH,
  }
}

fn multipart_form(files: Vec<FilePart>) -> Result<reqwest::multipart::Form, ApiError> {
  let mut form = reqwest::multipart::Form::new();
  for file in files {
    let mut part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.file_name);
    if let Some(mime) = file.mime_type {
      part = part
        .mime_str(&mime)
        .map_err(|e| ApiError::invalid_request(format!("Invalid MIME type {}: {}", mime, e)))?;
    }
    form = form.part(file.field, part);
  }
  Ok(form)
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
    let mut builder = self
      .client
      .request(reqwest_method(request.method), request.url);

    for (name, value) in request.headers.iter() {
      builder = builder.header(name, value);
    }

    builder = match request.body {
      Some(RequestBody::Json(value)) => builder.body(value.to_string()),
      Some(RequestBody::Multipart(files)) => builder.multipart(multipart_form(files)?),
      None => builder,
    };

    let response = builder
      .send()
      .await
      .map_err(|e| ApiError::network(e.to_string()))?;

    let status = response.status();
    let headers: Headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| ApiError::network(e.to_string()))?;

    Ok(HttpResponse {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body: body.to_vec(),
    })
  }
}
