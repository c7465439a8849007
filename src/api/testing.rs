//! In-process transport used by the client and service tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

use super::error::ApiError;
use super::headers::Headers;
use super::transport::{HttpRequest, HttpResponse, Transport};

pub fn json_response(status: u16, body: Value) -> HttpResponse {
  HttpResponse {
    status,
    status_text: match status {
      200 => "OK",
      201 => "Created",
      404 => "Not Found",
      500 => "Internal Server Error",
      _ => "",
    }
    .to_string(),
    headers: [("content-type", "application/json")].into_iter().collect(),
    body: body.to_string().into_bytes(),
  }
}

/// Replays queued outcomes in order; once the queue is empty the fallback
/// outcome is returned for every further call.
pub struct ScriptedTransport {
  queue: Mutex<VecDeque<Result<HttpResponse, ApiError>>>,
  fallback: Result<HttpResponse, ApiError>,
  latency: Duration,
  requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
  pub fn always(outcome: Result<HttpResponse, ApiError>) -> Self {
    Self {
      queue: Mutex::new(VecDeque::new()),
      fallback: outcome,
      latency: Duration::ZERO,
      requests: Mutex::new(Vec::new()),
    }
  }

  pub fn ok(body: Value) -> Self {
    Self::always(Ok(json_response(200, body)))
  }

  pub fn then(self, outcome: Result<HttpResponse, ApiError>) -> Self {
    self.queue.lock().push_back(outcome);
    self
  }

  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = latency;
    self
  }

  pub fn requests(&self) -> Vec<HttpRequest> {
    self.requests.lock().clone()
  }

  pub fn call_count(&self) -> usize {
    self.requests.lock().len()
  }

  pub fn last_headers(&self) -> Headers {
    self
      .requests
      .lock()
      .last()
      .map(|r| r.headers.clone())
      .unwrap_or_default()
  }
}

#[async_trait]
impl Transport for ScriptedTransport {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
    self.requests.lock().push(request);
    if !self.latency.is_zero() {
      tokio::time::sleep(self.latency).await;
    }
    let next = self.queue.lock().pop_front();
    next.unwrap_or_else(|| self.fallback.clone())
  }
}
