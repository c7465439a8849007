//! Observers around each dispatch attempt.

use std::time::Duration;
use tracing::{debug, warn};

use super::error::ApiError;
use super::transport::{HttpRequest, HttpResponse};

/// Hook invoked before and after every transport call, including retries.
///
/// Interceptors observe; they cannot alter the request or the outcome.
pub trait Interceptor: Send + Sync {
  fn on_request(&self, _request: &HttpRequest) {}

  fn on_response(
    &self,
    _request: &HttpRequest,
    _outcome: &Result<HttpResponse, ApiError>,
    _elapsed: Duration,
  ) {
  }
}

/// Records every call through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
  fn on_request(&self, request: &HttpRequest) {
    debug!("--> {} {}", request.method, request.url);
  }

  fn on_response(
    &self,
    request: &HttpRequest,
    outcome: &Result<HttpResponse, ApiError>,
    elapsed: Duration,
  ) {
    match outcome {
      Ok(response) => debug!(
        "<-- {} {} {} ({}ms)",
        response.status,
        request.method,
        request.url,
        elapsed.as_millis()
      ),
      Err(e) => warn!(
        "<-- {} {} failed after {}ms: {}",
        request.method,
        request.url,
        elapsed.as_millis(),
        e
      ),
    }
  }
}
