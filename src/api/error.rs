//! Error type surfaced by the API client.
//!
//! Transport problems (network, timeout, non-2xx status) share a single kind
//! so the retry loop treats them identically. Status and code are recovered
//! from an `HTTP <status>: <text>` message when the transport did not set
//! them itself.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static HTTP_STATUS_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"HTTP (\d+):").expect("valid status regex"));

/// Broad classification of an API failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// Network unreachable, timeout, or non-2xx status
  Transport,
  /// Response body was not valid JSON
  Serialization,
  /// The request itself could not be built (bad base URL or path)
  InvalidRequest,
}

/// Failure of an API call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
  pub kind: ErrorKind,
  pub message: String,
  /// HTTP status, when known
  pub status: Option<u16>,
  /// Numeric error code; mirrors `status` for HTTP failures
  pub code: Option<i64>,
}

impl ApiError {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
      status: None,
      code: None,
    }
  }

  /// Network-level failure reported by a transport.
  pub fn network(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Transport, message)
  }

  /// The call did not complete within `timeout_ms`.
  pub fn timeout(timeout_ms: u128) -> Self {
    Self::new(
      ErrorKind::Transport,
      format!("Request timed out after {}ms", timeout_ms),
    )
  }

  /// Non-2xx response.
  pub fn http(status: u16, status_text: &str) -> Self {
    Self {
      kind: ErrorKind::Transport,
      message: format!("HTTP {}: {}", status, status_text),
      status: Some(status),
      code: Some(i64::from(status)),
    }
  }

  pub fn serialization(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Serialization, message)
  }

  pub fn invalid_request(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::InvalidRequest, message)
  }

  /// Shape an error for the caller once retries are exhausted.
  ///
  /// The message is kept verbatim. If it contains `HTTP <digits>:` and no
  /// status was recorded, status and code are filled from it.
  pub fn into_final(mut self) -> Self {
    if self.message.is_empty() {
      self.message = "Unknown error occurred".to_string();
    }
    if self.status.is_none() {
      if let Some(code) = parse_http_status(&self.message) {
        self.status = u16::try_from(code).ok();
        self.code = Some(code);
      }
    }
    self
  }
}

/// Find the first `HTTP <digits>:` in `message` and return the digits.
pub fn parse_http_status(message: &str) -> Option<i64> {
  HTTP_STATUS_RE
    .captures(message)
    .and_then(|caps| caps[1].parse().ok())
}
