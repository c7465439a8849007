//! HTTP API client.
//!
//! Requests are described by a [`RequestDescriptor`], resolved against the
//! client's base URL and default headers, served from the response cache
//! when possible, and otherwise dispatched through a [`Transport`] under a
//! timeout with exponential-backoff retries. Every successful response is
//! normalized into a [`ResponseEnvelope`].

mod client;
mod error;
mod headers;
mod interceptor;
mod retry;
pub mod services;
#[cfg(test)]
pub(crate) mod testing;
mod transport;
mod types;

pub use client::{cache_key, ApiClient, ApiClientBuilder, ClientOptions};
pub use error::{parse_http_status, ApiError, ErrorKind};
pub use headers::{Headers, AUTHORIZATION, CONTENT_TYPE};
pub use interceptor::{Interceptor, LoggingInterceptor};
pub use retry::RetryPolicy;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
pub use types::{
  FilePart, Method, QueryParams, RequestBody, RequestDescriptor, RequestOptions, ResponseEnvelope,
};
