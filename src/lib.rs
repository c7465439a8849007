//! HTTP API client with response caching and retries, and an embedded SQLite
//! session persisted as snapshots in a key-value store.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod logging;
pub mod storage;

pub use api::{ApiClient, ApiError, RequestOptions, ResponseEnvelope};
pub use config::Config;
pub use db::{DatabaseSession, DbError};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
