//! Whole-database snapshots as text-safe strings.
//!
//! The SQLite backup API copies the live database into a scratch file whose
//! bytes are then base64-encoded. Restoring reverses that into a fresh
//! in-memory connection.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rusqlite::{backup::Progress, Connection, DatabaseName};
use std::fs;

use super::DbError;

/// Serialize the main database of `conn` to its file image.
pub fn to_bytes(conn: &Connection) -> Result<Vec<u8>, DbError> {
  let dir = tempfile::tempdir()?;
  let path = dir.path().join("snapshot.db");
  conn.backup(DatabaseName::Main, &path, None)?;
  Ok(fs::read(&path)?)
}

/// Build an in-memory connection holding the database in `bytes`.
pub fn from_bytes(bytes: &[u8]) -> Result<Connection, DbError> {
  let dir = tempfile::tempdir()?;
  let path = dir.path().join("snapshot.db");
  fs::write(&path, bytes)?;

  let mut conn = Connection::open_in_memory()?;
  conn.restore(DatabaseName::Main, &path, None::<fn(Progress)>)?;
  Ok(conn)
}

pub fn encode(conn: &Connection) -> Result<String, DbError> {
  Ok(STANDARD.encode(to_bytes(conn)?))
}

pub fn decode(encoded: &str) -> Result<Connection, DbError> {
  let bytes = STANDARD
    .decode(encoded.trim())
    .map_err(|e| DbError::Snapshot(format!("invalid base64: {}", e)))?;
  from_bytes(&bytes)
}
