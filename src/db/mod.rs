//! Embedded SQLite session persisted as a snapshot in a key-value store.
//!
//! A [`DatabaseSession`] owns one in-memory SQLite connection. On
//! [`initialize`](DatabaseSession::initialize) the connection is rebuilt from
//! the snapshot stored under [`STORAGE_KEY`], or created fresh with the
//! baseline schema. Every successful mutation outside an explicit transaction
//! writes a new snapshot back; inside a transaction the write happens on
//! commit.

pub mod schema;
mod snapshot;
mod value;

use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::storage::{KeyValueStore, StorageError};

pub use value::Row;

/// Key the snapshot is persisted under.
pub const STORAGE_KEY: &str = "sqlite-db";

/// Table name to its rows, as produced by export and consumed by import.
pub type TableDump = BTreeMap<String, Vec<Row>>;

#[derive(Debug, Error)]
pub enum DbError {
  #[error("Database not initialized")]
  NotInitialized,
  #[error(transparent)]
  Sqlite(#[from] rusqlite::Error),
  #[error(transparent)]
  Storage(#[from] StorageError),
  #[error("snapshot error: {0}")]
  Snapshot(String),
  #[error("snapshot I/O error: {0}")]
  Io(#[from] std::io::Error),
  #[error("database lock poisoned")]
  LockPoisoned,
}

/// Outcome of a mutating statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
  pub last_insert_rowid: i64,
  pub changes: usize,
}

/// One SQLite database plus the store its snapshots go to.
pub struct DatabaseSession {
  store: Arc<dyn KeyValueStore>,
  conn: Mutex<Option<Connection>>,
}

impl DatabaseSession {
  /// Create a closed session. Call [`initialize`](Self::initialize) before use.
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self {
      store,
      conn: Mutex::new(None),
    }
  }

  /// Open the session, restoring the persisted snapshot if there is one.
  /// Does nothing when already open.
  pub fn initialize(&self) -> Result<(), DbError> {
    let mut guard = self.lock()?;
    if guard.is_some() {
      return Ok(());
    }

    let conn = match self.store.get(STORAGE_KEY)? {
      Some(encoded) => {
        let conn = snapshot::decode(&encoded).map_err(|e| {
          error!(error = %e, "Failed to restore database snapshot");
          e
        })?;
        info!(bytes = encoded.len(), "Restored database from snapshot");
        conn
      }
      None => {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::SCHEMA).map_err(|e| {
          error!(error = %e, "Failed to create baseline schema");
          e
        })?;
        self.persist(&conn)?;
        info!("Created new database with baseline schema");
        conn
      }
    };

    *guard = Some(conn);
    Ok(())
  }

  pub fn is_ready(&self) -> bool {
    self.conn.lock().map(|g| g.is_some()).unwrap_or(false)
  }

  /// Release the connection. Later calls fail with
  /// [`DbError::NotInitialized`] until the session is initialized again.
  pub fn close(&self) -> Result<(), DbError> {
    if let Some(conn) = self.lock()?.take() {
      conn.close().map_err(|(_, e)| e)?;
      debug!("Database session closed");
    }
    Ok(())
  }

  /// Run a statement and collect every row it yields.
  pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
    self.with_conn(|conn| query_rows(conn, sql, params).map_err(|e| engine_error("Query", sql, e)))
  }

  /// Run a mutating statement. The snapshot is saved straight away unless a
  /// transaction is open.
  pub fn run(&self, sql: &str, params: &[Value]) -> Result<RunResult, DbError> {
    self.with_conn(|conn| {
      let result = execute(conn, sql, params).map_err(|e| engine_error("Run", sql, e))?;
      if conn.is_autocommit() {
        self.persist(conn)?;
      }
      Ok(result)
    })
  }

  pub fn begin_transaction(&self) -> Result<(), DbError> {
    self.with_conn(|conn| {
      conn
        .execute_batch("BEGIN TRANSACTION")
        .map_err(|e| engine_error("Begin", "BEGIN TRANSACTION", e))
    })
  }

  /// Commit the open transaction and save the snapshot.
  pub fn commit(&self) -> Result<(), DbError> {
    self.with_conn(|conn| {
      conn
        .execute_batch("COMMIT")
        .map_err(|e| engine_error("Commit", "COMMIT", e))?;
      self.persist(conn)
    })
  }

  pub fn rollback(&self) -> Result<(), DbError> {
    self.with_conn(|conn| {
      conn
        .execute_batch("ROLLBACK")
        .map_err(|e| engine_error("Rollback", "ROLLBACK", e))
    })
  }

  /// User table names, sorted.
  pub fn tables(&self) -> Result<Vec<String>, DbError> {
    self.with_conn(|conn| list_tables(conn).map_err(|e| engine_error("Tables", "sqlite_master", e)))
  }

  /// `PRAGMA table_info` rows for `table`.
  pub fn table_info(&self, table: &str) -> Result<Vec<Row>, DbError> {
    let sql = format!("PRAGMA table_info({})", quote_ident(table));
    self.query(&sql, &[])
  }

  /// Every user table with all of its rows.
  pub fn export_to_json(&self) -> Result<TableDump, DbError> {
    self.with_conn(|conn| {
      let mut dump = TableDump::new();
      for table in list_tables(conn)? {
        let sql = format!("SELECT * FROM {}", quote_ident(&table));
        let rows = query_rows(conn, &sql, &[]).map_err(|e| engine_error("Export", &sql, e))?;
        dump.insert(table, rows);
      }
      Ok(dump)
    })
  }

  /// Replace the contents of every table named in `data` with its rows.
  ///
  /// Runs as one transaction; any failure leaves the database untouched.
  /// Columns are taken from the first row of each table, and later rows
  /// missing one of them insert NULL.
  pub fn import_from_json(&self, data: &TableDump) -> Result<(), DbError> {
    self.with_conn(|conn| {
      let tx = conn.transaction()?;
      for (table, rows) in data {
        let table_ident = quote_ident(table);
        let delete = format!("DELETE FROM {}", table_ident);
        tx.execute(&delete, [])
          .map_err(|e| engine_error("Import", &delete, e))?;

        let Some(first) = rows.first() else {
          continue;
        };
        let columns: Vec<&String> = first.keys().collect();
        let insert = format!(
          "INSERT INTO {} ({}) VALUES ({})",
          table_ident,
          columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", "),
          vec!["?"; columns.len()].join(", ")
        );
        let mut stmt = tx
          .prepare(&insert)
          .map_err(|e| engine_error("Import", &insert, e))?;
        for row in rows {
          let values = columns
            .iter()
            .map(|c| value::to_sql(row.get(*c).unwrap_or(&Value::Null)));
          stmt
            .execute(params_from_iter(values))
            .map_err(|e| engine_error("Import", &insert, e))?;
        }
      }
      tx.commit()?;
      info!(tables = data.len(), "Imported database contents");
      self.persist(conn)
    })
  }

  /// Delete every row from every user table in one transaction.
  pub fn clear_database(&self) -> Result<(), DbError> {
    self.with_conn(|conn| {
      let tx = conn.transaction()?;
      for table in list_tables(&tx)? {
        let sql = format!("DELETE FROM {}", quote_ident(&table));
        tx.execute(&sql, [])
          .map_err(|e| engine_error("Clear", &sql, e))?;
      }
      tx.commit()?;
      self.persist(conn)
    })
  }

  /// Length of the persisted snapshot string, 0 when nothing is stored.
  pub fn database_size(&self) -> Result<usize, DbError> {
    Ok(self.store.get(STORAGE_KEY)?.map_or(0, |s| s.len()))
  }

  /// Write the current database to the store.
  pub fn save_to_storage(&self) -> Result<(), DbError> {
    self.with_conn(|conn| self.persist(conn))
  }

  // ==========================================================================
  // Internal helpers
  // ==========================================================================

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Connection>>, DbError> {
    self.conn.lock().map_err(|_| DbError::LockPoisoned)
  }

  fn with_conn<T>(
    &self,
    f: impl FnOnce(&mut Connection) -> Result<T, DbError>,
  ) -> Result<T, DbError> {
    let mut guard = self.lock()?;
    let conn = guard.as_mut().ok_or(DbError::NotInitialized)?;
    f(conn)
  }

  fn persist(&self, conn: &Connection) -> Result<(), DbError> {
    let encoded = snapshot::encode(conn).map_err(|e| {
      error!(error = %e, "Failed to save database to storage");
      e
    })?;
    self.store.set(STORAGE_KEY, &encoded)?;
    debug!(bytes = encoded.len(), "Database snapshot saved");
    Ok(())
  }
}

fn engine_error(op: &str, sql: &str, e: impl Into<DbError>) -> DbError {
  let e = e.into();
  error!(op, sql, error = %e, "Database operation failed");
  e
}

fn query_rows(conn: &Connection, sql: &str, params: &[Value]) -> rusqlite::Result<Vec<Row>> {
  let mut stmt = conn.prepare(sql)?;
  let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
  let mut rows = stmt.query(params_from_iter(params.iter().map(value::to_sql)))?;

  let mut out = Vec::new();
  while let Some(row) = rows.next()? {
    let mut record = Row::new();
    for (i, name) in columns.iter().enumerate() {
      record.insert(name.clone(), value::from_sql(row.get_ref(i)?));
    }
    out.push(record);
  }
  Ok(out)
}

fn execute(conn: &Connection, sql: &str, params: &[Value]) -> rusqlite::Result<RunResult> {
  let changes = conn.execute(sql, params_from_iter(params.iter().map(value::to_sql)))?;
  Ok(RunResult {
    last_insert_rowid: conn.last_insert_rowid(),
    changes,
  })
}

fn list_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
  let mut stmt = conn.prepare(
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
  )?;
  let names = stmt.query_map([], |row| row.get(0))?;
  names.collect()
}

fn quote_ident(name: &str) -> String {
  format!("\"{}\"", name.replace('"', "\"\""))
}
