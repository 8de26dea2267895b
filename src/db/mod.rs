pub mod schema;

use chrono::{DateTime, NaiveDateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// A queued submission as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRow {
  pub id: i64,
  /// JSON payload
  pub payload: String,
  pub queued_at: DateTime<Utc>,
}

/// Database connection wrapper for the submission queue
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the database at `path`
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let db = Self {
      conn: Mutex::new(conn),
    };
    db.run_migrations()?;

    Ok(db)
  }

  /// Run database migrations
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Append a payload to the queue, returning its id
  pub fn enqueue(&self, payload: &str) -> Result<i64> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT INTO submission_queue (payload) VALUES (?)",
        params![payload],
      )
      .map_err(|e| eyre!("Failed to queue submission: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  /// All queued payloads, oldest first
  pub fn queued(&self) -> Result<Vec<QueuedRow>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT id, payload, queued_at FROM submission_queue ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
        ))
      })
      .map_err(|e| eyre!("Failed to read submission queue: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read queued submission: {}", e))?;

    rows
      .into_iter()
      .map(|(id, payload, queued_at)| {
        let queued_at = NaiveDateTime::parse_from_str(&queued_at, "%Y-%m-%d %H:%M:%S")
          .map(|dt| dt.and_utc())
          .map_err(|e| eyre!("Failed to parse datetime '{}': {}", queued_at, e))?;
        Ok(QueuedRow {
          id,
          payload,
          queued_at,
        })
      })
      .collect()
  }

  /// Remove a payload. Returns whether it was present.
  pub fn remove(&self, id: i64) -> Result<bool> {
    let removed = self
      .lock()?
      .execute("DELETE FROM submission_queue WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove submission {}: {}", id, e))?;

    Ok(removed > 0)
  }
}
