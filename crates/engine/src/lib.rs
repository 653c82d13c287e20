//! Durable grid storage for the world grid overlay.
//!
//! [`Engine`] provisions, replaces and mutates a world's grid and its cells in
//! SQLite. [`connectivity`] answers adjacency, distance and shortest-path
//! queries over walkable cells.

use anyhow::Context;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod connectivity;
mod error;
mod grid;

pub use error::GridError;
pub use grid::{ProvisionPhase, DEFAULT_GRID_HEIGHT, DEFAULT_GRID_WIDTH, MAX_GRID_CELLS};

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

pub(crate) fn new_id(prefix: &str) -> String {
    let c = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{c}", now_ms())
}

#[derive(Debug, Clone)]
pub struct Engine {
    db_path: PathBuf,
}

impl Engine {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn open(&self) -> anyhow::Result<Connection> {
        let path = self.db_path.clone();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create db dir: {}", dir.display()))?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open sqlite db: {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        migrate(&conn)?;
        Ok(conn)
    }

    /// Sequence number of the most recent grid or cell mutation.
    pub fn get_rev(&self) -> anyhow::Result<i64> {
        let conn = self.open()?;
        let rev: Option<i64> =
            conn.query_row("SELECT MAX(seq) FROM event_log", [], |row| row.get(0))?;
        Ok(rev.unwrap_or(0))
    }
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    let v: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if v < 1 {
        conn.execute_batch(
            r#"
-- Monotonic revision source for client sync.
CREATE TABLE IF NOT EXISTS event_log (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  ts_ms INTEGER NOT NULL,
  kind TEXT NOT NULL,
  entity_id TEXT,
  payload_json TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_event_log_ts ON event_log(ts_ms);
CREATE INDEX IF NOT EXISTS idx_event_log_kind ON event_log(kind);

-- home_cell_id holds a sentinel until the cells exist, so it carries no FK.
CREATE TABLE IF NOT EXISTS world_grids (
  id TEXT PRIMARY KEY,
  world_id TEXT NOT NULL UNIQUE,
  width INTEGER NOT NULL,
  height INTEGER NOT NULL,
  home_cell_id TEXT NOT NULL,
  created_at_ms INTEGER NOT NULL,
  updated_at_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS grid_cells (
  id TEXT PRIMARY KEY,
  grid_id TEXT NOT NULL REFERENCES world_grids(id),
  x INTEGER NOT NULL,
  y INTEGER NOT NULL,
  walkable INTEGER NOT NULL DEFAULT 1,
  biome TEXT,
  name TEXT,
  description TEXT,
  tags_json TEXT NOT NULL DEFAULT '[]',
  region_id TEXT,
  updated_at_ms INTEGER NOT NULL,
  UNIQUE (grid_id, x, y)
);

CREATE INDEX IF NOT EXISTS idx_grid_cells_grid_row ON grid_cells(grid_id, y, x);
"#,
        )?;

        conn.pragma_update(None, "user_version", 1_i64)?;
    }

    Ok(())
}

pub(crate) fn append_event_tx(
    tx: &rusqlite::Transaction<'_>,
    kind: &str,
    entity_id: Option<&str>,
    payload: serde_json::Value,
) -> rusqlite::Result<i64> {
    let ts = now_ms();
    let payload_json = payload.to_string();
    tx.execute(
        "INSERT INTO event_log (ts_ms, kind, entity_id, payload_json) VALUES (?1, ?2, ?3, ?4)",
        (ts, kind, entity_id, payload_json),
    )?;
    Ok(tx.last_insert_rowid())
}
