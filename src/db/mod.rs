// src/db/mod.rs
// Storage layer: connection pool, schema, and the scoped-session primitive
// repositories build on.

pub mod codec;
pub mod pool;
pub mod schema;

use crate::config::DatabaseConfig;
use crate::error::ServerError;
use rusqlite::Connection;
use std::sync::Arc;

pub use pool::DatabasePool;

/// Open the pool and run migrations. Call once at startup.
pub async fn open(config: &DatabaseConfig) -> Result<Arc<DatabasePool>, ServerError> {
    let pool = DatabasePool::open(config).await?;
    Ok(Arc::new(pool))
}

/// A scoped unit of work over one connection: commits on normal exit,
/// rolls back on drop if not explicitly committed.
///
/// Only meaningful inside a `DatabasePool::run`/`interact` closure, which
/// already runs on the blocking pool; `Session` never crosses an await
/// point itself.
pub struct Session<'a> {
    conn: &'a Connection,
    committed: bool,
}

impl<'a> Session<'a> {
    pub fn begin(conn: &'a Connection) -> rusqlite::Result<Self> {
        conn.execute_batch("BEGIN")?;
        Ok(Self {
            conn,
            committed: false,
        })
    }

    pub fn conn(&self) -> &Connection {
        self.conn
    }

    pub fn commit(mut self) -> rusqlite::Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::warn!("rollback failed on session drop: {}", e);
            }
        }
    }
}
