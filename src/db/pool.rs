// src/db/pool.rs
// Async connection pool over rusqlite, backed by deadpool-sqlite.
//
// Two access patterns are exposed:
//   - `run` returns `ServerError`, for use directly from tool handlers.
//   - `interact` returns a caller-supplied error type, for internal helpers
//     that want to compose with `?` before the final conversion.

use crate::config::DatabaseConfig;
use crate::error::ServerError;
use deadpool_sqlite::{Config, Hook, Pool, Runtime};
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::{Path, PathBuf};
use std::sync::Once;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

static SQLITE_VEC_INIT: Once = Once::new();

/// Registers the sqlite-vec extension globally. Must run before any
/// connection is opened; idempotent across repeated calls.
#[allow(clippy::missing_transmute_annotations)]
pub(crate) fn ensure_sqlite_vec_registered() {
    SQLITE_VEC_INIT.call_once(|| {
        // SAFETY: sqlite3_vec_init matches the signature sqlite3_auto_extension
        // expects; the transmute only changes the Rust-level function-pointer
        // type, and the symbol is statically linked for the process lifetime.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        }
        tracing::debug!("sqlite-vec extension registered globally");
    });
}

/// Database pool wrapper with sqlite-vec support and per-connection setup.
pub struct DatabasePool {
    pool: Pool,
    path: Option<PathBuf>,
    memory_uri: Option<String>,
}

enum Storage {
    File(PathBuf),
    InMemoryShared,
}

impl DatabasePool {
    /// Open a pool per `config`. A database name containing "test" disables
    /// pooling (single connection, shared in-memory cache) to avoid
    /// cross-test bleed between runs.
    pub async fn open(config: &DatabaseConfig) -> Result<Self, ServerError> {
        let storage = if config.is_test_mode() {
            Storage::InMemoryShared
        } else {
            Storage::File(PathBuf::from(&config.path))
        };
        Self::open_internal(storage, config).await
    }

    async fn open_internal(storage: Storage, config: &DatabaseConfig) -> Result<Self, ServerError> {
        ensure_sqlite_vec_registered();

        let (conn_str, path, memory_uri, hook) = match storage {
            Storage::File(p) => {
                ensure_parent_directory(&p)?;
                let s = p.to_string_lossy().into_owned();
                let hook = make_file_post_create_hook(p.clone());
                (s, Some(p), None, hook)
            }
            Storage::InMemoryShared => {
                let uri = format!("file:sentinel_test_{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
                let hook = make_memory_post_create_hook();
                (uri.clone(), None, Some(uri), hook)
            }
        };

        let max_size = if matches!(storage_kind(&path), StorageKind::InMemory) {
            1
        } else {
            (config.pool_size + config.max_overflow).max(1) as usize
        };

        let cfg = Config::new(&conn_str);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .map_err(|e| ServerError::Pool(e.to_string()))?
            .max_size(max_size)
            .post_create(hook)
            .build()
            .map_err(|e| ServerError::Pool(e.to_string()))?;

        let db_pool = Self {
            pool,
            path,
            memory_uri,
        };

        db_pool
            .interact(|conn| super::schema::run_all_migrations(conn))
            .await?;

        Ok(db_pool)
    }

    /// Shared-cache in-memory URI, used so a second pool (e.g. a fresh
    /// `DatabasePool::open` against the same test database name) observes
    /// the same state.
    pub fn memory_uri(&self) -> Option<&str> {
        self.memory_uri.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a blocking closure against a pooled connection, converting any
    /// error into `ServerError`.
    pub async fn run<F, R, E>(&self, f: F) -> Result<R, ServerError>
    where
        F: FnOnce(&Connection) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<ServerError> + Send + 'static,
    {
        self.pool
            .get()
            .await
            .map_err(ServerError::from)?
            .interact(move |conn| f(conn).map_err(Into::into))
            .await
            .map_err(ServerError::from)?
    }

    /// Like `run`, but for callers that already work in `anyhow::Result`
    /// (migrations, background maintenance).
    pub async fn interact<F, R>(&self, f: F) -> Result<R, ServerError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.run(f).await
    }
}

enum StorageKind {
    File,
    InMemory,
}

fn storage_kind(path: &Option<PathBuf>) -> StorageKind {
    match path {
        Some(_) => StorageKind::File,
        None => StorageKind::InMemory,
    }
}

fn ensure_parent_directory(path: &Path) -> Result<(), ServerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            let mut perms = std::fs::metadata(parent)?.permissions();
            perms.set_mode(0o700);
            std::fs::set_permissions(parent, perms)?;
        }
    }
    Ok(())
}

fn make_file_post_create_hook(path: PathBuf) -> Hook {
    Hook::async_fn(move |conn, _metrics| {
        let path_for_perms = path.clone();
        Box::pin(async move {
            conn.interact(move |conn| {
                setup_connection(conn)?;

                #[cfg(unix)]
                if let Ok(metadata) = std::fs::metadata(&path_for_perms) {
                    let mut perms = metadata.permissions();
                    perms.set_mode(0o600);
                    if let Err(e) = std::fs::set_permissions(&path_for_perms, perms) {
                        tracing::warn!("failed to set database file permissions to 0600: {}", e);
                    }
                }

                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into()))?
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into())
            })
        })
    })
}

fn make_memory_post_create_hook() -> Hook {
    Hook::async_fn(|conn, _metrics| {
        Box::pin(async move {
            conn.interact(|conn| {
                conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into()))?
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into())
            })
        })
    })
}

fn setup_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; \
         PRAGMA foreign_keys=ON; \
         PRAGMA busy_timeout=5000; \
         PRAGMA synchronous=NORMAL;",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_shared_in_memory_pool_for_test_databases() {
        let config = DatabaseConfig {
            path: "sentinel-test.db".to_string(),
            pool_size: 2,
            max_overflow: 0,
            pool_timeout_s: 5,
        };
        let pool = DatabasePool::open(&config).await.expect("pool should open");
        assert!(pool.path().is_none());
        assert!(pool.memory_uri().is_some());

        let count: i64 = pool
            .run(|conn| conn.query_row("SELECT count(*) FROM targets", [], |row| row.get(0)))
            .await
            .expect("targets table should exist after migrations");
        assert_eq!(count, 0);
    }
}
