use rusqlite::Connection;
use std::path::Path;
use tokio::task;
use crate::error::{Result, IngestError};

/// Database connection wrapper
#[derive(Debug, Clone)]
pub struct Db {
    path: std::path::PathBuf,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Open the database, creating its parent directory, and apply pending migrations
    pub async fn open_migrated<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db = Self::new(db_path);
        if let Some(parent) = db.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        db.with_connection(migrate::run_migrations).await?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Execute a closure with a database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut conn = Connection::open(&path)
                .map_err(IngestError::Database)?;

            // WAL for concurrent readers, NORMAL sync for speed
            conn.execute_batch(
                "PRAGMA journal_mode = WAL; \
                 PRAGMA synchronous = NORMAL; \
                 PRAGMA temp_store = MEMORY;"
            )?;

            f(&mut conn)
        })
        .await
        .map_err(|e| IngestError::Io(std::io::Error::other(format!("blocking task failed: {}", e))))?
    }
}

pub mod migrate;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_db_connection() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::new(&db_path);

        let result = db.with_connection(|conn| {
            conn.execute("CREATE TABLE test (id INTEGER PRIMARY KEY)", [])
                .map_err(IngestError::Database)?;
            Ok(())
        }).await;

        assert!(result.is_ok());
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_open_migrated_creates_parent_and_tables() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested/dir/state.db");
        let db = Db::open_migrated(&db_path).await.unwrap();
        assert!(db_path.exists());

        let tables: Vec<String> = db
            .with_connection(|conn| {
                let mut stmt = conn
                    .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(names)
            })
            .await
            .unwrap();
        assert!(tables.contains(&"fingerprints".to_string()));
        assert!(tables.contains(&"vectors".to_string()));
    }
}
