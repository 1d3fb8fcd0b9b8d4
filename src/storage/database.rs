// Catalog Core - Library catalog storage
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Database connection and management
//!
//! This module handles database connection pooling, initialization, and maintenance.
//!
//! # SQLite Configuration
//! - WAL mode for better concurrency
//! - Foreign keys enabled (required for `ON DELETE RESTRICT`)
//! - Normal synchronous mode (balance safety/speed)
//!
//! # Write Transactions
//! Repository writes go through [`WriteTransaction`], which opens with
//! `BEGIN IMMEDIATE`. The write lock is taken before the first read, so
//! concurrent writers queue on the busy timeout and then see each other's rows.

use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use sqlx::{
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    ConnectOptions, Sqlite, SqliteConnection,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Database manager - handles connection pooling and operations
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: Option<PathBuf>, // None for in-memory databases
}

impl Database {
    /// Open (or create) a database file with default pool settings
    ///
    /// # Errors
    /// Returns error if the parent directory can't be created, the file can't be
    /// opened, or migrations fail.
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        Self::connect(&CatalogConfig::new(database_path.as_ref())).await
    }

    /// Open (or create) the database described by `config`
    pub async fn connect(config: &CatalogConfig) -> Result<Self> {
        config.validate()?;
        let path = config.database_path.as_path();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CatalogError::FileIoError(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let connection_string = format!("sqlite://{}?mode=rwc", path.display());
        let connect_opts = SqliteConnectOptions::from_str(&connection_string)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout())
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.busy_timeout())
            .connect_with(connect_opts)
            .await?;

        let db = Self {
            pool,
            path: Some(path.to_path_buf()),
        };
        db.migrate().await?;

        info!(path = %path.display(), "opened catalog database");

        Ok(db)
    }

    /// Create in-memory database for testing
    pub async fn new_in_memory() -> Result<Self> {
        let connect_opts = SqliteConnectOptions::from_str("sqlite::memory:")?
            .foreign_keys(true)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .disable_statement_logging();

        // Each in-memory connection is its own database, so keep exactly one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_opts)
            .await?;

        let db = Self { pool, path: None };
        db.migrate().await?;

        Ok(db)
    }

    /// Run database migrations
    ///
    /// Migrations are run automatically when opening a database.
    pub async fn migrate(&self) -> Result<()> {
        crate::storage::migrations::run_migrations(&self.pool)
            .await
            .map_err(|e| CatalogError::MigrationFailed(e.to_string()))?;

        Ok(())
    }

    /// Get reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a write transaction on this database
    pub async fn begin_write(&self) -> Result<WriteTransaction> {
        WriteTransaction::begin(&self.pool).await
    }

    /// Get database file path
    ///
    /// Returns `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close database and release all connections
    pub async fn close(self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    /// Vacuum database to reclaim unused space
    pub async fn vacuum(&self) -> Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        debug!("vacuumed catalog database");
        Ok(())
    }

    /// Get database statistics
    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;

        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;

        let freelist_count: i64 = sqlx::query_scalar("PRAGMA freelist_count")
            .fetch_one(&self.pool)
            .await?;

        Ok(DatabaseStats {
            page_count: page_count as u64,
            page_size: page_size as u64,
            freelist_count: freelist_count as u64,
            total_size: (page_count * page_size) as u64,
            unused_size: (freelist_count * page_size) as u64,
        })
    }

    /// Checkpoint WAL file to main database
    pub async fn checkpoint(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Export database to file
    ///
    /// Creates a copy of the database at the specified path.
    /// Automatically checkpoints WAL before export.
    ///
    /// # Errors
    /// Returns error if:
    /// - Source database path is unknown (in-memory database)
    /// - Checkpoint fails
    /// - File copy fails
    pub async fn export<P: AsRef<Path>>(&self, output_path: P) -> Result<()> {
        let source_path = self.path.as_ref().ok_or_else(|| {
            CatalogError::InvalidState("Cannot export in-memory database".to_string())
        })?;

        self.checkpoint().await?;

        std::fs::copy(source_path, output_path.as_ref()).map_err(|e| {
            CatalogError::FileIoError(format!(
                "Failed to export database to {}: {}",
                output_path.as_ref().display(),
                e
            ))
        })?;

        info!(target_path = %output_path.as_ref().display(), "exported catalog database");

        Ok(())
    }

    /// Check database integrity
    ///
    /// Runs SQLite integrity check plus a foreign key check and returns true
    /// if both are clean.
    pub async fn check_integrity(&self) -> Result<bool> {
        let result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&self.pool)
            .await?;

        let fk_violations = sqlx::query("PRAGMA foreign_key_check")
            .fetch_all(&self.pool)
            .await?;

        Ok(result == "ok" && fk_violations.is_empty())
    }
}

/// A pooled connection inside `BEGIN IMMEDIATE`
///
/// Finish with [`commit`](Self::commit), [`rollback`](Self::rollback) or
/// [`finish`](Self::finish). Dropping an unfinished transaction rolls it back
/// on a spawned task before the connection goes back to the pool.
pub struct WriteTransaction {
    conn: Option<PoolConnection<Sqlite>>,
}

impl WriteTransaction {
    /// Acquire a connection and take the database write lock
    ///
    /// Waits up to the configured busy timeout while another writer holds the lock.
    pub async fn begin(pool: &SqlitePool) -> Result<Self> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        Ok(Self { conn: Some(conn) })
    }

    /// Connection to run the transaction's statements on
    pub fn connection(&mut self) -> Result<&mut SqliteConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| CatalogError::InvalidState("write transaction already finished".to_string()))
    }

    pub async fn commit(mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
            if let Err(rollback_err) = rollback_connection(conn).await {
                warn!(error = %rollback_err, "rollback after failed commit failed");
            }
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        match self.conn.take() {
            Some(conn) => rollback_connection(conn).await,
            None => Ok(()),
        }
    }

    /// Commit on `Ok`, roll back on `Err`, and hand the outcome back
    pub async fn finish<T>(self, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

impl Drop for WriteTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = rollback_connection(conn).await {
                            warn!(error = %e, "rollback of dropped write transaction failed");
                        }
                    });
                }
                // Closing the connection rolls the transaction back
                Err(_) => drop(conn.detach()),
            }
        }
    }
}

async fn rollback_connection(mut conn: PoolConnection<Sqlite>) -> Result<()> {
    match sqlx::query("ROLLBACK").execute(&mut *conn).await {
        Ok(_) => Ok(()),
        // SQLite already ended the transaction on its own
        Err(sqlx::Error::Database(db)) if db.message().contains("no transaction is active") => Ok(()),
        Err(e) => {
            // Never pool a connection that may still hold the write lock
            drop(conn.detach());
            Err(e.into())
        }
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    /// Total number of pages in database
    pub page_count: u64,
    /// Size of each page in bytes
    pub page_size: u64,
    /// Number of free pages (unused space)
    pub freelist_count: u64,
    /// Total size of database (page_count * page_size)
    pub total_size: u64,
    /// Unused space (freelist_count * page_size)
    pub unused_size: u64,
}

impl DatabaseStats {
    /// Get percentage of unused space
    pub fn unused_percentage(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            (self.unused_size as f64 / self.total_size as f64) * 100.0
        }
    }

    /// Check if vacuum is recommended (>20% unused space)
    pub fn should_vacuum(&self) -> bool {
        self.unused_percentage() > 20.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new_in_memory().await.expect("Failed to create in-memory database");

        let result: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(db.pool())
            .await
            .expect("Failed to query database");

        assert_eq!(result, 1);
        assert!(db.path().is_none());
    }

    #[tokio::test]
    async fn test_database_stats() {
        let db = Database::new_in_memory().await.expect("Failed to create database");
        let stats = db.get_stats().await.expect("Failed to get stats");

        assert!(stats.page_size > 0);
        assert!(stats.page_count > 0);
    }

    #[tokio::test]
    async fn test_integrity_check() {
        let db = Database::new_in_memory().await.expect("Failed to create database");
        let is_ok = db.check_integrity().await.expect("Failed to check integrity");

        assert!(is_ok, "Database integrity check failed");
    }

    #[tokio::test]
    async fn test_write_transaction_commit_and_rollback() {
        let db = Database::new_in_memory().await.expect("Failed to create database");

        let mut tx = db.begin_write().await.expect("Failed to begin");
        sqlx::query("INSERT INTO Languages (name) VALUES ('Latin')")
            .execute(tx.connection().unwrap())
            .await
            .unwrap();
        tx.rollback().await.expect("Failed to roll back");

        let mut tx = db.begin_write().await.expect("Failed to begin");
        sqlx::query("INSERT INTO Languages (name) VALUES ('Greek')")
            .execute(tx.connection().unwrap())
            .await
            .unwrap();
        tx.commit().await.expect("Failed to commit");

        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM Languages")
            .fetch_all(db.pool())
            .await
            .unwrap();
        assert_eq!(names, ["Greek"]);
    }

    #[tokio::test]
    async fn test_dropped_write_transaction_rolls_back() {
        let db = Database::new_in_memory().await.expect("Failed to create database");

        {
            let mut tx = db.begin_write().await.expect("Failed to begin");
            sqlx::query("INSERT INTO Languages (name) VALUES ('Latin')")
                .execute(tx.connection().unwrap())
                .await
                .unwrap();
        }

        // Waits for the spawned rollback to hand the single connection back
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Languages")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_finish_rolls_back_on_error() {
        let db = Database::new_in_memory().await.expect("Failed to create database");

        let mut tx = db.begin_write().await.expect("Failed to begin");
        sqlx::query("INSERT INTO Languages (name) VALUES ('Latin')")
            .execute(tx.connection().unwrap())
            .await
            .unwrap();
        let outcome: Result<()> = Err(CatalogError::InvalidState("abandon".to_string()));
        assert!(tx.finish(outcome).await.is_err());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Languages")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_export_in_memory_rejected() {
        let db = Database::new_in_memory().await.expect("Failed to create database");
        let err = db.export("/tmp/never-written.db").await.unwrap_err();

        assert!(matches!(err, CatalogError::InvalidState(_)));
    }

    #[test]
    fn test_should_vacuum() {
        let stats = DatabaseStats {
            page_count: 10,
            page_size: 4096,
            freelist_count: 3,
            total_size: 40960,
            unused_size: 12288,
        };
        assert!(stats.should_vacuum());
    }
}
