//! Storage layer for the Scrypo projector.
//!
//! This module provides database operations for:
//! - Profiles (current state, last write wins) with an R*Tree location index
//! - Messages (append-only, deduplicated by id)
//! - Sync state (resume cursor)
//!
//! Block writes go through [`ProjectionTx`] so a block's effects and its
//! cursor advance commit together. The database runs in WAL mode; readers on
//! other pool connections only ever see committed blocks.

use anyhow::{Context, Result};
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use scrypo_core::Felt;
use sqlx::Transaction;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub mod cursor;
pub mod message;
pub mod pending;
pub mod profile;
pub mod types;

pub use pending::PendingRevert;
pub use types::*;

/// Default wait on a locked database.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database storage for the projector.
///
/// Provides async access to SQLite database with connection pooling.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance with the given database URL.
    ///
    /// The database file is created if it does not exist. Call
    /// [`Storage::run_migrations`] before use.
    ///
    /// # Arguments
    /// * `database_url` - SQLite database URL (e.g., "sqlite://scrypo.db")
    /// * `max_connections` - Pool upper bound (default 5)
    /// * `min_connections` - Pool lower bound (default 1)
    ///
    /// # Example
    /// ```no_run
    /// # use scrypo_indexer::storage::Storage;
    /// # async fn example() -> anyhow::Result<()> {
    /// let storage = Storage::new("sqlite://scrypo.db", None, None).await?;
    /// storage.run_migrations().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        Self::with_busy_timeout(
            database_url,
            max_connections,
            min_connections,
            DEFAULT_BUSY_TIMEOUT,
        )
        .await
    }

    /// Like [`Storage::new`], with how long a write waits on a locked
    /// database before failing.
    pub async fn with_busy_timeout(
        database_url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        busy_timeout: Duration,
    ) -> Result<Self> {
        info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.unwrap_or(5))
            .min_connections(min_connections.unwrap_or(1))
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Create a new storage instance with a specific file path.
    pub async fn new_with_path<P: AsRef<Path>>(
        path: P,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
    ) -> Result<Self> {
        let database_url = format!("sqlite://{}", path.as_ref().display());
        Self::new(&database_url, max_connections, min_connections).await
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Migrations completed successfully");

        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction for one block's writes.
    pub async fn begin(&self) -> Result<ProjectionTx> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(ProjectionTx { tx })
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection");
        self.pool.close().await;
    }

    /// Get database statistics.
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let profile_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles")
            .fetch_one(&self.pool)
            .await?;

        let message_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;

        let cursor = self.load_cursor().await?;

        Ok(DatabaseStats {
            profile_count: profile_count as u64,
            message_count: message_count as u64,
            last_block_number: cursor.map(|c| c.block_number),
        })
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Database health check failed")?;

        Ok(())
    }
}

/// An open write transaction.
///
/// Dropping it without [`ProjectionTx::commit`] rolls everything back.
pub struct ProjectionTx {
    tx: Transaction<'static, Sqlite>,
}

impl ProjectionTx {
    /// Upsert a profile inside this transaction.
    pub async fn upsert_profile(&mut self, record: &ProfileRecord) -> Result<()> {
        profile::upsert(&mut self.tx, record).await
    }

    /// Append a message inside this transaction.
    ///
    /// Returns `false` when the id already exists.
    pub async fn append_message(&mut self, record: &MessageRecord) -> Result<bool> {
        message::append(&mut self.tx, record).await
    }

    /// Save the current row for `address` before pending block
    /// `pending_block` first overwrites it.
    pub async fn snapshot_profile(&mut self, pending_block: u64, address: &Felt) -> Result<()> {
        pending::snapshot_profile(&mut self.tx, pending_block, address).await
    }

    /// Undo an earlier pending application of `block_number`, keeping the
    /// messages listed in `keep`.
    ///
    /// Returns `None` when the cursor is not pending on that block.
    pub async fn revert_pending_block(
        &mut self,
        block_number: u64,
        keep: &HashSet<String>,
    ) -> Result<Option<PendingRevert>> {
        pending::revert_block(&mut self.tx, block_number, keep).await
    }

    /// Advance the cursor inside this transaction.
    pub async fn save_cursor(&mut self, cursor: &Cursor) -> Result<()> {
        cursor::save(&mut self.tx, cursor).await
    }

    /// Commit all writes.
    pub async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("Failed to commit transaction")?;
        Ok(())
    }

    /// Discard all writes.
    pub async fn rollback(self) -> Result<()> {
        debug!("Rolling back transaction");
        self.tx
            .rollback()
            .await
            .context("Failed to roll back transaction")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrypo_core::{Felt, GeoPoint, PublicKeyFelts};
    use tempfile::NamedTempFile;

    async fn setup_storage() -> (Storage, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let storage = Storage::new_with_path(temp_db.path(), None, None)
            .await
            .unwrap();
        storage.run_migrations().await.unwrap();
        (storage, temp_db)
    }

    fn sample_profile(address: u64) -> ProfileRecord {
        ProfileRecord {
            address: Felt::from_u64(address),
            name: "alice".to_string(),
            tags: Default::default(),
            location: GeoPoint::new(2.3522, 48.8566),
            pubkey: PublicKeyFelts::new(Felt::from_u64(1), Felt::from_u64(2)).unwrap(),
            block_number: 10,
            tx_hash: Felt::from_u64(0xaa),
        }
    }

    #[tokio::test]
    async fn test_storage_creation() {
        let (storage, _temp_db) = setup_storage().await;

        storage.health_check().await.unwrap();

        storage.close().await;
    }

    #[tokio::test]
    async fn test_database_stats() {
        let (storage, _temp_db) = setup_storage().await;

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.profile_count, 0);
        assert_eq!(stats.message_count, 0);
        assert_eq!(stats.last_block_number, None);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_projection_tx_commit() {
        let (storage, _temp_db) = setup_storage().await;

        let mut tx = storage.begin().await.unwrap();
        tx.upsert_profile(&sample_profile(1)).await.unwrap();
        tx.save_cursor(&Cursor::new(10, Felt::from_u64(0x10), Finality::Accepted))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.profile_count, 1);
        assert_eq!(stats.last_block_number, Some(10));

        storage.close().await;
    }

    #[tokio::test]
    async fn test_readers_do_not_see_open_block() {
        let (storage, _temp_db) = setup_storage().await;

        let mut tx = storage.begin().await.unwrap();
        tx.upsert_profile(&sample_profile(1)).await.unwrap();
        tx.append_message(&MessageRecord {
            id: MessageRecord::message_id(10, &Felt::from_u64(0xaa), 0),
            sender: Felt::from_u64(1),
            recipient: Felt::from_u64(2),
            payload: vec![Felt::ZERO],
            block_number: 10,
            tx_hash: Felt::from_u64(0xaa),
            event_index: 0,
            timestamp: 0,
        })
        .await
        .unwrap();
        tx.save_cursor(&Cursor::new(10, Felt::from_u64(0x10), Finality::Accepted))
            .await
            .unwrap();

        // Other pool connections still see the state before the block.
        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.profile_count, 0);
        assert_eq!(stats.message_count, 0);
        assert_eq!(stats.last_block_number, None);
        assert!(storage
            .get_profile(&Felt::from_u64(1))
            .await
            .unwrap()
            .is_none());
        assert!(storage
            .messages_by_recipient(&Felt::from_u64(2))
            .await
            .unwrap()
            .is_empty());

        tx.commit().await.unwrap();

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.profile_count, 1);
        assert_eq!(stats.message_count, 1);
        assert_eq!(stats.last_block_number, Some(10));

        storage.close().await;
    }

    #[tokio::test]
    async fn test_projection_tx_rollback_leaves_nothing() {
        let (storage, _temp_db) = setup_storage().await;

        let mut tx = storage.begin().await.unwrap();
        tx.upsert_profile(&sample_profile(1)).await.unwrap();
        tx.save_cursor(&Cursor::new(10, Felt::from_u64(0x10), Finality::Accepted))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        {
            let mut dropped = storage.begin().await.unwrap();
            dropped.upsert_profile(&sample_profile(2)).await.unwrap();
        }

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.profile_count, 0);
        assert_eq!(stats.last_block_number, None);
        assert!(storage
            .profiles_in_bounding_box(&scrypo_core::BoundingBox::new(-180.0, -90.0, 180.0, 90.0).unwrap())
            .await
            .unwrap()
            .is_empty());

        storage.close().await;
    }
}
