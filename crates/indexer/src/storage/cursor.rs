//! Sync cursor storage operations.

use super::{Cursor, Finality, Storage};
use anyhow::{Context, Result};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

impl Storage {
    /// Load the resume cursor, `None` before the first committed block.
    pub async fn load_cursor(&self) -> Result<Option<Cursor>> {
        let row = sqlx::query(
            r#"
            SELECT block_number, block_hash, finality, updated_at
            FROM sync_state
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch sync state")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let block_hash: String = row.get("block_hash");
        let finality: String = row.get("finality");

        Ok(Some(Cursor {
            block_number: row.get::<i64, _>("block_number") as u64,
            block_hash: block_hash.parse().context("Invalid stored block hash")?,
            finality: finality
                .parse::<Finality>()
                .map_err(anyhow::Error::msg)?,
            updated_at: row.get("updated_at"),
        }))
    }

    /// Save the cursor outside of a block transaction.
    ///
    /// The projector advances the cursor through
    /// [`super::ProjectionTx::save_cursor`] instead.
    pub async fn save_cursor(&self, cursor: &Cursor) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        save(&mut conn, cursor).await
    }
}

/// Upsert the singleton cursor row on an open connection.
pub(crate) async fn save(conn: &mut SqliteConnection, cursor: &Cursor) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_state (id, block_number, block_hash, finality, updated_at)
        VALUES (1, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            block_number = excluded.block_number,
            block_hash = excluded.block_hash,
            finality = excluded.finality,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(cursor.block_number as i64)
    .bind(cursor.block_hash.to_hex())
    .bind(cursor.finality.as_str())
    .bind(cursor.updated_at)
    .execute(&mut *conn)
    .await
    .context("Failed to update sync state")?;

    Ok(())
}
