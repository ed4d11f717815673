//! Undo log for blocks committed while pending.
//!
//! A pending block is applied again on every poll until it is accepted, and
//! its content may change in between. Before a pending block first
//! overwrites a profile, the prior row is copied to `pending_profile_undo`.
//! Re-applying the block restores those rows and drops its messages that the
//! new version no longer carries, so the result equals applying the latest
//! version alone.

use std::collections::HashSet;

use super::profile::{self, row_to_profile_record};
use super::Finality;
use anyhow::{Context, Result};
use scrypo_core::Felt;
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use tracing::debug;

/// What [`revert_block`] undid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingRevert {
    /// Profiles restored to their pre-block state (or removed)
    pub profiles_restored: u64,
    /// Messages no longer present in the block
    pub messages_removed: u64,
}

/// Record the current row for `address` unless block `pending_block`
/// already did.
pub(crate) async fn snapshot_profile(
    conn: &mut SqliteConnection,
    pending_block: u64,
    address: &Felt,
) -> Result<()> {
    let address = address.to_hex();

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO pending_profile_undo (
            pending_block, address, existed, name, tags0, tags1, tags2, tags3,
            longitude, latitude, pubkey_hi, pubkey_lo, block_number, tx_hash
        )
        SELECT ?, address, 1, name, tags0, tags1, tags2, tags3,
               longitude, latitude, pubkey_hi, pubkey_lo, block_number, tx_hash
        FROM profiles
        WHERE address = ?
        "#,
    )
    .bind(pending_block as i64)
    .bind(&address)
    .execute(&mut *conn)
    .await
    .context("Failed to snapshot profile")?;

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO pending_profile_undo (pending_block, address, existed)
        SELECT ?, ?, 0
        WHERE NOT EXISTS (SELECT 1 FROM profiles WHERE address = ?)
        "#,
    )
    .bind(pending_block as i64)
    .bind(&address)
    .bind(&address)
    .execute(&mut *conn)
    .await
    .context("Failed to snapshot missing profile")?;

    Ok(())
}

/// Undo the earlier pending application of `block_number`.
///
/// Does nothing unless the cursor sits on `block_number` as pending.
/// Messages of the block whose ids are in `keep` stay in place.
pub(crate) async fn revert_block(
    conn: &mut SqliteConnection,
    block_number: u64,
    keep: &HashSet<String>,
) -> Result<Option<PendingRevert>> {
    let cursor = sqlx::query("SELECT block_number, finality FROM sync_state WHERE id = 1")
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch sync state")?;

    let pending_here = cursor.is_some_and(|row| {
        row.get::<i64, _>("block_number") as u64 == block_number
            && row.get::<String, _>("finality") == Finality::Pending.as_str()
    });
    if !pending_here {
        return Ok(None);
    }

    let mut revert = PendingRevert::default();

    let snapshots = sqlx::query(
        r#"
        SELECT address, existed, name, tags0, tags1, tags2, tags3,
               longitude, latitude, pubkey_hi, pubkey_lo, block_number, tx_hash
        FROM pending_profile_undo
        WHERE pending_block = ?
        "#,
    )
    .bind(block_number as i64)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to load profile snapshots")?;

    for row in snapshots {
        if row.get::<i64, _>("existed") == 1 {
            let record = row_to_profile_record(row)?;
            profile::upsert(conn, &record).await?;
        } else {
            let address: String = row.get("address");
            profile::delete(conn, &address).await?;
        }
        revert.profiles_restored += 1;
    }

    sqlx::query("DELETE FROM pending_profile_undo WHERE pending_block = ?")
        .bind(block_number as i64)
        .execute(&mut *conn)
        .await
        .context("Failed to clear profile snapshots")?;

    let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM messages WHERE block_number = ?")
        .bind(block_number as i64)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list block messages")?;

    for id in ids.iter().filter(|id| !keep.contains(*id)) {
        sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to remove message {}", id))?;
        revert.messages_removed += 1;
    }

    debug!(
        "Reverted pending block {}: {} profiles restored, {} messages removed",
        block_number, revert.profiles_restored, revert.messages_removed
    );

    Ok(Some(revert))
}

#[cfg(test)]
mod tests {
    use super::super::{Cursor, MessageRecord, ProfileRecord, Storage};
    use super::*;
    use alloy_primitives::U256;
    use scrypo_core::{GeoPoint, PublicKeyFelts};
    use tempfile::NamedTempFile;

    async fn setup_storage() -> (Storage, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let storage = Storage::new_with_path(temp_db.path(), None, None)
            .await
            .unwrap();
        storage.run_migrations().await.unwrap();
        (storage, temp_db)
    }

    fn profile(address: u64, name: &str, block_number: u64) -> ProfileRecord {
        ProfileRecord {
            address: Felt::from_u64(address),
            name: name.to_string(),
            tags: [U256::from(1u64), U256::ZERO, U256::ZERO, U256::ZERO],
            location: GeoPoint::new(10.0, 20.0),
            pubkey: PublicKeyFelts::new(Felt::from_u64(1), Felt::from_u64(2)).unwrap(),
            block_number,
            tx_hash: Felt::from_u64(block_number),
        }
    }

    fn message(block_number: u64, event_index: u64) -> MessageRecord {
        let tx_hash = Felt::from_u64(0x77);
        MessageRecord {
            id: MessageRecord::message_id(block_number, &tx_hash, event_index),
            sender: Felt::from_u64(1),
            recipient: Felt::from_u64(2),
            payload: vec![Felt::ZERO],
            block_number,
            tx_hash,
            event_index,
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_revert_restores_and_removes() {
        let (storage, _temp_db) = setup_storage().await;
        storage.upsert_profile(&profile(1, "settled", 9)).await.unwrap();

        // Block 10 applied as pending: overwrites 1, creates 2, adds two messages.
        let mut tx = storage.begin().await.unwrap();
        for record in [profile(1, "pending", 10), profile(2, "new", 10)] {
            tx.snapshot_profile(10, &record.address).await.unwrap();
            tx.upsert_profile(&record).await.unwrap();
        }
        // A second write in the same block keeps the first snapshot.
        tx.snapshot_profile(10, &Felt::from_u64(1)).await.unwrap();
        tx.upsert_profile(&profile(1, "pending2", 10)).await.unwrap();
        tx.append_message(&message(10, 0)).await.unwrap();
        tx.append_message(&message(10, 1)).await.unwrap();
        tx.save_cursor(&Cursor::new(10, Felt::ZERO, Finality::Pending))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let keep: HashSet<String> = [message(10, 0).id].into_iter().collect();
        let mut tx = storage.begin().await.unwrap();
        let revert = tx.revert_pending_block(10, &keep).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            revert,
            Some(PendingRevert {
                profiles_restored: 2,
                messages_removed: 1,
            })
        );
        assert_eq!(
            storage.get_profile(&Felt::from_u64(1)).await.unwrap(),
            Some(profile(1, "settled", 9))
        );
        assert!(storage.get_profile(&Felt::from_u64(2)).await.unwrap().is_none());
        assert!(storage.get_message(&message(10, 0).id).await.unwrap().is_some());
        assert!(storage.get_message(&message(10, 1).id).await.unwrap().is_none());

        let index_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profile_locations")
            .fetch_one(storage.pool())
            .await
            .unwrap();
        assert_eq!(index_rows, 1);
        let undo_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_profile_undo")
            .fetch_one(storage.pool())
            .await
            .unwrap();
        assert_eq!(undo_rows, 0);

        storage.close().await;
    }

    #[tokio::test]
    async fn test_revert_skipped_unless_cursor_pending_on_block() {
        let (storage, _temp_db) = setup_storage().await;
        storage.append_message(&message(10, 0)).await.unwrap();

        let mut tx = storage.begin().await.unwrap();
        assert_eq!(
            tx.revert_pending_block(10, &HashSet::new()).await.unwrap(),
            None
        );
        tx.rollback().await.unwrap();

        storage
            .save_cursor(&Cursor::new(10, Felt::from_u64(5), Finality::Accepted))
            .await
            .unwrap();
        let mut tx = storage.begin().await.unwrap();
        assert_eq!(
            tx.revert_pending_block(10, &HashSet::new()).await.unwrap(),
            None
        );
        tx.rollback().await.unwrap();

        assert!(storage.get_message(&message(10, 0).id).await.unwrap().is_some());

        storage.close().await;
    }
}
