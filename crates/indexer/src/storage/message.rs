//! Message storage operations.
//!
//! Messages are append-only. The payload column holds the packed felts as
//! consecutive 32-byte big-endian words, so readers get back exactly what
//! the chain emitted.

use super::{MessageRecord, Storage};
use anyhow::{Context, Result};
use scrypo_core::Felt;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

const WORD_BYTES: usize = 32;

impl Storage {
    /// Append a message unless its id is already present.
    ///
    /// Returns `true` if inserted, `false` for a duplicate (a silent no-op).
    pub async fn append_message(&self, record: &MessageRecord) -> Result<bool> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        append(&mut conn, record).await
    }

    /// Get a message by id.
    pub async fn get_message(&self, id: &str) -> Result<Option<MessageRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, sender, recipient, payload, block_number, tx_hash, event_index, timestamp
            FROM messages
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch message")?;

        row.map(row_to_message_record).transpose()
    }

    /// Messages sent to `recipient`, oldest first.
    ///
    /// Messages not yet projected are simply absent.
    pub async fn messages_by_recipient(&self, recipient: &Felt) -> Result<Vec<MessageRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sender, recipient, payload, block_number, tx_hash, event_index, timestamp
            FROM messages
            WHERE recipient = ?
            ORDER BY block_number ASC, rowid ASC
            "#,
        )
        .bind(recipient.to_hex())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch messages by recipient")?;

        rows.into_iter().map(row_to_message_record).collect()
    }

    /// Messages sent by `sender`, oldest first.
    pub async fn messages_by_sender(&self, sender: &Felt) -> Result<Vec<MessageRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sender, recipient, payload, block_number, tx_hash, event_index, timestamp
            FROM messages
            WHERE sender = ?
            ORDER BY block_number ASC, rowid ASC
            "#,
        )
        .bind(sender.to_hex())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch messages by sender")?;

        rows.into_iter().map(row_to_message_record).collect()
    }
}

/// Insert a message on an open connection; `ON CONFLICT(id) DO NOTHING`.
pub(crate) async fn append(conn: &mut SqliteConnection, record: &MessageRecord) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO messages (
            id, sender, recipient, payload,
            block_number, tx_hash, event_index, timestamp
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(&record.id)
    .bind(record.sender.to_hex())
    .bind(record.recipient.to_hex())
    .bind(payload_to_blob(&record.payload))
    .bind(record.block_number as i64)
    .bind(record.tx_hash.to_hex())
    .bind(record.event_index as i64)
    .bind(record.timestamp as i64)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to append message {}", record.id))?;

    Ok(result.rows_affected() > 0)
}

fn payload_to_blob(payload: &[Felt]) -> Vec<u8> {
    payload.iter().flat_map(|felt| felt.to_be_bytes()).collect()
}

fn blob_to_payload(blob: &[u8]) -> Result<Vec<Felt>> {
    if blob.len() % WORD_BYTES != 0 {
        anyhow::bail!(
            "Stored payload length {} is not a multiple of {}",
            blob.len(),
            WORD_BYTES
        );
    }

    blob.chunks_exact(WORD_BYTES)
        .map(|word| Felt::from_be_slice(word).context("Invalid stored payload word"))
        .collect()
}

fn row_to_message_record(row: SqliteRow) -> Result<MessageRecord> {
    let sender: String = row.get("sender");
    let recipient: String = row.get("recipient");
    let tx_hash: String = row.get("tx_hash");
    let payload: Vec<u8> = row.get("payload");

    Ok(MessageRecord {
        id: row.get("id"),
        sender: sender.parse().context("Invalid stored sender")?,
        recipient: recipient.parse().context("Invalid stored recipient")?,
        payload: blob_to_payload(&payload)?,
        block_number: row.get::<i64, _>("block_number") as u64,
        tx_hash: tx_hash.parse().context("Invalid stored tx_hash")?,
        event_index: row.get::<i64, _>("event_index") as u64,
        timestamp: row.get::<i64, _>("timestamp") as u64,
    })
}
