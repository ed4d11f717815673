//! Profile storage operations.
//!
//! Profiles live in `profiles`; their coordinates are mirrored into the
//! `profile_locations` R*Tree under the same integer id. Both are written in
//! one transaction.

use super::{ProfileRecord, Storage};
use alloy_primitives::U256;
use anyhow::{Context, Result};
use scrypo_core::{BoundingBox, Felt, GeoPoint, PublicKeyFelts};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

const PROFILE_COLUMNS: &str = r#"
    p.address AS address, p.name AS name,
    p.tags0 AS tags0, p.tags1 AS tags1, p.tags2 AS tags2, p.tags3 AS tags3,
    p.longitude AS longitude, p.latitude AS latitude,
    p.pubkey_hi AS pubkey_hi, p.pubkey_lo AS pubkey_lo,
    p.block_number AS block_number, p.tx_hash AS tx_hash
"#;

impl Storage {
    /// Insert or replace the profile for `record.address`.
    ///
    /// Last write wins. Writing the same record twice leaves an identical row.
    pub async fn upsert_profile(&self, record: &ProfileRecord) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        upsert(&mut tx, record).await?;
        tx.commit().await.context("Failed to commit profile")?;
        Ok(())
    }

    /// Get a profile by address.
    ///
    /// `None` means the profile has not been indexed (yet).
    pub async fn get_profile(&self, address: &Felt) -> Result<Option<ProfileRecord>> {
        let sql = format!("SELECT {} FROM profiles p WHERE p.address = ?", PROFILE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(address.to_hex())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch profile")?;

        row.map(row_to_profile_record).transpose()
    }

    /// List all profiles in insertion order.
    pub async fn list_profiles(&self) -> Result<Vec<ProfileRecord>> {
        let sql = format!("SELECT {} FROM profiles p ORDER BY p.id ASC", PROFILE_COLUMNS);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list profiles")?;

        rows.into_iter().map(row_to_profile_record).collect()
    }

    /// Profiles whose location lies in the closed rectangle `bbox`.
    ///
    /// The R*Tree narrows candidates (its 32-bit boxes are rounded outward,
    /// so no match is lost); the stored 64-bit coordinates decide membership.
    /// No ordering is guaranteed.
    pub async fn profiles_in_bounding_box(&self, bbox: &BoundingBox) -> Result<Vec<ProfileRecord>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM profile_locations r
            JOIN profiles p ON p.id = r.id
            WHERE r.max_x >= ? AND r.min_x <= ?
              AND r.max_y >= ? AND r.min_y <= ?
              AND p.longitude >= ? AND p.longitude <= ?
              AND p.latitude >= ? AND p.latitude <= ?
            "#,
            PROFILE_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(bbox.x1)
            .bind(bbox.x2)
            .bind(bbox.y1)
            .bind(bbox.y2)
            .bind(bbox.x1)
            .bind(bbox.x2)
            .bind(bbox.y1)
            .bind(bbox.y2)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query profiles in bounding box")?;

        rows.into_iter().map(row_to_profile_record).collect()
    }
}

/// Upsert a profile and its R*Tree entry on an open connection.
pub(crate) async fn upsert(conn: &mut SqliteConnection, record: &ProfileRecord) -> Result<()> {
    let [tags0, tags1, tags2, tags3] = record.tags.map(|t| t.to_string());

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO profiles (
            address, name, tags0, tags1, tags2, tags3,
            longitude, latitude, pubkey_hi, pubkey_lo,
            block_number, tx_hash
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(address) DO UPDATE SET
            name = excluded.name,
            tags0 = excluded.tags0,
            tags1 = excluded.tags1,
            tags2 = excluded.tags2,
            tags3 = excluded.tags3,
            longitude = excluded.longitude,
            latitude = excluded.latitude,
            pubkey_hi = excluded.pubkey_hi,
            pubkey_lo = excluded.pubkey_lo,
            block_number = excluded.block_number,
            tx_hash = excluded.tx_hash
        RETURNING id
        "#,
    )
    .bind(record.address.to_hex())
    .bind(&record.name)
    .bind(tags0)
    .bind(tags1)
    .bind(tags2)
    .bind(tags3)
    .bind(record.location.x)
    .bind(record.location.y)
    .bind(record.pubkey.hi.to_decimal())
    .bind(record.pubkey.lo.to_decimal())
    .bind(record.block_number as i64)
    .bind(record.tx_hash.to_hex())
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("Failed to upsert profile {}", record.address))?;

    sqlx::query("DELETE FROM profile_locations WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .context("Failed to clear profile location")?;

    sqlx::query(
        r#"
        INSERT INTO profile_locations (id, min_x, max_x, min_y, max_y)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(record.location.x)
    .bind(record.location.x)
    .bind(record.location.y)
    .bind(record.location.y)
    .execute(&mut *conn)
    .await
    .context("Failed to index profile location")?;

    Ok(())
}

/// Remove a profile and its R*Tree entry.
pub(crate) async fn delete(conn: &mut SqliteConnection, address: &str) -> Result<()> {
    sqlx::query(
        "DELETE FROM profile_locations WHERE id = (SELECT id FROM profiles WHERE address = ?)",
    )
    .bind(address)
    .execute(&mut *conn)
    .await
    .context("Failed to clear profile location")?;

    sqlx::query("DELETE FROM profiles WHERE address = ?")
        .bind(address)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Failed to delete profile {}", address))?;

    Ok(())
}

pub(super) fn row_to_profile_record(row: SqliteRow) -> Result<ProfileRecord> {
    let address: String = row.get("address");
    let address: Felt = address
        .parse()
        .with_context(|| format!("Invalid stored address: {}", address))?;

    let mut tags = [U256::ZERO; 4];
    for (i, tag) in tags.iter_mut().enumerate() {
        let raw: String = row.get(format!("tags{}", i).as_str());
        *tag = U256::from_str_radix(&raw, 10)
            .with_context(|| format!("Invalid stored tags{} for {}", i, address))?;
    }

    let pubkey_hi: String = row.get("pubkey_hi");
    let pubkey_lo: String = row.get("pubkey_lo");
    let pubkey = PublicKeyFelts::new(
        pubkey_hi.parse().context("Invalid stored pubkey_hi")?,
        pubkey_lo.parse().context("Invalid stored pubkey_lo")?,
    )
    .context("Invalid stored public key")?;

    let tx_hash: String = row.get("tx_hash");

    Ok(ProfileRecord {
        address,
        name: row.get("name"),
        tags,
        location: GeoPoint::new(row.get("longitude"), row.get("latitude")),
        pubkey,
        block_number: row.get::<i64, _>("block_number") as u64,
        tx_hash: tx_hash.parse().context("Invalid stored tx_hash")?,
    })
}
