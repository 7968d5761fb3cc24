use super::{is_duplicate_key, StoreGateway};
use crate::core::error::SyncResult;
use log::{debug, trace};
use nodesync_common::{
    block::Block,
    crypto::{Address, Hash},
};
use serde_json::Value;
use sqlx::{mysql::MySqlRow, Row};
use std::collections::HashMap;
use std::str::FromStr;

impl StoreGateway {
    /// Highest block height present, `None` on an empty chain.
    pub async fn tip_height(&self) -> SyncResult<Option<u64>> {
        let tip: Option<u64> = sqlx::query_scalar("SELECT MAX(height) FROM blocks")
            .fetch_one(self.pool())
            .await?;
        Ok(tip)
    }

    pub async fn block_hash_at(&self, height: u64) -> SyncResult<Option<Hash>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT hash FROM blocks WHERE height = ?")
            .bind(height)
            .fetch_optional(self.pool())
            .await?;
        Ok(raw.and_then(|s| Hash::from_str(&s).ok()))
    }

    /// Hashes for `start..=end`, keyed by height.
    pub async fn block_hashes_between(
        &self,
        start: u64,
        end: u64,
    ) -> SyncResult<HashMap<u64, Hash>> {
        let rows = sqlx::query("SELECT height, hash FROM blocks WHERE height BETWEEN ? AND ?")
            .bind(start)
            .bind(end)
            .fetch_all(self.pool())
            .await?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let height: u64 = row.try_get("height")?;
            let raw: String = row.try_get("hash")?;
            if let Ok(hash) = Hash::from_str(&raw) {
                out.insert(height, hash);
            }
        }
        Ok(out)
    }

    pub async fn has_block_hash(&self, hash: &Hash) -> SyncResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM blocks WHERE hash = ? LIMIT 1")
            .bind(hash.to_hex())
            .fetch_optional(self.pool())
            .await?;
        Ok(found.is_some())
    }

    pub async fn block_by_height(&self, height: u64) -> SyncResult<Option<Block>> {
        let row = sqlx::query("SELECT * FROM blocks WHERE height = ?")
            .bind(height)
            .fetch_optional(self.pool())
            .await?;
        row.map(|r| row_to_block(&r)).transpose()
    }

    /// No-op when a block with the same height or hash already exists.
    pub async fn insert_block_if_absent(&self, block: &Block) -> SyncResult<bool> {
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM blocks WHERE height = ? OR hash = ? LIMIT 1")
                .bind(block.height)
                .bind(block.hash.to_hex())
                .fetch_optional(self.pool())
                .await?;
        if existing.is_some() {
            trace!("block {} already present, skipping", block.height);
            return Ok(false);
        }

        let result = sqlx::query(
            "INSERT INTO blocks \
             (height, hash, parent_hash, merkle_root, timestamp, validator, signature, tx_count, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(block.height)
        .bind(block.hash.to_hex())
        .bind(block.parent_hash.to_hex())
        .bind(block.merkle_root.to_hex())
        .bind(block.timestamp)
        .bind(block.validator.as_str())
        .bind(&block.signature)
        .bind(block.tx_count)
        .bind(metadata_to_column(&block.metadata))
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(true),
            // a concurrent writer won the race; the row is there either way
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Rollback helper: drops every block strictly above `height`.
    pub async fn delete_blocks_above(&self, height: u64) -> SyncResult<u64> {
        let result = sqlx::query("DELETE FROM blocks WHERE height > ?")
            .bind(height)
            .execute(self.pool())
            .await?;
        let deleted = result.rows_affected();
        if deleted > 0 {
            debug!("rolled back {} blocks above height {}", deleted, height);
        }
        Ok(deleted)
    }

    /// Remove transactions that claim a block which no longer exists.
    pub async fn delete_orphan_transactions(&self) -> SyncResult<u64> {
        let result = sqlx::query(
            "DELETE t FROM transactions t \
             LEFT JOIN blocks b ON t.block_hash = b.hash \
             WHERE t.block_hash IS NOT NULL AND t.block_hash <> '' AND b.hash IS NULL",
        )
        .execute(self.pool())
        .await?;
        let deleted = result.rows_affected();
        if deleted > 0 {
            debug!("removed {} orphaned transactions", deleted);
        }
        Ok(deleted)
    }

    /// Re-derive `tx_count` from confirmed transactions for every block.
    pub async fn recalculate_block_tx_counts(&self) -> SyncResult<u64> {
        let result = sqlx::query(
            "UPDATE blocks b SET b.tx_count = \
             (SELECT COUNT(*) FROM transactions t \
              WHERE t.block_hash = b.hash AND t.status = 'confirmed')",
        )
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}

pub(crate) fn row_to_block(row: &MySqlRow) -> SyncResult<Block> {
    let hash: String = row.try_get("hash")?;
    let parent_hash: String = row.try_get("parent_hash")?;
    let merkle_root: String = row.try_get("merkle_root")?;
    let validator: String = row.try_get("validator")?;
    let metadata: Option<String> = row.try_get("metadata")?;

    Ok(Block {
        height: row.try_get("height")?,
        hash: Hash::from_str(&hash).map_err(invalid_column)?,
        parent_hash: Hash::from_str(&parent_hash).map_err(invalid_column)?,
        merkle_root: Hash::from_str(&merkle_root).map_err(invalid_column)?,
        timestamp: row.try_get("timestamp")?,
        validator: Address::parse(&validator).map_err(invalid_column)?,
        signature: row.try_get("signature")?,
        tx_count: row.try_get("tx_count")?,
        metadata: column_to_metadata(metadata),
    })
}

pub(crate) fn metadata_to_column(metadata: &Value) -> Option<String> {
    match metadata {
        Value::Null => None,
        other => serde_json::to_string(other).ok(),
    }
}

pub(crate) fn column_to_metadata(raw: Option<String>) -> Value {
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(Value::Null)
}

pub(crate) fn invalid_column(reason: impl ToString) -> crate::core::error::SyncError {
    sqlx::Error::Decode(reason.to_string().into()).into()
}
