use super::blocks::metadata_to_column;
use super::{is_duplicate_key, placeholders, StoreGateway};
use crate::core::error::SyncResult;
use log::trace;
use nodesync_common::{crypto::Hash, transaction::Transaction};
use std::str::FromStr;

impl StoreGateway {
    pub async fn transaction_exists(&self, hash: &Hash) -> SyncResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM transactions WHERE hash = ? LIMIT 1")
                .bind(hash.to_hex())
                .fetch_optional(self.pool())
                .await?;
        Ok(found.is_some())
    }

    pub async fn confirmed_transaction_exists(&self, hash: &Hash) -> SyncResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM transactions WHERE hash = ? AND status = 'confirmed' LIMIT 1",
        )
        .bind(hash.to_hex())
        .fetch_optional(self.pool())
        .await?;
        Ok(found.is_some())
    }

    pub async fn transaction_count(&self) -> SyncResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(self.pool())
            .await?;
        Ok(count.max(0) as u64)
    }

    pub async fn confirmed_transaction_count(&self) -> SyncResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE status = 'confirmed'")
                .fetch_one(self.pool())
                .await?;
        Ok(count.max(0) as u64)
    }

    /// No-op when the hash is already present. Rows marked `invalid`
    /// locally are never touched by replication.
    pub async fn insert_transaction_if_absent(&self, tx: &Transaction) -> SyncResult<bool> {
        if self.transaction_exists(&tx.hash).await? {
            trace!("transaction {} already present, skipping", tx.hash);
            return Ok(false);
        }

        let result = sqlx::query(
            "INSERT INTO transactions \
             (hash, from_address, to_address, amount, fee, nonce, gas_limit, gas_used, gas_price, \
              data, signature, status, block_hash, block_height, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tx.hash.to_hex())
        .bind(tx.from.as_str())
        .bind(tx.to.as_str())
        .bind(tx.amount)
        .bind(tx.fee)
        .bind(tx.nonce)
        .bind(tx.gas_limit)
        .bind(tx.gas_used)
        .bind(tx.gas_price)
        .bind(metadata_to_column(&tx.data))
        .bind(&tx.signature)
        .bind(tx.status.as_str())
        .bind(tx.block_hash.as_ref().map(|h| h.to_hex()))
        .bind(tx.block_height)
        .bind(tx.timestamp)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Hashes currently marked `invalid`, snapshotted before an exact
    /// replication wipe so the marks survive.
    pub async fn invalid_transaction_hashes(&self) -> SyncResult<Vec<Hash>> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT hash FROM transactions WHERE status = 'invalid'")
                .fetch_all(self.pool())
                .await?;
        Ok(rows
            .into_iter()
            .filter_map(|raw| Hash::from_str(&raw).ok())
            .collect())
    }

    pub async fn truncate_transactions(&self) -> SyncResult<u64> {
        let result = sqlx::query("DELETE FROM transactions")
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn mark_transactions_invalid(&self, hashes: &[Hash]) -> SyncResult<u64> {
        if hashes.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "UPDATE transactions SET status = 'invalid' WHERE hash IN ({})",
            placeholders(hashes.len())
        );
        let mut query = sqlx::query(&sql);
        for hash in hashes {
            query = query.bind(hash.to_hex());
        }
        let result = query.execute(self.pool()).await?;
        Ok(result.rows_affected())
    }

    /// Re-derive wallet nonces as the count of confirmed outgoing
    /// transactions per address.
    pub async fn recalculate_wallet_nonces(&self) -> SyncResult<u64> {
        let result = sqlx::query(
            "UPDATE wallets w SET w.nonce = \
             (SELECT COUNT(*) FROM transactions t \
              WHERE t.from_address = w.address AND t.status = 'confirmed')",
        )
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}
