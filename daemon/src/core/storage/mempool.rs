use super::blocks::{column_to_metadata, invalid_column, metadata_to_column};
use super::{is_duplicate_key, placeholders, StoreGateway};
use crate::core::error::SyncResult;
use log::trace;
use nodesync_common::{
    config::{MEMPOOL_FAILED_RETENTION_DAYS, MEMPOOL_STUCK_PROCESSING_SECONDS, MEMPOOL_TTL_HOURS},
    crypto::{Address, Hash},
    mempool::MempoolEntry,
    transaction::TxStatus,
};
use sqlx::{mysql::MySqlRow, Row};
use std::str::FromStr;

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct MempoolStats {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub failed: u64,
}

/// Per-step counts of one janitor sweep.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct JanitorReport {
    pub expired_removed: u64,
    pub confirmed_removed: u64,
    pub duplicates_collapsed: u64,
    pub stuck_marked_failed: u64,
    pub old_failed_purged: u64,
}

impl JanitorReport {
    pub fn total_removed(&self) -> u64 {
        self.expired_removed
            + self.confirmed_removed
            + self.duplicates_collapsed
            + self.old_failed_purged
    }
}

impl StoreGateway {
    /// Pending entries in mining order: priority desc, fee desc, oldest
    /// first.
    pub async fn pending_mempool_entries(&self, limit: u64) -> SyncResult<Vec<MempoolEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM mempool WHERE status = 'pending' \
             ORDER BY priority_score DESC, fee DESC, created_at ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_mempool_entry).collect()
    }

    pub async fn mempool_contains(&self, hash: &Hash) -> SyncResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM mempool WHERE tx_hash = ? LIMIT 1")
                .bind(hash.to_hex())
                .fetch_optional(self.pool())
                .await?;
        Ok(found.is_some())
    }

    pub async fn insert_mempool_if_absent(&self, entry: &MempoolEntry) -> SyncResult<bool> {
        if self.mempool_contains(&entry.tx_hash).await? {
            trace!("mempool entry {} already present", entry.tx_hash);
            return Ok(false);
        }

        let result = sqlx::query(
            "INSERT INTO mempool \
             (tx_hash, from_address, to_address, amount, fee, nonce, gas_limit, gas_price, \
              data, signature, status, priority_score, created_at, last_retry_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.tx_hash.to_hex())
        .bind(entry.from.as_str())
        .bind(entry.to.as_str())
        .bind(entry.amount)
        .bind(entry.fee)
        .bind(entry.nonce)
        .bind(entry.gas_limit)
        .bind(entry.gas_price)
        .bind(metadata_to_column(&entry.data))
        .bind(&entry.signature)
        .bind(entry.status.as_str())
        .bind(entry.priority_score)
        .bind(entry.created_at)
        .bind(entry.last_retry_at)
        .bind(entry.expires_at)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn remove_mempool_hashes(&self, hashes: &[Hash]) -> SyncResult<u64> {
        if hashes.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM mempool WHERE tx_hash IN ({})",
            placeholders(hashes.len())
        );
        let mut query = sqlx::query(&sql);
        for hash in hashes {
            query = query.bind(hash.to_hex());
        }
        let result = query.execute(self.pool()).await?;
        Ok(result.rows_affected())
    }

    pub async fn mempool_stats(&self) -> SyncResult<MempoolStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM mempool GROUP BY status")
            .fetch_all(self.pool())
            .await?;

        let mut stats = MempoolStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("n")?;
            let count = count.max(0) as u64;
            stats.total += count;
            match TxStatus::parse_lossy(&status) {
                TxStatus::Pending => stats.pending += count,
                TxStatus::Processing => stats.processing += count,
                TxStatus::Failed => stats.failed += count,
                _ => {}
            }
        }
        Ok(stats)
    }

    /// One transactional sweep over the mempool:
    /// TTL expiry, confirmed removal, duplicate-nonce collapse keeping the
    /// newest, stuck `processing` recovery, stale `failed` purge.
    pub async fn janitor_sweep(&self, now: u64) -> SyncResult<JanitorReport> {
        let ttl_cutoff = now.saturating_sub(MEMPOOL_TTL_HOURS * 3600);
        let stuck_cutoff = now.saturating_sub(MEMPOOL_STUCK_PROCESSING_SECONDS);
        let failed_cutoff = now.saturating_sub(MEMPOOL_FAILED_RETENTION_DAYS * 86_400);

        let mut tx = self.pool().begin().await?;
        let mut report = JanitorReport::default();

        report.expired_removed = sqlx::query(
            "DELETE FROM mempool WHERE (expires_at IS NOT NULL AND expires_at < ?) \
             OR (created_at < ? AND status IN ('pending', 'failed'))",
        )
        .bind(now)
        .bind(ttl_cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        report.confirmed_removed = sqlx::query(
            "DELETE m FROM mempool m \
             JOIN transactions t ON m.tx_hash = t.hash \
             WHERE t.status = 'confirmed'",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        // keep the newest entry per (from, nonce); ties break on tx_hash
        report.duplicates_collapsed = sqlx::query(
            "DELETE m1 FROM mempool m1 \
             JOIN mempool m2 ON m1.from_address = m2.from_address \
             AND m1.nonce = m2.nonce AND m1.tx_hash <> m2.tx_hash \
             WHERE m1.status = 'pending' AND m2.status = 'pending' \
             AND (m1.created_at < m2.created_at \
                  OR (m1.created_at = m2.created_at AND m1.tx_hash < m2.tx_hash))",
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();

        report.stuck_marked_failed = sqlx::query(
            "UPDATE mempool SET status = 'failed' \
             WHERE status = 'processing' AND COALESCE(last_retry_at, created_at) < ?",
        )
        .bind(stuck_cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        report.old_failed_purged =
            sqlx::query("DELETE FROM mempool WHERE status = 'failed' AND created_at < ?")
                .bind(failed_cutoff)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        tx.commit().await?;
        Ok(report)
    }
}

fn row_to_mempool_entry(row: &MySqlRow) -> SyncResult<MempoolEntry> {
    let tx_hash: String = row.try_get("tx_hash")?;
    let from: String = row.try_get("from_address")?;
    let to: String = row.try_get("to_address")?;
    let status: String = row.try_get("status")?;
    let data: Option<String> = row.try_get("data")?;

    Ok(MempoolEntry {
        tx_hash: Hash::from_str(&tx_hash).map_err(invalid_column)?,
        from: Address::parse(&from).map_err(invalid_column)?,
        to: Address::parse(&to).map_err(invalid_column)?,
        amount: row.try_get("amount")?,
        fee: row.try_get("fee")?,
        nonce: row.try_get("nonce")?,
        gas_limit: row.try_get("gas_limit")?,
        gas_price: row.try_get("gas_price")?,
        data: column_to_metadata(data),
        signature: row.try_get("signature")?,
        status: TxStatus::parse_lossy(&status),
        priority_score: row.try_get("priority_score")?,
        created_at: row.try_get("created_at")?,
        last_retry_at: row.try_get("last_retry_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}
