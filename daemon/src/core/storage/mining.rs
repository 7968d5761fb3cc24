use super::StoreGateway;
use crate::core::error::{SyncError, SyncResult};
use log::debug;
use nodesync_common::{
    block::Block,
    crypto::Address,
    mempool::MempoolEntry,
    time::get_current_time_in_seconds,
};
use serde_json::Value;
use sqlx::Row;

impl StoreGateway {
    /// Persist a locally-mined block in one transaction: the block row,
    /// its confirmed transactions (leaving locally-invalidated rows
    /// untouched), and the balance effects on both wallets.
    ///
    /// The tip is re-read under lock inside the transaction; if it moved
    /// since assembly the whole attempt rolls back with
    /// `ConflictingLocalState`.
    pub async fn persist_mined_block(
        &self,
        block: &Block,
        entries: &[MempoolEntry],
    ) -> SyncResult<()> {
        let now = get_current_time_in_seconds();
        let mut tx = self.pool().begin().await?;

        let tip: Option<u64> =
            sqlx::query_scalar("SELECT height FROM blocks ORDER BY height DESC LIMIT 1 FOR UPDATE")
                .fetch_optional(&mut *tx)
                .await?;
        let expected_parent = block.height.checked_sub(1);
        if tip != expected_parent {
            return Err(SyncError::ConflictingLocalState {
                expected: expected_parent.unwrap_or(0),
                found: tip.unwrap_or(0),
            });
        }

        sqlx::query(
            "INSERT INTO blocks \
             (height, hash, parent_hash, merkle_root, timestamp, validator, signature, tx_count, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)",
        )
        .bind(block.height)
        .bind(block.hash.to_hex())
        .bind(block.parent_hash.to_hex())
        .bind(block.merkle_root.to_hex())
        .bind(block.timestamp)
        .bind(block.validator.as_str())
        .bind(&block.signature)
        .bind(block.tx_count)
        .execute(&mut *tx)
        .await?;

        for entry in entries {
            let confirmed = entry.to_confirmed_transaction(
                block.hash.clone(),
                block.height,
                block.timestamp,
            );

            let existing: Option<String> =
                sqlx::query_scalar("SELECT status FROM transactions WHERE hash = ? FOR UPDATE")
                    .bind(confirmed.hash.to_hex())
                    .fetch_optional(&mut *tx)
                    .await?;

            match existing {
                None => {
                    sqlx::query(
                        "INSERT INTO transactions \
                         (hash, from_address, to_address, amount, fee, nonce, gas_limit, gas_used, \
                          gas_price, data, signature, status, block_hash, block_height, timestamp) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'confirmed', ?, ?, ?)",
                    )
                    .bind(confirmed.hash.to_hex())
                    .bind(confirmed.from.as_str())
                    .bind(confirmed.to.as_str())
                    .bind(confirmed.amount)
                    .bind(confirmed.fee)
                    .bind(confirmed.nonce)
                    .bind(confirmed.gas_limit)
                    .bind(confirmed.gas_used)
                    .bind(confirmed.gas_price)
                    .bind(data_column(&confirmed.data))
                    .bind(&confirmed.signature)
                    .bind(block.hash.to_hex())
                    .bind(block.height)
                    .bind(block.timestamp)
                    .execute(&mut *tx)
                    .await?;
                }
                Some(_) => {
                    // conditional update preserves a local invalid mark
                    sqlx::query(
                        "UPDATE transactions SET status = 'confirmed', block_hash = ?, \
                         block_height = ? WHERE hash = ? AND status <> 'invalid'",
                    )
                    .bind(block.hash.to_hex())
                    .bind(block.height)
                    .bind(confirmed.hash.to_hex())
                    .execute(&mut *tx)
                    .await?;
                }
            }

            // debit sender (amount + fee) and bump its nonce
            sqlx::query(
                "UPDATE wallets SET balance = GREATEST(0, balance - ?), \
                 nonce = nonce + 1, updated_at = ? WHERE address = ?",
            )
            .bind(entry.amount + entry.fee)
            .bind(now)
            .bind(entry.from.as_str())
            .execute(&mut *tx)
            .await?;

            // credit receiver, creating the wallet row on first sight
            sqlx::query(
                "INSERT INTO wallets (address, balance, staked_balance, nonce, public_key, updated_at) \
                 VALUES (?, ?, 0, 0, '', ?) \
                 ON DUPLICATE KEY UPDATE balance = balance + VALUES(balance), \
                 updated_at = VALUES(updated_at)",
            )
            .bind(entry.to.as_str())
            .bind(entry.amount)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            "persisted mined block {} with {} transactions",
            block.height,
            entries.len()
        );
        Ok(())
    }

    /// Pick the address used to bootstrap a system validator: the richest
    /// wallet, falling back to the zero address on an empty ledger.
    pub async fn system_validator_address(&self) -> SyncResult<Address> {
        let row = sqlx::query("SELECT address FROM wallets ORDER BY balance DESC LIMIT 1")
            .fetch_optional(self.pool())
            .await?;

        if let Some(row) = row {
            let raw: String = row.try_get("address")?;
            if let Ok(address) = Address::parse(&raw) {
                return Ok(address);
            }
        }

        Ok(Address::parse(&format!("0x{}", "0".repeat(40)))
            .expect("zero address is well-formed"))
    }
}

fn data_column(data: &Value) -> Option<String> {
    match data {
        Value::Null => None,
        other => serde_json::to_string(other).ok(),
    }
}
