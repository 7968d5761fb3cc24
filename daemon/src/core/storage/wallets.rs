use super::StoreGateway;
use crate::core::error::SyncResult;
use log::{debug, warn};
use nodesync_common::{crypto::Address, time::get_current_time_in_seconds, wallet::Wallet};
use rust_decimal::Decimal;
use std::collections::BTreeSet;

impl StoreGateway {
    /// Replication upsert: wallet rows from a peer overwrite the cache,
    /// which is legitimate because the cache is always recomputable.
    pub async fn upsert_wallet(&self, wallet: &Wallet) -> SyncResult<()> {
        sqlx::query(
            "INSERT INTO wallets (address, balance, staked_balance, nonce, public_key, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE \
             balance = VALUES(balance), staked_balance = VALUES(staked_balance), \
             nonce = VALUES(nonce), public_key = VALUES(public_key), updated_at = VALUES(updated_at)",
        )
        .bind(wallet.address.as_str())
        .bind(wallet.balance)
        .bind(wallet.staked_balance)
        .bind(wallet.nonce)
        .bind(&wallet.public_key)
        .bind(wallet.updated_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn wallet_balance(&self, address: &Address) -> SyncResult<Option<Decimal>> {
        let balance: Option<Decimal> =
            sqlx::query_scalar("SELECT balance FROM wallets WHERE address = ?")
                .bind(address.as_str())
                .fetch_optional(self.pool())
                .await?;
        Ok(balance)
    }

    /// Recompute `balance` and `staked_balance` from confirmed
    /// transactions and active staking.
    ///
    /// With `None`, every `0x`+40-hex participant found in the ledger is
    /// rebuilt; inputs that do not normalize to an address are dropped.
    pub async fn rebuild_wallet_cache(&self, addresses: Option<&[Address]>) -> SyncResult<u64> {
        let targets: Vec<Address> = match addresses {
            Some(list) => list.to_vec(),
            None => self.ledger_addresses().await?,
        };

        let now = get_current_time_in_seconds();
        let mut rebuilt = 0u64;
        for address in &targets {
            self.rebuild_single_wallet(address, now).await?;
            rebuilt += 1;
        }

        if rebuilt > 0 {
            debug!("rebuilt wallet cache for {} addresses", rebuilt);
        }
        Ok(rebuilt)
    }

    /// Every distinct address participating in the ledger: transaction
    /// endpoints, stakers and wallet rows themselves.
    async fn ledger_addresses(&self) -> SyncResult<Vec<Address>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT from_address FROM transactions \
             UNION SELECT to_address FROM transactions \
             UNION SELECT staker_address FROM staking \
             UNION SELECT validator_address FROM staking \
             UNION SELECT address FROM wallets",
        )
        .fetch_all(self.pool())
        .await?;

        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for raw in rows {
            match Address::parse(&raw) {
                Ok(address) => {
                    if seen.insert(address.clone()) {
                        out.push(address);
                    }
                }
                Err(_) => warn!("dropping non-address ledger participant {:?}", raw),
            }
        }
        Ok(out)
    }

    async fn rebuild_single_wallet(&self, address: &Address, now: u64) -> SyncResult<()> {
        let credits: Option<Decimal> = sqlx::query_scalar(
            "SELECT SUM(amount) FROM transactions WHERE to_address = ? AND status = 'confirmed'",
        )
        .bind(address.as_str())
        .fetch_one(self.pool())
        .await?;

        let debits: Option<Decimal> = sqlx::query_scalar(
            "SELECT SUM(amount + fee) FROM transactions \
             WHERE from_address = ? AND status = 'confirmed'",
        )
        .bind(address.as_str())
        .fetch_one(self.pool())
        .await?;

        let staked: Option<Decimal> = sqlx::query_scalar(
            "SELECT SUM(amount) FROM staking WHERE staker_address = ? AND status = 'active'",
        )
        .bind(address.as_str())
        .fetch_one(self.pool())
        .await?;

        let balance = (credits.unwrap_or(Decimal::ZERO) - debits.unwrap_or(Decimal::ZERO))
            .max(Decimal::ZERO);
        let staked_balance = staked.unwrap_or(Decimal::ZERO);

        sqlx::query(
            "INSERT INTO wallets (address, balance, staked_balance, nonce, public_key, updated_at) \
             VALUES (?, ?, ?, 0, '', ?) \
             ON DUPLICATE KEY UPDATE \
             balance = VALUES(balance), staked_balance = VALUES(staked_balance), \
             updated_at = VALUES(updated_at)",
        )
        .bind(address.as_str())
        .bind(balance)
        .bind(staked_balance)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
