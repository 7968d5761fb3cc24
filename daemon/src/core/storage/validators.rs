use super::blocks::{column_to_metadata, invalid_column, metadata_to_column};
use super::StoreGateway;
use crate::core::error::SyncResult;
use log::info;
use nodesync_common::{config::MIN_VALIDATOR_BALANCE, crypto::Address, validator::Validator};
use rust_decimal::Decimal;
use sqlx::{mysql::MySqlRow, Row};

impl StoreGateway {
    pub async fn upsert_validator(&self, validator: &Validator) -> SyncResult<()> {
        sqlx::query(
            "INSERT INTO validators \
             (address, public_key, stake, delegated_stake, commission_rate, status, \
              blocks_produced, blocks_missed, last_active_block, jail_until_block, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE \
             public_key = VALUES(public_key), stake = VALUES(stake), \
             delegated_stake = VALUES(delegated_stake), commission_rate = VALUES(commission_rate), \
             status = VALUES(status), blocks_produced = VALUES(blocks_produced), \
             blocks_missed = VALUES(blocks_missed), last_active_block = VALUES(last_active_block), \
             jail_until_block = VALUES(jail_until_block), metadata = VALUES(metadata)",
        )
        .bind(validator.address.as_str())
        .bind(&validator.public_key)
        .bind(validator.stake)
        .bind(validator.delegated_stake)
        .bind(validator.commission_rate)
        .bind(&validator.status)
        .bind(validator.blocks_produced)
        .bind(validator.blocks_missed)
        .bind(validator.last_active_block)
        .bind(validator.jail_until_block)
        .bind(metadata_to_column(&validator.metadata))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Active validators whose wallet balance meets the production
    /// minimum, candidates for the weighted pick.
    pub async fn eligible_validators(&self) -> SyncResult<Vec<Validator>> {
        let rows = sqlx::query(
            "SELECT v.* FROM validators v \
             JOIN wallets w ON w.address = v.address \
             WHERE v.status = 'active' AND w.balance >= ? \
             ORDER BY v.address",
        )
        .bind(Decimal::from(MIN_VALIDATOR_BALANCE))
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_validator).collect()
    }

    /// Bootstrap path for fresh networks: without any eligible validator,
    /// mining registers the node wallet as a stake-less system validator.
    pub async fn ensure_system_validator(&self, address: &Address) -> SyncResult<Validator> {
        sqlx::query(
            "INSERT INTO validators \
             (address, public_key, stake, delegated_stake, commission_rate, status, \
              blocks_produced, blocks_missed, last_active_block, jail_until_block, metadata) \
             VALUES (?, '', 0, 0, 0, 'active', 0, 0, NULL, NULL, NULL) \
             ON DUPLICATE KEY UPDATE status = 'active'",
        )
        .bind(address.as_str())
        .execute(self.pool())
        .await?;

        // the system validator also needs a funded wallet row to pass the
        // eligibility balance floor
        sqlx::query(
            "INSERT INTO wallets (address, balance, staked_balance, nonce, public_key, updated_at) \
             VALUES (?, ?, 0, 0, '', UNIX_TIMESTAMP()) \
             ON DUPLICATE KEY UPDATE balance = GREATEST(balance, VALUES(balance))",
        )
        .bind(address.as_str())
        .bind(Decimal::from(MIN_VALIDATOR_BALANCE))
        .execute(self.pool())
        .await?;

        info!("registered system validator {}", address);

        let row = sqlx::query("SELECT * FROM validators WHERE address = ?")
            .bind(address.as_str())
            .fetch_one(self.pool())
            .await?;
        row_to_validator(&row)
    }

    pub async fn record_block_produced(&self, address: &Address, height: u64) -> SyncResult<()> {
        sqlx::query(
            "UPDATE validators SET blocks_produced = blocks_produced + 1, \
             last_active_block = ? WHERE address = ?",
        )
        .bind(height)
        .bind(address.as_str())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

fn row_to_validator(row: &MySqlRow) -> SyncResult<Validator> {
    let address: String = row.try_get("address")?;
    let metadata: Option<String> = row.try_get("metadata")?;

    Ok(Validator {
        address: Address::parse(&address).map_err(invalid_column)?,
        public_key: row.try_get("public_key")?,
        stake: row.try_get("stake")?,
        delegated_stake: row.try_get("delegated_stake")?,
        commission_rate: row.try_get("commission_rate")?,
        status: row.try_get("status")?,
        blocks_produced: row.try_get("blocks_produced")?,
        blocks_missed: row.try_get("blocks_missed")?,
        last_active_block: row.try_get("last_active_block")?,
        jail_until_block: row.try_get("jail_until_block")?,
        metadata: column_to_metadata(metadata),
    })
}
