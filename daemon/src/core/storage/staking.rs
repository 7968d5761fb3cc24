use super::StoreGateway;
use crate::core::error::SyncResult;
use log::trace;
use nodesync_common::staking::{StakingRecord, StakingStatus};
use rust_decimal::Decimal;
use sqlx::Row;

/// Outcome of a staking MERGE, mostly for logging and tests.
#[derive(Debug, PartialEq, Eq)]
pub enum StakingUpsert {
    Inserted,
    Merged,
    FrozenTerminal,
}

impl StoreGateway {
    /// MERGE with terminal-state freeze.
    ///
    /// A record is identified by `(validator, staker, start_block)`. If the
    /// stored row is already withdrawn or completed it is left untouched;
    /// otherwise amounts, rewards and the last reward block only ever move
    /// up, and the incoming status wins.
    pub async fn upsert_staking(&self, record: &StakingRecord) -> SyncResult<StakingUpsert> {
        let mut tx = self.pool().begin().await?;

        let existing = sqlx::query(
            "SELECT status, amount, rewards_earned, last_reward_block FROM staking \
             WHERE validator_address = ? AND staker_address = ? AND start_block = ? \
             FOR UPDATE",
        )
        .bind(record.validator.as_str())
        .bind(record.staker.as_str())
        .bind(record.start_block)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            None => {
                sqlx::query(
                    "INSERT INTO staking \
                     (validator_address, staker_address, amount, reward_rate, start_block, \
                      end_block, status, rewards_earned, last_reward_block, contract_address) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(record.validator.as_str())
                .bind(record.staker.as_str())
                .bind(record.amount)
                .bind(record.reward_rate)
                .bind(record.start_block)
                .bind(record.end_block)
                .bind(record.status.as_str())
                .bind(record.rewards_earned)
                .bind(record.last_reward_block)
                .bind(record.contract_address.as_ref().map(|a| a.as_str().to_string()))
                .execute(&mut *tx)
                .await?;
                StakingUpsert::Inserted
            }
            Some(row) => {
                let status: String = row.try_get("status")?;
                let status = StakingStatus::parse_lossy(&status);
                if status.is_terminal() {
                    trace!(
                        "staking record {}/{}@{} is terminal, leaving untouched",
                        record.validator,
                        record.staker,
                        record.start_block
                    );
                    StakingUpsert::FrozenTerminal
                } else {
                    let amount: Decimal = row.try_get("amount")?;
                    let rewards: Decimal = row.try_get("rewards_earned")?;
                    let last_reward_block: u64 = row.try_get("last_reward_block")?;

                    sqlx::query(
                        "UPDATE staking SET \
                         amount = ?, reward_rate = ?, end_block = ?, status = ?, \
                         rewards_earned = ?, last_reward_block = ?, contract_address = ? \
                         WHERE validator_address = ? AND staker_address = ? AND start_block = ?",
                    )
                    .bind(record.amount.max(amount))
                    .bind(record.reward_rate)
                    .bind(record.end_block)
                    .bind(record.status.as_str())
                    .bind(record.rewards_earned.max(rewards))
                    .bind(record.last_reward_block.max(last_reward_block))
                    .bind(record.contract_address.as_ref().map(|a| a.as_str().to_string()))
                    .bind(record.validator.as_str())
                    .bind(record.staker.as_str())
                    .bind(record.start_block)
                    .execute(&mut *tx)
                    .await?;
                    StakingUpsert::Merged
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}
