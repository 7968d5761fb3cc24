use super::blocks::metadata_to_column;
use super::StoreGateway;
use crate::core::error::SyncResult;
use nodesync_common::contract::SmartContract;
use serde_json::Value;

impl StoreGateway {
    /// Contracts are opaque passthrough rows; the latest replica wins.
    pub async fn upsert_contract(&self, contract: &SmartContract) -> SyncResult<()> {
        let abi = match &contract.abi {
            Value::Null => None,
            other => serde_json::to_string(other).ok(),
        };

        sqlx::query(
            "INSERT INTO smart_contracts \
             (address, name, creator_address, code, abi, status, created_at, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE \
             name = VALUES(name), creator_address = VALUES(creator_address), \
             code = VALUES(code), abi = VALUES(abi), status = VALUES(status), \
             metadata = VALUES(metadata)",
        )
        .bind(contract.address.as_str())
        .bind(&contract.name)
        .bind(contract.creator.as_ref().map(|a| a.as_str().to_string()))
        .bind(&contract.code)
        .bind(abi)
        .bind(&contract.status)
        .bind(contract.created_at)
        .bind(metadata_to_column(&contract.metadata))
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
