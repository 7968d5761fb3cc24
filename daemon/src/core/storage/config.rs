use super::StoreGateway;
use crate::core::error::SyncResult;

impl StoreGateway {
    /// Lookup in the key/value `config` table, e.g. `network.nodes`.
    pub async fn get_config_value(&self, key: &str) -> SyncResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT config_value FROM config WHERE config_key = ?")
                .bind(key)
                .fetch_optional(self.pool())
                .await?;
        Ok(value.filter(|v| !v.trim().is_empty()))
    }
}
