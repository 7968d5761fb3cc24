// Store gateway: every read and write against the node's relational
// schema goes through here. All write operations are idempotent under
// retry; conditional upsert logic lives in explicit transactions rather
// than vendor SQL.

mod blocks;
mod config;
mod contracts;
mod mempool;
mod mining;
mod nodes;
mod staking;
mod transactions;
mod validators;
mod wallets;

pub use mempool::{JanitorReport, MempoolStats};

use crate::config::Settings;
use crate::core::error::SyncResult;
use log::info;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::time::Duration;

pub struct StoreGateway {
    pool: MySqlPool,
}

impl StoreGateway {
    pub async fn connect(settings: &Settings) -> SyncResult<Self> {
        let options = MySqlConnectOptions::new()
            .host(&settings.db_host)
            .port(settings.db_port)
            .username(&settings.db_user)
            .password(&settings.db_password)
            .database(&settings.db_name);

        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        // Fail fast on bad credentials instead of on the first round
        sqlx::query("SELECT 1").execute(&pool).await?;
        info!(
            "connected to {}@{}:{}/{}",
            settings.db_user, settings.db_host, settings.db_port, settings.db_name
        );

        Ok(StoreGateway { pool })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

/// MySQL duplicate-key violations are expected on racing idempotent
/// inserts and are treated as "row already present".
pub(crate) fn is_duplicate_key(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| code == "23000")
            .unwrap_or(false),
        _ => false,
    }
}

/// Build an `IN (?, ?, …)` placeholder list for a dynamic bind set.
pub(crate) fn placeholders(count: usize) -> String {
    let mut out = String::with_capacity(count * 2);
    for index in 0..count {
        if index > 0 {
            out.push(',');
        }
        out.push('?');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_list() {
        assert_eq!(placeholders(0), "");
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?,?,?");
    }
}
