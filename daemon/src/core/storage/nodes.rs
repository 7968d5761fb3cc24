use super::blocks::{column_to_metadata, metadata_to_column};
use super::StoreGateway;
use crate::core::error::SyncResult;
use log::debug;
use nodesync_common::{
    config::{REPUTATION_MAX, REPUTATION_MIN},
    node::NodeRecord,
};
use sqlx::{mysql::MySqlRow, Row};

impl StoreGateway {
    pub async fn active_nodes(&self) -> SyncResult<Vec<NodeRecord>> {
        let rows = sqlx::query("SELECT * FROM nodes WHERE status = 'active' ORDER BY node_id")
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(row_to_node).collect()
    }

    /// Serialized read-modify-write on `reputation_score`, clamped to
    /// `[0, 100]`. Concurrent reward and penalty on the same node are
    /// totally ordered by the row lock.
    pub async fn adjust_reputation(&self, node_id: &str, delta: i64) -> SyncResult<Option<i64>> {
        let mut tx = self.pool().begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT reputation_score FROM nodes WHERE node_id = ? FOR UPDATE")
                .bind(node_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(current) = current else {
            tx.rollback().await?;
            debug!("reputation adjust skipped, unknown node {}", node_id);
            return Ok(None);
        };

        let updated = (current + delta).clamp(REPUTATION_MIN, REPUTATION_MAX);
        sqlx::query("UPDATE nodes SET reputation_score = ? WHERE node_id = ?")
            .bind(updated)
            .bind(node_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(
            "reputation of {} adjusted by {}: {} -> {}",
            node_id, delta, current, updated
        );
        Ok(Some(updated))
    }

    pub async fn touch_node_last_seen(&self, node_id: &str, now: u64) -> SyncResult<()> {
        sqlx::query("UPDATE nodes SET last_seen = ? WHERE node_id = ?")
            .bind(now)
            .bind(node_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Peer-list replication refreshes connectivity fields but never
    /// touches the locally-owned reputation score.
    pub async fn upsert_node(&self, node: &NodeRecord) -> SyncResult<()> {
        sqlx::query(
            "INSERT INTO nodes \
             (node_id, ip, port, protocol, domain, public_key, version, status, last_seen, \
              reputation_score, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE \
             ip = VALUES(ip), port = VALUES(port), protocol = VALUES(protocol), \
             domain = VALUES(domain), public_key = VALUES(public_key), \
             version = VALUES(version), status = VALUES(status), \
             last_seen = VALUES(last_seen), metadata = VALUES(metadata)",
        )
        .bind(&node.node_id)
        .bind(&node.ip)
        .bind(node.port)
        .bind(&node.protocol)
        .bind(&node.domain)
        .bind(&node.public_key)
        .bind(&node.version)
        .bind(&node.status)
        .bind(node.last_seen)
        .bind(node.reputation_score)
        .bind(metadata_to_column(&node.metadata))
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

fn row_to_node(row: &MySqlRow) -> SyncResult<NodeRecord> {
    let metadata: Option<String> = row.try_get("metadata")?;
    let reputation: i64 = row.try_get("reputation_score")?;

    Ok(NodeRecord {
        node_id: row.try_get("node_id")?,
        ip: row.try_get("ip")?,
        port: row.try_get("port")?,
        protocol: row.try_get("protocol")?,
        domain: row.try_get("domain")?,
        public_key: row.try_get("public_key")?,
        version: row.try_get("version")?,
        status: row.try_get("status")?,
        last_seen: row.try_get("last_seen")?,
        reputation_score: reputation.clamp(REPUTATION_MIN, REPUTATION_MAX) as u64,
        metadata: column_to_metadata(metadata),
    })
}
