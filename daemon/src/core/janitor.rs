// Mempool janitor: one transactional sweep, counts logged per step.

use crate::core::error::SyncResult;
use crate::core::storage::{JanitorReport, StoreGateway};
use log::{debug, info};
use nodesync_common::time::get_current_time_in_seconds;

pub async fn run_maintenance(store: &StoreGateway) -> SyncResult<JanitorReport> {
    let report = store.janitor_sweep(get_current_time_in_seconds()).await?;

    if report.total_removed() > 0 || report.stuck_marked_failed > 0 {
        info!(
            "mempool maintenance: {} expired, {} confirmed, {} duplicate-nonce, \
             {} stuck processing marked failed, {} stale failed purged",
            report.expired_removed,
            report.confirmed_removed,
            report.duplicates_collapsed,
            report.stuck_marked_failed,
            report.old_failed_purged
        );
    } else {
        debug!("mempool maintenance: nothing to do");
    }

    Ok(report)
}
