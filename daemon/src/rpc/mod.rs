// Inbound HTTP intake for broadcast events and operational triggers.
//
// Served surface (compatible with the PHP-era paths):
//   POST /network_sync.php?action=sync_new_block   signed block event
//   POST /network_sync.php?action=block            compatibility alias
//   GET  /network_sync.php?action=trigger_sync|status|sync|
//        mempool_maintenance|mine_block|get_mempool_status

pub mod event_cache;

use crate::config::{Settings, DEFAULT_MAX_BLOCK_TXS};
use crate::core::janitor;
use crate::core::mining::{MineOutcome, Miner};
use crate::core::service::SyncService;
use crate::core::storage::StoreGateway;
use crate::net::replicator::Replicator;
use actix_web::{
    dev::Server,
    web::{self, Bytes, Data, Query},
    App, HttpRequest, HttpResponse, HttpServer,
};
use event_cache::EventCache;
use log::{debug, error, info, warn};
use nodesync_common::{
    config::VERSION,
    crypto::{verify_broadcast_signature, BROADCAST_SIGNATURE_HEADER},
    event::BlockEvent,
    time::get_current_time_in_seconds,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub struct IntakeState {
    pub service: Arc<SyncService>,
    pub miner: Arc<Miner>,
    pub store: Arc<StoreGateway>,
    pub replicator: Arc<Replicator>,
    pub settings: Arc<Settings>,
    pub events: EventCache,
}

#[derive(Deserialize)]
struct ActionQuery {
    action: Option<String>,
}

/// Build the intake server bound to `bind`; the caller drives (and stops)
/// the returned actix server.
pub fn build_intake_server(state: Arc<IntakeState>, bind: &str) -> std::io::Result<Server> {
    let data = Data::new(state);
    info!("intake server listening on {}", bind);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/network_sync.php", web::post().to(handle_post))
            .route("/network_sync.php", web::get().to(handle_get))
    })
    .bind(bind)?
    .run();

    Ok(server)
}

async fn handle_post(
    state: Data<Arc<IntakeState>>,
    query: Query<ActionQuery>,
    request: HttpRequest,
    body: Bytes,
) -> HttpResponse {
    match query.action.as_deref() {
        Some("sync_new_block") | Some("block") => handle_block_event(&state, &request, &body).await,
        other => unknown_action(other),
    }
}

async fn handle_block_event(
    state: &IntakeState,
    request: &HttpRequest,
    body: &Bytes,
) -> HttpResponse {
    // verify when a secret is configured and a signature arrived; an
    // unsigned request from an unsigned peer is accepted
    if let Some(secret) = &state.settings.broadcast_secret {
        if let Some(header) = request.headers().get(BROADCAST_SIGNATURE_HEADER) {
            let valid = header
                .to_str()
                .map(|value| verify_broadcast_signature(secret, body, value))
                .unwrap_or(false);
            if !valid {
                warn!("rejected broadcast with invalid signature");
                return HttpResponse::BadRequest().json(json!({
                    "status": "error",
                    "message": "Invalid broadcast signature",
                }));
            }
        }
    }

    let mut event: BlockEvent = match serde_json::from_slice(body) {
        Ok(event) => event,
        Err(e) => {
            return HttpResponse::BadRequest().json(json!({
                "status": "error",
                "message": format!("Malformed event: {}", e),
            }));
        }
    };
    event.ensure_event_id();

    let now = get_current_time_in_seconds();
    if !state.events.check_and_insert(&event.event_id, now) {
        debug!("duplicate event {} ignored", event.event_id);
        return HttpResponse::Ok().json(json!({
            "status": "success",
            "message": "Duplicate event, ignored",
        }));
    }

    match state.store.has_block_hash(&event.block_hash).await {
        Ok(true) => {
            return HttpResponse::Ok().json(json!({
                "status": "success",
                "message": "Block already known",
            }));
        }
        Ok(false) => {}
        Err(e) => {
            error!("intake store lookup failed: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "status": "error",
                "message": "Store unavailable",
            }));
        }
    }

    info!(
        "new block {} at height {} announced by {}",
        event.block_hash, event.block_height, event.source_node
    );

    let replicator = Arc::clone(&state.replicator);
    let service = Arc::clone(&state.service);
    let source = resolve_source(state, &event.source_node).await;
    tokio::spawn(async move {
        let result = match source {
            Some(base) => replicator.sync_blocks_only(&base).await.map(|_| ()),
            // unknown announcer: fall back to a full round against the
            // best available peer
            None => service.run_round().await.map(|_| ()),
        };
        if let Err(e) = result {
            warn!("event-triggered sync failed: {}", e);
        }
    });

    HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Sync triggered",
    }))
}

/// Map an announced `source_node` to a base URL: either it already is
/// one, or it names a row in the nodes table.
async fn resolve_source(state: &IntakeState, source_node: &str) -> Option<String> {
    if source_node.contains("://") {
        return Some(source_node.trim_end_matches('/').to_string());
    }
    match state.store.active_nodes().await {
        Ok(nodes) => nodes
            .into_iter()
            .find(|node| node.node_id == source_node)
            .and_then(|node| node.endpoint()),
        Err(e) => {
            warn!("source resolution failed: {}", e);
            None
        }
    }
}

async fn handle_get(state: Data<Arc<IntakeState>>, query: Query<ActionQuery>) -> HttpResponse {
    match query.action.as_deref() {
        Some("trigger_sync") => {
            let service = Arc::clone(&state.service);
            tokio::spawn(async move {
                if let Err(e) = service.run_round().await {
                    warn!("triggered sync failed: {}", e);
                }
            });
            HttpResponse::Ok().json(json!({
                "status": "success",
                "message": "Sync scheduled",
            }))
        }
        Some("status") => match state.service.status().await {
            Ok(report) => HttpResponse::Ok().json(json!({
                "status": "success",
                "data": {
                    "node_id": report.node_id,
                    "version": VERSION,
                    "tip_height": report.tip_height,
                    "total_transactions": report.total_transactions,
                    "mempool": report.mempool,
                    "peers_accessible": report.peers.iter().filter(|p| p.accessible).count(),
                    "events_tracked": state.events.tracked(),
                },
            })),
            Err(e) => error_response(e),
        },
        Some("sync") => match state.service.run_round().await {
            Ok(report) => HttpResponse::Ok().json(json!({
                "status": "success",
                "data": {
                    "peer": report.peer,
                    "blocks_inserted": report.chain.blocks_inserted,
                    "blocks_rolled_back": report.chain.blocks_rolled_back,
                    "transactions_inserted": report.transactions.inserted,
                    "mempool_pulled": report.aux.mempool_pulled,
                    "quorum_agreed": report.quorum.agreed,
                    "quorum_asked": report.quorum.asked,
                },
            })),
            Err(e) => error_response(e),
        },
        Some("mempool_maintenance") => match janitor::run_maintenance(&state.store).await {
            Ok(report) => HttpResponse::Ok().json(json!({
                "status": "success",
                "data": report,
            })),
            Err(e) => error_response(e),
        },
        Some("mine_block") => {
            match state.miner.mine_once(None, DEFAULT_MAX_BLOCK_TXS, true).await {
                Ok(outcome) => HttpResponse::Ok().json(json!({
                    "status": "success",
                    "message": describe_outcome(&outcome),
                })),
                Err(e) => error_response(e),
            }
        }
        Some("get_mempool_status") => match state.store.mempool_stats().await {
            Ok(stats) => HttpResponse::Ok().json(json!({
                "status": "success",
                "data": stats,
            })),
            Err(e) => error_response(e),
        },
        other => unknown_action(other),
    }
}

fn describe_outcome(outcome: &MineOutcome) -> String {
    match outcome {
        MineOutcome::Mined {
            height, tx_count, ..
        } => format!("Mined block {} with {} transactions", height, tx_count),
        MineOutcome::NotLeader => "Not the leader for this slot".to_string(),
        MineOutcome::QuickSyncWindow => "Inside the quick-sync window".to_string(),
        MineOutcome::IntervalNotElapsed => "Block interval not elapsed".to_string(),
        MineOutcome::NoPending => "No pending transactions".to_string(),
    }
}

fn unknown_action(action: Option<&str>) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({
        "status": "error",
        "message": format!("Unknown action: {}", action.unwrap_or("<none>")),
    }))
}

fn error_response(error: impl std::fmt::Display) -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({
        "status": "error",
        "message": error.to_string(),
    }))
}
