// Replicators: chain (fork-resolving block download), transactions
// (paginated incremental import and exact replication), and the auxiliary
// tables. One struct, one impl block per concern.

mod aux;
mod chain;
mod transactions;

pub use aux::AuxReport;
pub use chain::ChainSyncReport;
pub use transactions::{TxStopReason, TxSyncReport};

use crate::config::Settings;
use crate::core::storage::StoreGateway;
use crate::net::client::PeerClient;
use std::sync::Arc;

pub struct Replicator {
    store: Arc<StoreGateway>,
    client: Arc<PeerClient>,
    settings: Arc<Settings>,
}

impl Replicator {
    pub fn new(store: Arc<StoreGateway>, client: Arc<PeerClient>, settings: Arc<Settings>) -> Self {
        Replicator {
            store,
            client,
            settings,
        }
    }

    pub(crate) fn store(&self) -> &StoreGateway {
        &self.store
    }

    pub(crate) fn client(&self) -> &PeerClient {
        &self.client
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.settings
    }
}
