pub mod broadcast;
pub mod client;
pub mod error;
pub mod quorum;
pub mod registry;
pub mod replicator;

pub use client::PeerClient;
pub use error::ClientError;
