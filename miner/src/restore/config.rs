use crate::PublicKey;
use std::time::Duration;

/// Configuration for the [super::Engine].
#[derive(Clone, Debug)]
pub struct Config {
    /// The miner whose fragments are inspected and who claims restoral orders.
    pub public_key: PublicKey,

    /// How often to sweep the store and claim orders (typically the block interval).
    pub poll_interval: Duration,

    /// Maximum size of a single fragment fetched from a peer.
    pub fragment_size: u64,
}
