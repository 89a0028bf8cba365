use crate::PublicKey;
use std::time::Duration;

/// Configuration for the [super::Coordinator].
#[derive(Clone, Debug)]
pub struct Config {
    /// The miner the ledger issues challenges to.
    pub public_key: PublicKey,

    /// How often to poll the ledger for the active challenge (typically the block interval).
    pub poll_interval: Duration,
}
