//! Detect and repair lost fragments.
//!
//! # Overview
//!
//! The [Engine] runs two sweeps on every poll:
//!
//! - [Inspector]: walks every file in the local [crate::store::Store] and checks that each
//!   fragment assigned to this miner is present. A missing fragment is restored with [Recovery]
//!   and, if that fails, a restoral order is filed so another miner can rebuild it.
//! - [Claimer]: first drains the restoral orders this miner claimed earlier (recorded in the
//!   [crate::cache::Cache] so a claim survives restarts), then claims at most one new overdue
//!   order filed by someone else.
//!
//! # Recovery
//!
//! [Recovery] first looks for the same fragment under another file's directory (fragments are
//! content-addressed, so any copy will do). Otherwise it fetches sibling fragments of the segment
//! from the miners holding them, one at a time, until it has [quorum] of them, and rebuilds the
//! target with a [crate::codec::Reconstructor]. A fragment only counts as restored once it is
//! present at its expected path.
//!
//! Failures are contained at the smallest granularity: a failed peer moves on to the next peer, a
//! failed fragment to the next fragment, and a failed order to the next order.

use crate::{cache, codec, Digest};
use thiserror::Error;

mod claimer;
pub use claimer::{Claimer, Drained};
mod config;
pub use config::Config;
mod discovery;
pub use discovery::{Discovery, Source};
mod engine;
pub use engine::Engine;
mod inspector;
pub use inspector::{Inspector, Report};
mod metrics;
mod recovery;
pub use recovery::{quorum, Recovery, Restored};

/// Errors that can occur while restoring fragments.
#[derive(Debug, Error)]
pub enum Error {
    #[error("ledger error: {0}")]
    Ledger(#[from] crate::Error),
    #[error("transport error: {0}")]
    Transport(crate::Error),
    #[error("cache error: {0}")]
    Cache(#[from] cache::Error),
    #[error("codec error: {0}")]
    Codec(#[from] codec::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("insufficient fragments: fetched {fetched} of {required}")]
    Insufficient { fetched: usize, required: usize },
    #[error("fragment missing after reconstruction")]
    Missing,
    #[error("fragment not in file: {0}")]
    UnknownFragment(Digest),
    #[error("fetched fragment does not match digest: {0}")]
    Corrupt(Digest),
}
