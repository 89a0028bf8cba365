//! Answer storage challenges and restore lost fragments on behalf of a storage miner.
//!
//! # Overview
//!
//! A storage miner holds erasure-coded fragments of files tracked by a ledger. The ledger
//! periodically challenges the miner to prove it still holds both its idle (unfilled) space and
//! its service (filled) space, and any miner that loses a fragment must either rebuild it from the
//! fragments held by its peers or ask the network to do so by filing a restoral order.
//!
//! This crate orchestrates that work. It does not compute proofs, speak a wire protocol, or define
//! an erasure code: those are reached through the [Ledger], [Transport], [challenge::Prover], and
//! [codec::Reconstructor] interfaces.
//!
//! # Components
//!
//! - [challenge::Coordinator]: polls for the active challenge and dispatches at most one idle
//!   proof task and one service proof task at a time.
//! - [restore::Engine]: sweeps the local [store::Store] for missing fragments
//!   ([restore::Inspector]) and claims overdue restoral orders filed by other miners
//!   ([restore::Claimer]). Both bottom out in [restore::Recovery].
//! - [cache::Durable]: a crash-safe key-value store that remembers claimed orders across restarts.
//!
//! Each long-lived component runs as a [poller::Poller] under [poller::supervise], which retries
//! failed polls on the next block interval and recovers from panics at the loop boundary.

use std::{future::Future, path::Path};
use thiserror::Error;

pub mod cache;
pub mod challenge;
pub mod codec;
pub mod poller;
pub mod restore;
pub mod status;
pub mod store;
mod types;
pub use types::{
    passed, Challenge, Digest, FileMetadata, Fragment, Height, IdleProof, MinerInfo, PeerId,
    ProofOutcome, PublicKey, Receipt, RestoralOrder, Segment, ServiceParam, ServiceProof,
    Snapshot,
};

#[cfg(test)]
pub(crate) mod mocks;

/// Errors returned by the [Ledger] and [Transport].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested record does not exist (an expected, steady-state condition).
    #[error("not found")]
    NotFound,
    /// The collaborator could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// The collaborator was reached but refused the request.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Interface to the ledger that issues challenges and tracks file layouts and restoral orders.
///
/// Every query fails with [Error::NotFound] when the record is absent.
pub trait Ledger: Clone + Send + Sync + 'static {
    /// Returns the latest ledger height.
    fn height(&mut self) -> impl Future<Output = Result<Height, Error>> + Send;

    /// Returns the active challenge for `miner`.
    fn challenge(
        &mut self,
        miner: &PublicKey,
    ) -> impl Future<Output = Result<Challenge, Error>> + Send;

    /// Submit an idle proof for the active challenge.
    fn submit_idle_proof(
        &mut self,
        proof: IdleProof,
    ) -> impl Future<Output = Result<Receipt, Error>> + Send;

    /// Submit a service proof for the active challenge.
    fn submit_service_proof(
        &mut self,
        proof: ServiceProof,
    ) -> impl Future<Output = Result<Receipt, Error>> + Send;

    /// Returns the fragment layout of the file identified by `root`.
    fn file(&mut self, root: &Digest) -> impl Future<Output = Result<FileMetadata, Error>> + Send;

    /// Returns the registration of the miner identified by `miner`.
    fn miner(&mut self, miner: &PublicKey)
        -> impl Future<Output = Result<MinerInfo, Error>> + Send;

    /// Returns all outstanding restoral orders.
    fn restoral_orders(&mut self) -> impl Future<Output = Result<Vec<RestoralOrder>, Error>> + Send;

    /// File a restoral order for `fragment` of the file identified by `root`.
    fn generate_restoral_order(
        &mut self,
        root: &Digest,
        fragment: &Digest,
    ) -> impl Future<Output = Result<Receipt, Error>> + Send;

    /// Claim the restoral order for `fragment`.
    fn claim_restoral_order(
        &mut self,
        fragment: &Digest,
    ) -> impl Future<Output = Result<Receipt, Error>> + Send;

    /// Report that the claimed restoral order for `fragment` has been completed.
    fn complete_restoral_order(
        &mut self,
        fragment: &Digest,
    ) -> impl Future<Output = Result<Receipt, Error>> + Send;
}

/// Interface to the peer-to-peer network used to retrieve fragments held by other miners.
pub trait Transport: Clone + Send + Sync + 'static {
    /// Stream `fragment` of the file identified by `root` from `peer` into `destination`.
    ///
    /// At most `size` bytes are written.
    fn fetch(
        &mut self,
        peer: &PeerId,
        root: &Digest,
        fragment: &Digest,
        destination: &Path,
        size: u64,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}
