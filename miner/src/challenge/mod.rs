//! Answer the ledger's storage challenges before their deadlines.
//!
//! # Overview
//!
//! The ledger periodically opens a challenge window for each miner with two independent tracks:
//! an idle proof (covering unfilled space) and a service proof (covering stored fragments). On
//! every poll, the [Coordinator] fetches the active [crate::Challenge], reads the current height,
//! and triages each track with [evaluate]:
//!
//! - No proof submitted: launch a proof task unless the track's submission deadline has passed.
//! - Proof submitted: once the verify deadline has passed nothing more can be done. Before it, a
//!   rejected proof is retried, an accepted proof needs nothing, and an unverified proof is left
//!   for the next poll.
//!
//! # Concurrency
//!
//! Each track owns a capacity-one [Slot]. A task holds the slot's [Permit] until it finishes, so
//! a poll that finds the slot held skips the dispatch (rather than queueing a second task) and
//! re-evaluates on the next poll. Tasks are never cancelled; deadlines are expressed only as
//! ledger heights.
//!
//! Computing the proofs themselves is delegated to a [Prover].

use crate::{passed, Error, Height, ProofOutcome};
use prometheus_client::encoding::EncodeLabelValue;
use std::future::Future;

mod config;
pub use config::Config;
mod coordinator;
pub use coordinator::{Coordinator, Outcome};
mod metrics;
mod slot;
pub use slot::{Permit, Slot};

/// The two proof tracks of a challenge.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Track {
    Idle,
    Service,
}

/// Inputs required to compute an idle proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdleRequest {
    /// Whether this task retries a proof the verifier rejected.
    pub retry: bool,
    /// Height at which the task was dispatched.
    pub height: Height,
    pub verify_deadline: Height,
    pub window_start: Height,
    pub front: u64,
    pub rear: u64,
    pub space_param: Vec<u64>,
    pub accumulator: Vec<u8>,
    pub tee_signature: Vec<u8>,
}

/// Inputs required to compute a service proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceRequest {
    /// Whether this task retries a proof the verifier rejected.
    pub retry: bool,
    /// Height at which the task was dispatched.
    pub height: Height,
    pub verify_deadline: Height,
    pub window_start: Height,
    pub index: Vec<u32>,
    pub value: Vec<Vec<u8>>,
}

/// Computes the proofs submitted in answer to a challenge.
pub trait Prover: Clone + Send + Sync + 'static {
    /// Compute an idle proof.
    fn prove_idle(
        &mut self,
        request: IdleRequest,
    ) -> impl Future<Output = Result<Vec<u8>, Error>> + Send;

    /// Compute a service proof.
    fn prove_service(
        &mut self,
        request: ServiceRequest,
    ) -> impl Future<Output = Result<Vec<u8>, Error>> + Send;
}

/// The decision reached for one track of a challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// A proof task was (or should be) launched.
    Dispatch { retry: bool },
    /// A proof task should be launched but the previous one is still running.
    Busy,
    /// No proof was submitted before the submission deadline.
    Expired,
    /// A proof was submitted but the verify deadline has passed.
    VerifyExpired,
    /// A proof was submitted and awaits verification.
    Pending,
    /// A proof was submitted and accepted.
    Satisfied,
}

/// Decide what to do for a track at `height`.
///
/// `deadline` is the track's submission deadline and `outcome` the recorded state of its proof.
/// Never returns [Action::Busy] (slot availability is checked by the caller).
pub fn evaluate(
    height: Height,
    deadline: Height,
    verify_deadline: Height,
    outcome: Option<&ProofOutcome>,
) -> Action {
    match outcome {
        Some(outcome) if outcome.submitted => {
            if passed(height, verify_deadline) {
                return Action::VerifyExpired;
            }
            match outcome.verify_result {
                None => Action::Pending,
                Some(false) => Action::Dispatch { retry: true },
                Some(true) => Action::Satisfied,
            }
        }
        _ => {
            if passed(height, deadline) {
                Action::Expired
            } else {
                Action::Dispatch { retry: false }
            }
        }
    }
}
