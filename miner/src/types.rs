//! Records read from and written to the ledger.

use commonware_utils::{from_hex, hex};
use sha2::{Digest as _, Sha256};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// A ledger block height.
pub type Height = u32;

/// Returns true if `height` is past `deadline`.
///
/// A deadline is inclusive: work submitted at exactly `deadline` is still in time.
pub fn passed(height: Height, deadline: Height) -> bool {
    height > deadline
}

/// Length of a [Digest] in bytes.
const DIGEST_LENGTH: usize = 32;

/// A SHA-256 digest identifying a file, segment, fragment, or transaction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_LENGTH]);

impl Digest {
    /// Compute the digest of `data`.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }
}

impl From<[u8; DIGEST_LENGTH]> for Digest {
    fn from(value: [u8; DIGEST_LENGTH]) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

/// Error returned when parsing a [Digest] from its hex form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid digest")]
pub struct InvalidDigest;

impl FromStr for Digest {
    type Err = InvalidDigest;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = from_hex(s).ok_or(InvalidDigest)?;
        let bytes: [u8; DIGEST_LENGTH] = bytes.try_into().map_err(|_| InvalidDigest)?;
        Ok(Self(bytes))
    }
}

/// The public key a miner stakes and signs with.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; 32]);

impl From<[u8; 32]> for PublicKey {
    fn from(value: [u8; 32]) -> Self {
        Self(value)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

/// The network identity a miner is reachable at.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PeerId(Vec<u8>);

impl From<Vec<u8>> for PeerId {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for PeerId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

/// Hash of a transaction accepted by the ledger.
pub type Receipt = Digest;

/// Progress of a proof submitted for a challenge window.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProofOutcome {
    /// Whether a proof has been submitted.
    pub submitted: bool,
    /// The verdict of the verifier, if one has been reached.
    pub verify_result: Option<bool>,
}

/// Parameters of a service challenge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceParam {
    /// Indices of the challenged service chunks.
    pub index: Vec<u32>,
    /// Random coefficients paired with each index.
    pub value: Vec<Vec<u8>>,
}

/// Snapshot of the miner's idle space taken when the challenge was issued.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// First idle file covered by the snapshot.
    pub front: u64,
    /// Last idle file covered by the snapshot.
    pub rear: u64,
    /// Accumulator over the idle files.
    pub accumulator: Vec<u8>,
}

/// The active challenge issued to a miner.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Challenge {
    /// Height at which the challenge window opened.
    pub window_start: Height,
    /// Last height at which an idle proof may be submitted.
    pub idle_deadline: Height,
    /// Last height at which a submitted proof may be verified (or resubmitted).
    pub verify_deadline: Height,
    /// Last height at which a service proof may be submitted.
    pub service_deadline: Height,
    /// Progress of the idle proof, if any was recorded.
    pub idle_proof: Option<ProofOutcome>,
    /// Progress of the service proof, if any was recorded.
    pub service_proof: Option<ProofOutcome>,
    /// Parameters of the idle (space) challenge.
    pub space_param: Vec<u64>,
    /// Parameters of the service challenge.
    pub service_param: ServiceParam,
    /// Idle space snapshot the idle proof must cover.
    pub snapshot: Snapshot,
    /// Signature of the trusted environment over the snapshot.
    pub tee_signature: Vec<u8>,
}

/// An idle proof ready for submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdleProof {
    /// Window the proof answers.
    pub window_start: Height,
    /// Opaque proof bytes.
    pub proof: Vec<u8>,
}

/// A service proof ready for submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceProof {
    /// Window the proof answers.
    pub window_start: Height,
    /// Opaque proof bytes.
    pub proof: Vec<u8>,
}

/// One erasure-coded piece of a segment, assigned to a single miner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    /// Digest of the fragment contents.
    pub hash: Digest,
    /// Miner responsible for holding the fragment.
    pub miner: PublicKey,
}

/// An erasure-coded group of fragments.
///
/// Any quorum of fragments is sufficient to rebuild the rest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Digest of the segment before encoding.
    pub hash: Digest,
    /// Fragments in encoding order (original shards first, then recovery shards).
    pub fragments: Vec<Fragment>,
}

impl Segment {
    /// Returns true if `fragment` belongs to this segment.
    pub fn contains(&self, fragment: &Digest) -> bool {
        self.fragments.iter().any(|f| &f.hash == fragment)
    }
}

/// Fragment layout of a stored file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileMetadata {
    /// Content digest of the file.
    pub root: Digest,
    /// Segments in file order.
    pub segments: Vec<Segment>,
}

impl FileMetadata {
    /// Returns the segment containing `fragment`, if any.
    pub fn segment(&self, fragment: &Digest) -> Option<&Segment> {
        self.segments.iter().find(|s| s.contains(fragment))
    }
}

/// A request that some miner rebuild `fragment` of `file`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestoralOrder {
    /// File the fragment belongs to.
    pub file: Digest,
    /// Fragment to rebuild.
    pub fragment: Digest,
    /// Height after which the order may be claimed.
    pub deadline: Height,
}

/// A miner's registration on the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinerInfo {
    /// Network identity of the miner.
    pub peer_id: PeerId,
    /// Lifecycle state (e.g. "positive", "frozen", "exit").
    pub state: String,
    /// Space the miner declared it would provide.
    pub declaration_space: u128,
    /// Idle space that has been certified.
    pub idle_space: u128,
    /// Space filled with service fragments.
    pub service_space: u128,
    /// Space reserved for in-flight uploads.
    pub lock_space: u128,
}
