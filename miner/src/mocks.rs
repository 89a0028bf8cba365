//! In-memory collaborators for testing.

use crate::{
    cache::{self, Cache as _},
    challenge::{IdleRequest, ServiceRequest},
    codec, passed,
    store::Store, Challenge, Digest, Error, FileMetadata, Fragment, Height,
    IdleProof, MinerInfo, PeerId, PublicKey, Receipt, RestoralOrder, Segment, ServiceProof,
};
use commonware_runtime::deterministic;
use futures::channel::oneshot;
use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

/// Returns a unique, not yet created, directory under the system temp directory.
pub fn directory(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "commonware_miner_{}_{}",
        label,
        rand::random::<u64>()
    ))
}

/// Returns a deterministic peer identity.
pub fn peer(seed: u8) -> PeerId {
    PeerId::from(vec![seed; 8])
}

/// Returns a deterministic miner key.
pub fn miner(seed: u8) -> PublicKey {
    PublicKey::from([seed; 32])
}

/// Encode `seed`-derived data into a segment whose fragments are held by `miners`, in order.
///
/// Returns the segment and the bytes of each fragment.
pub fn segment(cfg: &codec::Config, seed: u8, miners: &[PublicKey]) -> (Segment, Vec<Vec<u8>>) {
    assert_eq!(miners.len(), cfg.total_shards());
    let data: Vec<u8> = (0..256u32)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect();
    let shards = codec::encode(cfg, &data).unwrap();
    let segment = Segment {
        hash: Digest::of(&data),
        fragments: shards
            .iter()
            .zip(miners)
            .map(|(shard, miner)| Fragment {
                hash: Digest::of(shard),
                miner: *miner,
            })
            .collect(),
    };
    (segment, shards)
}

/// Open a fresh [Store] under `directory`.
pub fn store(directory: &Path) -> Store {
    let store = Store::new(directory.join("files"), directory.join("tmp"));
    store.init().unwrap();
    store
}

/// Open the cache in the `cache` partition of `context`.
pub async fn cache(context: &deterministic::Context) -> Cache {
    let inner = cache::Durable::init(
        context.clone(),
        cache::Config {
            partition: "cache".to_string(),
        },
    )
    .await
    .unwrap();
    Cache {
        inner,
        failing: Arc::default(),
    }
}

/// A durable cache whose writes to selected keys fail.
#[derive(Clone)]
pub struct Cache {
    inner: cache::Durable<deterministic::Context>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl Cache {
    /// Fail every subsequent `put` or `delete` of `key`.
    pub fn fail(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    /// Stop failing writes to `key`.
    pub fn heal(&self, key: &str) {
        self.failing.lock().unwrap().remove(key);
    }

    fn check(&self, key: &str) -> Result<(), cache::Error> {
        if self.failing.lock().unwrap().contains(key) {
            return Err(commonware_runtime::Error::WriteFailed.into());
        }
        Ok(())
    }
}

impl cache::Cache for Cache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, cache::Error> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), cache::Error> {
        self.check(key)?;
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), cache::Error> {
        self.check(key)?;
        self.inner.delete(key).await
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, cache::Error> {
        self.inner.keys(prefix).await
    }
}

/// A reconstructor that never produces the target fragment.
#[derive(Clone)]
pub enum Reconstructor {
    /// Reports success without writing anything.
    Silent,
    /// Fails every reconstruction.
    Failing,
}

impl codec::Reconstructor for Reconstructor {
    fn reconstruct(
        &self,
        _: &Path,
        segment: &Segment,
        _: &Digest,
        _: &Path,
    ) -> Result<(), codec::Error> {
        match self {
            Self::Silent => Ok(()),
            Self::Failing => Err(codec::Error::NotEnoughShards(0, segment.fragments.len())),
        }
    }
}

/// Heights a claimed order stays with its claimer before others may claim it again.
pub const ORDER_LIFE: Height = 10;

#[derive(Default)]
pub struct LedgerState {
    pub height: Height,
    pub challenge: Option<Challenge>,
    pub files: HashMap<Digest, FileMetadata>,
    pub miners: HashMap<PublicKey, MinerInfo>,
    pub orders: Vec<RestoralOrder>,

    /// Fail every call with [Error::Unavailable].
    pub unavailable: bool,
    /// Fragments whose claim is rejected.
    pub reject_claims: HashSet<Digest>,
    /// Error returned when completing an order.
    pub complete_error: Option<Error>,

    pub idle_proofs: Vec<IdleProof>,
    pub service_proofs: Vec<ServiceProof>,
    pub lookups: Vec<PublicKey>,
    pub generated: Vec<(Digest, Digest)>,
    pub claims: Vec<Digest>,
    pub completions: Vec<Digest>,
}

/// A ledger that serves records from memory and records every transaction.
#[derive(Clone, Default)]
pub struct Ledger {
    state: Arc<Mutex<LedgerState>>,
}

impl Ledger {
    pub fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap()
    }

    /// Register `miner` as reachable at `peer_id`.
    pub fn register(&self, miner: PublicKey, peer_id: PeerId) {
        self.state().miners.insert(
            miner,
            MinerInfo {
                peer_id,
                state: "positive".to_string(),
                declaration_space: 1 << 40,
                idle_space: 1 << 30,
                service_space: 1 << 20,
                lock_space: 0,
            },
        );
    }

    /// Record `metadata` as a stored file.
    pub fn add_file(&self, metadata: FileMetadata) {
        self.state().files.insert(metadata.root, metadata);
    }

    fn check(&self) -> Result<MutexGuard<'_, LedgerState>, Error> {
        let state = self.state();
        if state.unavailable {
            return Err(Error::Unavailable("connection refused".to_string()));
        }
        Ok(state)
    }

    fn receipt(label: &[u8], digest: &Digest) -> Receipt {
        let mut data = label.to_vec();
        data.extend_from_slice(digest.as_ref());
        Digest::of(&data)
    }
}

impl crate::Ledger for Ledger {
    async fn height(&mut self) -> Result<Height, Error> {
        Ok(self.check()?.height)
    }

    async fn challenge(&mut self, _: &PublicKey) -> Result<Challenge, Error> {
        self.check()?.challenge.clone().ok_or(Error::NotFound)
    }

    async fn submit_idle_proof(&mut self, proof: IdleProof) -> Result<Receipt, Error> {
        let receipt = Digest::of(&proof.proof);
        self.check()?.idle_proofs.push(proof);
        Ok(receipt)
    }

    async fn submit_service_proof(&mut self, proof: ServiceProof) -> Result<Receipt, Error> {
        let receipt = Digest::of(&proof.proof);
        self.check()?.service_proofs.push(proof);
        Ok(receipt)
    }

    async fn file(&mut self, root: &Digest) -> Result<FileMetadata, Error> {
        self.check()?.files.get(root).cloned().ok_or(Error::NotFound)
    }

    async fn miner(&mut self, miner: &PublicKey) -> Result<MinerInfo, Error> {
        let mut state = self.check()?;
        state.lookups.push(*miner);
        state.miners.get(miner).cloned().ok_or(Error::NotFound)
    }

    async fn restoral_orders(&mut self) -> Result<Vec<RestoralOrder>, Error> {
        Ok(self.check()?.orders.clone())
    }

    async fn generate_restoral_order(
        &mut self,
        root: &Digest,
        fragment: &Digest,
    ) -> Result<Receipt, Error> {
        self.check()?.generated.push((*root, *fragment));
        Ok(Self::receipt(b"generate", fragment))
    }

    async fn claim_restoral_order(&mut self, fragment: &Digest) -> Result<Receipt, Error> {
        let mut state = self.check()?;
        state.claims.push(*fragment);
        if state.reject_claims.contains(fragment) {
            return Err(Error::Rejected("claim rejected".to_string()));
        }
        let height = state.height;
        let Some(index) = state.orders.iter().position(|o| &o.fragment == fragment) else {
            return Err(Error::NotFound);
        };
        if !passed(height, state.orders[index].deadline) {
            return Err(Error::Rejected("order not yet claimable".to_string()));
        }
        state.orders[index].deadline = height + ORDER_LIFE;
        Ok(Self::receipt(b"claim", fragment))
    }

    async fn complete_restoral_order(&mut self, fragment: &Digest) -> Result<Receipt, Error> {
        let mut state = self.check()?;
        state.completions.push(*fragment);
        if let Some(err) = &state.complete_error {
            return Err(err.clone());
        }
        state.orders.retain(|o| &o.fragment != fragment);
        Ok(Self::receipt(b"complete", fragment))
    }
}

#[derive(Default)]
pub struct TransportState {
    pub fragments: HashMap<(PeerId, Digest), Vec<u8>>,
    pub requests: Vec<(PeerId, Digest)>,
}

/// A transport that serves fragments registered per peer.
#[derive(Clone, Default)]
pub struct Transport {
    state: Arc<Mutex<TransportState>>,
}

impl Transport {
    pub fn state(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap()
    }

    /// Serve `data` as `fragment` from `peer`.
    pub fn serve(&self, peer: PeerId, fragment: Digest, data: Vec<u8>) {
        self.state().fragments.insert((peer, fragment), data);
    }

    /// Returns the number of fetches issued so far.
    pub fn requests(&self) -> usize {
        self.state().requests.len()
    }
}

impl crate::Transport for Transport {
    async fn fetch(
        &mut self,
        peer: &PeerId,
        _: &Digest,
        fragment: &Digest,
        destination: &Path,
        size: u64,
    ) -> Result<(), Error> {
        let data = {
            let mut state = self.state();
            state.requests.push((peer.clone(), *fragment));
            state.fragments.get(&(peer.clone(), *fragment)).cloned()
        };
        let Some(mut data) = data else {
            return Err(Error::Unavailable("peer unreachable".to_string()));
        };
        data.truncate(size as usize);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::Unavailable(err.to_string()))?;
        }
        fs::write(destination, data).map_err(|err| Error::Unavailable(err.to_string()))
    }
}

#[derive(Default)]
struct ProverState {
    blocking: bool,
    failing: bool,
    gates: Vec<oneshot::Sender<()>>,
    idle: Vec<IdleRequest>,
    service: Vec<ServiceRequest>,
}

/// A prover that records requests and returns fixed proofs.
#[derive(Clone, Default)]
pub struct Prover {
    state: Arc<Mutex<ProverState>>,
}

impl Prover {
    /// A prover whose proofs do not complete until [Prover::release] is called.
    pub fn blocking() -> Self {
        let prover = Self::default();
        prover.state.lock().unwrap().blocking = true;
        prover
    }

    /// A prover that fails every proof.
    pub fn failing() -> Self {
        let prover = Self::default();
        prover.state.lock().unwrap().failing = true;
        prover
    }

    /// Complete every proof currently waiting.
    pub fn release(&self) {
        for gate in self.state.lock().unwrap().gates.drain(..) {
            let _ = gate.send(());
        }
    }

    pub fn idle_requests(&self) -> Vec<IdleRequest> {
        self.state.lock().unwrap().idle.clone()
    }

    pub fn service_requests(&self) -> Vec<ServiceRequest> {
        self.state.lock().unwrap().service.clone()
    }

    async fn prove(&self, proof: &[u8]) -> Result<Vec<u8>, Error> {
        let (gate, failing) = {
            let mut state = self.state.lock().unwrap();
            let gate = state.blocking.then(|| {
                let (sender, receiver) = oneshot::channel();
                state.gates.push(sender);
                receiver
            });
            (gate, state.failing)
        };
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if failing {
            return Err(Error::Rejected("proof failed".to_string()));
        }
        Ok(proof.to_vec())
    }
}

impl crate::challenge::Prover for Prover {
    async fn prove_idle(&mut self, request: IdleRequest) -> Result<Vec<u8>, Error> {
        self.state.lock().unwrap().idle.push(request);
        self.prove(b"idle").await
    }

    async fn prove_service(&mut self, request: ServiceRequest) -> Result<Vec<u8>, Error> {
        self.state.lock().unwrap().service.push(request);
        self.prove(b"service").await
    }
}
