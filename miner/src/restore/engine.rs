use super::{
    metrics::{Method, MethodLabel, Metrics},
    Claimer, Config, Discovery, Error, Inspector, Recovery, Report,
};
use crate::{
    cache::Cache,
    codec::Reconstructor,
    poller::{supervise, Poller},
    status,
    store::Store,
    Ledger, PublicKey, Transport,
};
use commonware_runtime::{Clock, Handle, Metrics as RuntimeMetrics, Spawner};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Inspects the local store and works through restoral orders on every poll.
pub struct Engine<
    E: Clock + Spawner + RuntimeMetrics,
    L: Ledger,
    T: Transport,
    R: Reconstructor,
    C: Cache,
> {
    context: E,
    ledger: L,
    inspector: Inspector<L, T, R, C>,
    claimer: Claimer<L, T, R, C>,

    public_key: PublicKey,
    poll_interval: Duration,

    metrics: Metrics,
}

impl<E, L, T, R, C> Engine<E, L, T, R, C>
where
    E: Clock + Spawner + RuntimeMetrics,
    L: Ledger,
    T: Transport,
    R: Reconstructor,
    C: Cache,
{
    /// Create a new engine over the fragments in `store`.
    pub fn new(
        context: E,
        ledger: L,
        transport: T,
        reconstructor: R,
        cache: C,
        store: Store,
        cfg: Config,
    ) -> Self {
        let metrics = Metrics::init(context.clone());
        let recovery = Recovery::new(
            ledger.clone(),
            transport,
            reconstructor,
            store.clone(),
            cfg.fragment_size,
        );
        let discovery = Discovery::new(store.clone(), cache.clone());
        let inspector = Inspector::new(
            ledger.clone(),
            recovery.clone(),
            discovery.clone(),
            store.clone(),
            cfg.public_key,
        );
        let claimer = Claimer::new(ledger.clone(), recovery, discovery, cache, store);
        Self {
            context,
            ledger,
            inspector,
            claimer,
            public_key: cfg.public_key,
            poll_interval: cfg.poll_interval,
            metrics,
        }
    }

    /// Log the miner's status, then poll every `poll_interval`, forever.
    pub fn start(mut self) -> Handle<()> {
        let interval = self.poll_interval;
        self.context
            .with_label("poller")
            .spawn(move |context| async move {
                match status::query(&mut self.ledger, &self.public_key).await {
                    Ok(status) => info!(
                        peer_id = %status.peer_id,
                        state = %status.state,
                        declared = %status.declared,
                        validated = %status.validated,
                        used = %status.used,
                        locked = %status.locked,
                        "miner status"
                    ),
                    Err(err) => warn!(?err, "failed to query miner status"),
                }
                supervise(context, interval, self).await
            })
    }

    /// Run one inspection sweep followed by one round of claim work.
    ///
    /// Both halves always run; the first error encountered is returned.
    pub async fn run_once(&mut self) -> Result<(), Error> {
        let inspected = self
            .inspector
            .inspect()
            .await
            .map(|report| self.record(&report));

        // Finish claimed work before taking on more
        let drained = self.claimer.drain().await.map(|drained| {
            debug!(?drained, "drained claimed orders");
            self.metrics.completed.inc_by(drained.completed as u64);
        });
        let claimed = self.claimer.claim().await.map(|claimed| {
            if claimed.is_some() {
                self.metrics.claimed.inc();
            }
        });
        inspected.and(drained).and(claimed)
    }

    fn record(&self, report: &Report) {
        debug!(?report, "inspection complete");
        self.metrics.missing.inc_by(report.missing as u64);
        self.metrics
            .restored
            .get_or_create(&MethodLabel {
                method: Method::Copy,
            })
            .inc_by(report.copied as u64);
        self.metrics
            .restored
            .get_or_create(&MethodLabel {
                method: Method::Reconstruct,
            })
            .inc_by(report.reconstructed as u64);
        self.metrics.failed.inc_by(report.failed as u64);
        self.metrics.ordered.inc_by(report.ordered as u64);
        self.metrics.removed.inc_by(report.removed as u64);
    }
}

impl<E, L, T, R, C> Poller for Engine<E, L, T, R, C>
where
    E: Clock + Spawner + RuntimeMetrics,
    L: Ledger,
    T: Transport,
    R: Reconstructor,
    C: Cache,
{
    type Error = Error;

    async fn poll(&mut self) -> Result<(), Error> {
        self.run_once().await
    }
}
