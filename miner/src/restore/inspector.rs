use super::{Discovery, Error, Recovery, Restored};
use crate::{cache::Cache, codec::Reconstructor, store::Store, Digest, Ledger, PublicKey, Transport};
use tracing::{debug, info, warn};

/// Tally of a single sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Report {
    /// Fragments assigned to this miner that were missing.
    pub missing: usize,
    /// Missing fragments copied from another root.
    pub copied: usize,
    /// Missing fragments rebuilt from siblings.
    pub reconstructed: usize,
    /// Missing fragments that could not be restored.
    pub failed: usize,
    /// Restoral orders filed for fragments that could not be restored.
    pub ordered: usize,
    /// Files removed because the ledger no longer tracks them.
    pub removed: usize,
}

/// Sweeps the local store for missing fragments.
pub struct Inspector<L: Ledger, T: Transport, R: Reconstructor, C: Cache> {
    ledger: L,
    recovery: Recovery<L, T, R>,
    discovery: Discovery<C>,
    store: Store,
    public_key: PublicKey,
}

impl<L: Ledger, T: Transport, R: Reconstructor, C: Cache> Inspector<L, T, R, C> {
    pub fn new(
        ledger: L,
        recovery: Recovery<L, T, R>,
        discovery: Discovery<C>,
        store: Store,
        public_key: PublicKey,
    ) -> Self {
        Self {
            ledger,
            recovery,
            discovery,
            store,
            public_key,
        }
    }

    /// Check every fragment assigned to this miner, restoring or ordering any that are missing.
    ///
    /// Only failing to discover any roots is an error: everything else is logged and skipped.
    pub async fn inspect(&mut self) -> Result<Report, Error> {
        let (source, roots) = self.discovery.roots().await?;
        debug!(?source, roots = roots.len(), "inspecting files");

        let mut report = Report::default();
        for root in &roots {
            let metadata = match self.ledger.file(root).await {
                Ok(metadata) => metadata,
                Err(crate::Error::NotFound) => {
                    match self.discovery.forget(root).await {
                        Ok(()) => {
                            info!(%root, "file no longer tracked: removed");
                            report.removed += 1;
                        }
                        Err(err) => warn!(?err, %root, "failed to remove untracked file"),
                    }
                    continue;
                }
                Err(err) => {
                    warn!(?err, %root, "failed to fetch file metadata");
                    continue;
                }
            };

            for segment in &metadata.segments {
                for fragment in &segment.fragments {
                    if fragment.miner != self.public_key
                        || self.store.has_fragment(root, &fragment.hash)
                    {
                        continue;
                    }
                    report.missing += 1;
                    let fragment = fragment.hash;
                    match self.recovery.restore(root, &fragment, segment, &roots).await {
                        Ok(Restored::Copied { from }) => {
                            info!(%root, %fragment, %from, "restored fragment from local copy");
                            report.copied += 1;
                        }
                        Ok(Restored::Reconstructed { fetched }) => {
                            info!(%root, %fragment, fetched, "reconstructed fragment");
                            report.reconstructed += 1;
                        }
                        Err(err) => {
                            warn!(?err, %root, %fragment, "failed to restore fragment");
                            report.failed += 1;
                            self.order(root, &fragment, &mut report).await;
                        }
                    }
                }
            }
        }
        Ok(report)
    }

    /// Ask the network to rebuild `fragment` of `root`.
    async fn order(&mut self, root: &Digest, fragment: &Digest, report: &mut Report) {
        match self.ledger.generate_restoral_order(root, fragment).await {
            Ok(receipt) => {
                info!(%root, %fragment, %receipt, "filed restoral order");
                report.ordered += 1;
            }
            Err(err) => warn!(?err, %root, %fragment, "failed to file restoral order"),
        }
    }
}
