use super::{Discovery, Error, Recovery, Restored};
use crate::{
    cache::{recovery_key, Cache, RECOVERY_PREFIX},
    codec::Reconstructor,
    passed,
    store::Store,
    Digest, Ledger, Transport,
};
use tracing::{debug, error, info, warn};

/// Tally of a single drain of claimed orders.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Drained {
    /// Orders restored and acknowledged by the ledger.
    pub completed: usize,
    /// Orders left in the cache for the next poll.
    pub pending: usize,
    /// Entries dropped because they were invalid or the order no longer exists.
    pub dropped: usize,
}

/// Claims restoral orders filed by other miners and sees them through to completion.
pub struct Claimer<L: Ledger, T: Transport, R: Reconstructor, C: Cache> {
    ledger: L,
    recovery: Recovery<L, T, R>,
    discovery: Discovery<C>,
    cache: C,
    store: Store,
}

impl<L: Ledger, T: Transport, R: Reconstructor, C: Cache> Claimer<L, T, R, C> {
    pub fn new(
        ledger: L,
        recovery: Recovery<L, T, R>,
        discovery: Discovery<C>,
        cache: C,
        store: Store,
    ) -> Self {
        Self {
            ledger,
            recovery,
            discovery,
            cache,
            store,
        }
    }

    /// Retry every order claimed earlier, removing each one the ledger acknowledges as complete.
    ///
    /// A failure on one entry leaves it pending and moves on to the next.
    pub async fn drain(&mut self) -> Result<Drained, Error> {
        let mut drained = Drained::default();
        let fragments = self.cache.keys(RECOVERY_PREFIX).await?;
        if fragments.is_empty() {
            return Ok(drained);
        }
        let roots = match self.discovery.roots().await {
            Ok((_, roots)) => roots,
            Err(err) => {
                warn!(?err, "failed to list roots: skipping local copies");
                Vec::new()
            }
        };
        for fragment in fragments {
            let key = format!("{}{}", RECOVERY_PREFIX, fragment);
            let value = match self.cache.get(&key).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(err) => {
                    warn!(?err, %key, "failed to read claim");
                    drained.pending += 1;
                    continue;
                }
            };
            let parsed = fragment.parse::<Digest>().ok().zip(
                String::from_utf8(value)
                    .ok()
                    .and_then(|root| root.parse::<Digest>().ok()),
            );
            let Some((fragment, root)) = parsed else {
                warn!(%key, "dropping invalid claim");
                if self.release(&key).await {
                    drained.dropped += 1;
                } else {
                    drained.pending += 1;
                }
                continue;
            };
            if !self.restore(&root, &fragment, &roots).await {
                drained.pending += 1;
                continue;
            }
            match self.ledger.complete_restoral_order(&fragment).await {
                Ok(receipt) => {
                    info!(%root, %fragment, %receipt, "completed restoral order");
                    if self.release(&key).await {
                        drained.completed += 1;
                    } else {
                        drained.pending += 1;
                    }
                }
                Err(crate::Error::NotFound) => {
                    info!(%root, %fragment, "restoral order no longer exists: dropping");
                    if self.release(&key).await {
                        drained.dropped += 1;
                    } else {
                        drained.pending += 1;
                    }
                }
                Err(err) => {
                    warn!(?err, %root, %fragment, "failed to complete restoral order");
                    drained.pending += 1;
                }
            }
        }
        Ok(drained)
    }

    /// Remove the claim recorded at `key`, returning true if it is gone.
    async fn release(&self, key: &str) -> bool {
        match self.cache.delete(key).await {
            Ok(()) => true,
            Err(err) => {
                warn!(?err, %key, "failed to remove claim");
                false
            }
        }
    }

    /// Make `fragment` of `root` present locally, returning true if the order can be completed.
    async fn restore(&mut self, root: &Digest, fragment: &Digest, roots: &[Digest]) -> bool {
        if self.store.has_fragment(root, fragment) {
            debug!(%root, %fragment, "claimed fragment already present");
            return true;
        }
        let metadata = match self.ledger.file(root).await {
            Ok(metadata) => metadata,
            Err(crate::Error::NotFound) => {
                info!(%root, %fragment, "file no longer tracked: completing order");
                return true;
            }
            Err(err) => {
                warn!(?err, %root, %fragment, "failed to fetch file metadata");
                return false;
            }
        };
        let Some(segment) = metadata.segment(fragment) else {
            warn!(%root, %fragment, "fragment not in file: completing order");
            return true;
        };
        match self.recovery.restore(root, fragment, segment, roots).await {
            Ok(Restored::Copied { from }) => {
                info!(%root, %fragment, %from, "restored claimed fragment from local copy");
                true
            }
            Ok(Restored::Reconstructed { fetched }) => {
                info!(%root, %fragment, fetched, "reconstructed claimed fragment");
                true
            }
            Err(err) => {
                warn!(?err, %root, %fragment, "failed to restore claimed fragment");
                false
            }
        }
    }

    /// Claim the first overdue order not already held, returning its fragment.
    pub async fn claim(&mut self) -> Result<Option<Digest>, Error> {
        let orders = self.ledger.restoral_orders().await?;
        let height = self.ledger.height().await?;
        for order in orders {
            if !passed(height, order.deadline) {
                continue;
            }
            let key = recovery_key(&order.fragment);
            if self.cache.get(&key).await?.is_some() {
                continue;
            }
            match self.ledger.claim_restoral_order(&order.fragment).await {
                Ok(receipt) => {
                    if let Err(err) = self
                        .cache
                        .put(&key, order.file.to_string().as_bytes())
                        .await
                    {
                        error!(
                            ?err,
                            file = %order.file,
                            fragment = %order.fragment,
                            %receipt,
                            "failed to record claimed restoral order"
                        );
                        return Ok(Some(order.fragment));
                    }
                    info!(
                        file = %order.file,
                        fragment = %order.fragment,
                        %receipt,
                        "claimed restoral order"
                    );
                    return Ok(Some(order.fragment));
                }
                Err(err) => {
                    warn!(?err, fragment = %order.fragment, "failed to claim restoral order");
                }
            }
        }
        Ok(None)
    }
}
