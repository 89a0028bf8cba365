use super::Error;
use crate::{
    cache::{metadata_key, Cache, METADATA_PREFIX},
    store::Store,
    Digest,
};
use tracing::{debug, warn};

/// Where a list of roots came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    /// The directories of the local file store.
    Filesystem,
    /// The metadata index kept in the cache.
    Cache,
}

/// Finds the roots of files held by this miner.
///
/// The file store is listed directly when possible (refreshing the cache index as it goes) and
/// the cache index is used when the listing fails.
#[derive(Clone)]
pub struct Discovery<C: Cache> {
    store: Store,
    cache: C,
}

impl<C: Cache> Discovery<C> {
    pub fn new(store: Store, cache: C) -> Self {
        Self { store, cache }
    }

    /// List known roots, in sorted order.
    pub async fn roots(&self) -> Result<(Source, Vec<Digest>), Error> {
        match self.store.roots() {
            Ok(roots) => {
                for root in &roots {
                    if let Err(err) = self.cache.put(&metadata_key(root), &[]).await {
                        warn!(?err, %root, "failed to index root");
                    }
                }
                Ok((Source::Filesystem, roots))
            }
            Err(err) => {
                warn!(?err, "failed to list file store: falling back to index");
                let mut roots = Vec::new();
                for key in self.cache.keys(METADATA_PREFIX).await? {
                    match key.parse::<Digest>() {
                        Ok(root) => roots.push(root),
                        Err(_) => debug!(%key, "skipping invalid index entry"),
                    }
                }
                Ok((Source::Cache, roots))
            }
        }
    }

    /// Drop all local data for `root`.
    pub async fn forget(&self, root: &Digest) -> Result<(), Error> {
        self.store.remove_root(root)?;
        self.cache.delete(&metadata_key(root)).await?;
        Ok(())
    }
}
