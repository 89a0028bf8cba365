use super::Error;
use crate::{
    codec::Reconstructor,
    store::Store,
    Digest, Fragment, Ledger, Segment, Transport,
};
use std::{fs, path::Path};
use tracing::{debug, warn};

/// Returns the number of sibling fragments required to rebuild one fragment of a segment with
/// `fragments` fragments.
pub fn quorum(fragments: usize) -> usize {
    (fragments * 2 / 3).max(1)
}

/// How a fragment was restored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Restored {
    /// Copied from the directory of another root holding the same fragment.
    Copied { from: Digest },
    /// Rebuilt from `fetched` sibling fragments.
    Reconstructed { fetched: usize },
}

/// Restores a single fragment into the local store.
#[derive(Clone)]
pub struct Recovery<L: Ledger, T: Transport, R: Reconstructor> {
    ledger: L,
    transport: T,
    reconstructor: R,
    store: Store,
    fragment_size: u64,
}

impl<L: Ledger, T: Transport, R: Reconstructor> Recovery<L, T, R> {
    pub fn new(ledger: L, transport: T, reconstructor: R, store: Store, fragment_size: u64) -> Self {
        Self {
            ledger,
            transport,
            reconstructor,
            store,
            fragment_size,
        }
    }

    /// Restore `fragment` of `segment` to its path under `root`.
    ///
    /// `roots` are the other files held locally that may already contain the fragment.
    pub async fn restore(
        &mut self,
        root: &Digest,
        fragment: &Digest,
        segment: &Segment,
        roots: &[Digest],
    ) -> Result<Restored, Error> {
        for other in roots.iter().filter(|other| *other != root) {
            if !self.store.has_fragment(other, fragment) {
                continue;
            }
            match self.store.copy_fragment(other, root, fragment) {
                Ok(_) => {
                    debug!(%root, %fragment, from = %other, "copied fragment");
                    return Ok(Restored::Copied { from: *other });
                }
                Err(err) => warn!(?err, %root, %fragment, from = %other, "failed to copy fragment"),
            }
        }
        if !segment.contains(fragment) {
            return Err(Error::UnknownFragment(*fragment));
        }

        // Always start from (and leave behind) an empty workspace
        let workspace = self.store.workspace(root, &segment.hash);
        self.store.clear_workspace(root, &segment.hash);
        fs::create_dir_all(&workspace)?;
        let result = self.reconstruct(root, fragment, segment, &workspace).await;
        self.store.clear_workspace(root, &segment.hash);
        result
    }

    async fn reconstruct(
        &mut self,
        root: &Digest,
        fragment: &Digest,
        segment: &Segment,
        workspace: &Path,
    ) -> Result<Restored, Error> {
        let required = quorum(segment.fragments.len());
        let mut fetched = 0;
        for sibling in segment.fragments.iter().filter(|f| &f.hash != fragment) {
            if fetched >= required {
                break;
            }
            match self.fetch(root, sibling, workspace).await {
                Ok(()) => fetched += 1,
                Err(err) => debug!(
                    ?err,
                    %root,
                    sibling = %sibling.hash,
                    miner = %sibling.miner,
                    "failed to fetch sibling"
                ),
            }
        }
        if fetched < required {
            return Err(Error::Insufficient { fetched, required });
        }

        let destination = self.store.fragment_path(root, fragment);
        self.reconstructor
            .reconstruct(workspace, segment, fragment, &destination)?;
        if !destination.is_file() {
            return Err(Error::Missing);
        }
        debug!(%root, %fragment, fetched, "reconstructed fragment");
        Ok(Restored::Reconstructed { fetched })
    }

    /// Fetch `sibling` from the miner holding it into `workspace`.
    async fn fetch(
        &mut self,
        root: &Digest,
        sibling: &Fragment,
        workspace: &Path,
    ) -> Result<(), Error> {
        let info = self.ledger.miner(&sibling.miner).await?;
        let path = workspace.join(sibling.hash.to_string());
        let result = self
            .transport
            .fetch(&info.peer_id, root, &sibling.hash, &path, self.fragment_size)
            .await
            .map_err(Error::Transport)
            .and_then(|()| Ok(fs::read(&path)?))
            .and_then(|data| {
                if Digest::of(&data) != sibling.hash {
                    return Err(Error::Corrupt(sibling.hash));
                }
                Ok(())
            });
        if result.is_err() {
            let _ = fs::remove_file(&path);
        }
        result
    }
}
