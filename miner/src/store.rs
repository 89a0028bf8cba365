//! Local storage of fragments.
//!
//! Fragments are stored at `files/<root>/<fragment>`, where `<root>` is the hex digest of the file
//! and `<fragment>` the hex digest of the fragment. Reconstruction happens in a scratch area at
//! `tmp/<root>/<segment>/`.

use crate::Digest;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Suffix of a fragment that is still being written.
const PARTIAL_EXTENSION: &str = "partial";

/// Fragments held by this miner.
#[derive(Clone, Debug)]
pub struct Store {
    files: PathBuf,
    tmp: PathBuf,
}

impl Store {
    /// Create a store rooted at `files`, using `tmp` as scratch space.
    pub fn new(files: impl Into<PathBuf>, tmp: impl Into<PathBuf>) -> Self {
        Self {
            files: files.into(),
            tmp: tmp.into(),
        }
    }

    /// Create the store's directories if they do not exist.
    pub fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.files)?;
        fs::create_dir_all(&self.tmp)
    }

    /// Returns the path at which `fragment` of `root` is stored.
    pub fn fragment_path(&self, root: &Digest, fragment: &Digest) -> PathBuf {
        self.files.join(root.to_string()).join(fragment.to_string())
    }

    /// Returns true if `fragment` of `root` is present.
    pub fn has_fragment(&self, root: &Digest, fragment: &Digest) -> bool {
        self.fragment_path(root, fragment).is_file()
    }

    /// Returns the scratch directory used to rebuild `segment` of `root`.
    pub fn workspace(&self, root: &Digest, segment: &Digest) -> PathBuf {
        self.tmp.join(root.to_string()).join(segment.to_string())
    }

    /// Remove the scratch directory of `segment` of `root`, along with the root's scratch directory
    /// once nothing else is being rebuilt under it.
    pub fn clear_workspace(&self, root: &Digest, segment: &Digest) {
        remove_all(&self.workspace(root, segment));
        let parent = self.tmp.join(root.to_string());
        if let Err(err) = fs::remove_dir(&parent) {
            if err.kind() != io::ErrorKind::NotFound {
                debug!(?err, ?parent, "scratch directory kept");
            }
        }
    }

    /// List the roots of all files with a local directory, in sorted order.
    ///
    /// Entries that are not directories named by a digest are ignored.
    pub fn roots(&self) -> io::Result<Vec<Digest>> {
        let mut roots = Vec::new();
        for entry in fs::read_dir(&self.files)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().map(str::parse::<Digest>) {
                Some(Ok(root)) => roots.push(root),
                _ => debug!(?name, "skipping unrecognized directory"),
            }
        }
        roots.sort();
        Ok(roots)
    }

    /// Remove all fragments of `root`.
    pub fn remove_root(&self, root: &Digest) -> io::Result<()> {
        match fs::remove_dir_all(self.files.join(root.to_string())) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    /// Write `data` as `fragment` of `root`.
    pub fn put_fragment(&self, root: &Digest, fragment: &Digest, data: &[u8]) -> io::Result<()> {
        write_atomic(&self.fragment_path(root, fragment), data)
    }

    /// Copy `fragment` held under `from` to the same fragment under `to`.
    pub fn copy_fragment(&self, from: &Digest, to: &Digest, fragment: &Digest) -> io::Result<u64> {
        let destination = self.fragment_path(to, fragment);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let partial = destination.with_extension(PARTIAL_EXTENSION);
        let copied = fs::copy(self.fragment_path(from, fragment), &partial)?;
        fs::rename(partial, destination)?;
        Ok(copied)
    }
}

/// Write `data` to `path` such that readers never observe a partial file.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let partial = path.with_extension(PARTIAL_EXTENSION);
    fs::write(&partial, data)?;
    fs::rename(partial, path)
}

/// Remove `path` and everything beneath it, ignoring a missing path.
fn remove_all(path: &Path) {
    if let Err(err) = fs::remove_dir_all(path) {
        if err.kind() != io::ErrorKind::NotFound {
            debug!(?err, ?path, "failed to remove directory");
        }
    }
}
