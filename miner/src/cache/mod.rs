//! A durable key-value store for work that must survive restarts.
//!
//! # Overview
//!
//! The miner keeps two kinds of records in its [Cache], each under its own key prefix:
//!
//! - [METADATA_PREFIX]: root digests of files the miner stores. This is the fallback index used
//!   to discover stored files when the local file store cannot be listed.
//! - [RECOVERY_PREFIX]: restoral orders this miner has claimed but not yet completed, mapping the
//!   fragment digest to the digest of the file it belongs to.
//!
//! # Durability
//!
//! [Durable] syncs every mutation to [commonware_runtime::Storage] before returning. The state is
//! persisted to one of two blobs (`left` and `right`) in a single partition, always overwriting the
//! older of the two, so a crash mid-write leaves the previous state intact:
//!
//! ```text
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//! |    Version (u64)  | Count (u32)  | Len(K1) (u32)|  K1 |Len(V1) (u32)| V1 |...| CRC32 |
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//! ```
//!
//! On startup, any blob whose checksum does not match is ignored and the valid blob with the
//! higher version is loaded.

use crate::Digest;
use std::future::Future;
use thiserror::Error;

mod durable;
pub use durable::Durable;

/// Prefix of keys indexing the root digests of stored files.
pub const METADATA_PREFIX: &str = "metadata:";

/// Prefix of keys recording claimed restoral orders.
pub const RECOVERY_PREFIX: &str = "recovery:";

/// Returns the key under which `root` is indexed.
pub fn metadata_key(root: &Digest) -> String {
    format!("{}{}", METADATA_PREFIX, root)
}

/// Returns the key under which the claim on `fragment` is recorded.
pub fn recovery_key(fragment: &Digest) -> String {
    format!("{}{}", RECOVERY_PREFIX, fragment)
}

/// Errors that can occur when interacting with a [Cache].
#[derive(Debug, Error)]
pub enum Error {
    #[error("runtime error: {0}")]
    Runtime(#[from] commonware_runtime::Error),
    #[error("blob too large: {0}")]
    BlobTooLarge(u64),
}

/// Configuration for [Durable].
#[derive(Clone, Debug)]
pub struct Config {
    /// The [commonware_runtime::Storage] partition holding the `left` and `right` blobs.
    pub partition: String,
}

/// A key-value store addressed by string keys.
///
/// All mutations are upserts or deletes by key, so concurrent users never need to coordinate
/// beyond the store's own per-call atomicity.
pub trait Cache: Clone + Send + Sync + 'static {
    /// Returns the value stored at `key`, if any.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, Error>> + Send;

    /// Store `value` at `key`, replacing any existing value.
    fn put(&self, key: &str, value: &[u8]) -> impl Future<Output = Result<(), Error>> + Send;

    /// Remove `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), Error>> + Send;

    /// Returns the remainder of every key that starts with `prefix`, in sorted order.
    fn keys(&self, prefix: &str) -> impl Future<Output = Result<Vec<String>, Error>> + Send;
}
