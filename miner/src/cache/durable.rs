use super::{Cache, Config, Error};
use bytes::{Buf, BufMut};
use commonware_runtime::{Blob, Storage};
use futures::lock::Mutex;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, warn};

const BLOB_NAMES: [&[u8]; 2] = [b"left", b"right"];

/// Version, entry count, and checksum.
const MIN_BLOB_LENGTH: usize = 8 + 4 + 4;

type Entries = BTreeMap<String, Vec<u8>>;

struct State<B: Blob> {
    blobs: [B; 2],

    /// Index of the blob holding the latest state.
    cursor: usize,
    version: u64,
    entries: Entries,
}

/// A [Cache] that syncs every mutation before returning.
///
/// Clones share the same underlying state.
#[derive(Clone)]
pub struct Durable<E: Storage> {
    state: Arc<Mutex<State<E::Blob>>>,
}

impl<E: Storage> Durable<E> {
    /// Open (or create) the store in `cfg.partition`, recovering the latest intact state.
    pub async fn init(context: E, cfg: Config) -> Result<Self, Error> {
        let (left, left_len) = context.open(&cfg.partition, BLOB_NAMES[0]).await?;
        let (right, right_len) = context.open(&cfg.partition, BLOB_NAMES[1]).await?;
        let left_state = Self::load(&left, left_len).await?;
        let right_state = Self::load(&right, right_len).await?;

        // Choose the newest intact blob (the next write goes to the other one)
        let (cursor, version, entries) = match (left_state, right_state) {
            (Some((left_version, left)), Some((right_version, right))) => {
                if right_version > left_version {
                    (1, right_version, right)
                } else {
                    (0, left_version, left)
                }
            }
            (Some((version, entries)), None) => (0, version, entries),
            (None, Some((version, entries))) => (1, version, entries),
            (None, None) => (1, 0, Entries::new()),
        };
        debug!(version, keys = entries.len(), "loaded cache");

        Ok(Self {
            state: Arc::new(Mutex::new(State {
                blobs: [left, right],
                cursor,
                version,
                entries,
            })),
        })
    }

    async fn load(blob: &E::Blob, len: u64) -> Result<Option<(u64, Entries)>, Error> {
        let len = usize::try_from(len).map_err(|_| Error::BlobTooLarge(len))?;
        if len < MIN_BLOB_LENGTH {
            if len != 0 {
                debug!(len, "blob truncated: ignoring");
            }
            return Ok(None);
        }
        let buf = blob.read_at(vec![0u8; len], 0).await?;

        // Verify integrity
        let (body, mut checksum) = buf.as_ref().split_at(len - 4);
        let stored = checksum.get_u32();
        let computed = crc32fast::hash(body);
        if stored != computed {
            warn!(stored, computed, "checksum mismatch: ignoring");
            return Ok(None);
        }
        let decoded = Self::decode(body);
        if decoded.is_none() {
            warn!("malformed blob: ignoring");
        }
        Ok(decoded)
    }

    fn decode(mut body: &[u8]) -> Option<(u64, Entries)> {
        let version = body.get_u64();
        let count = body.get_u32();
        let mut entries = Entries::new();
        for _ in 0..count {
            let key = Self::read_field(&mut body)?;
            let value = Self::read_field(&mut body)?;
            entries.insert(String::from_utf8(key).ok()?, value);
        }
        if body.has_remaining() {
            return None;
        }
        Some((version, entries))
    }

    fn read_field(buf: &mut &[u8]) -> Option<Vec<u8>> {
        if buf.remaining() < 4 {
            return None;
        }
        let len = buf.get_u32() as usize;
        if buf.remaining() < len {
            return None;
        }
        Some(buf.copy_to_bytes(len).to_vec())
    }

    fn write_field(buf: &mut Vec<u8>, field: &[u8]) -> Result<(), Error> {
        let len = u32::try_from(field.len()).map_err(|_| Error::BlobTooLarge(field.len() as u64))?;
        buf.put_u32(len);
        buf.put_slice(field);
        Ok(())
    }

    /// Write the current entries to the older blob and make it the latest.
    async fn persist(state: &mut State<E::Blob>) -> Result<(), Error> {
        let version = state.version + 1;
        let count = u32::try_from(state.entries.len())
            .map_err(|_| Error::BlobTooLarge(state.entries.len() as u64))?;
        let mut buf = Vec::new();
        buf.put_u64(version);
        buf.put_u32(count);
        for (key, value) in &state.entries {
            Self::write_field(&mut buf, key.as_bytes())?;
            Self::write_field(&mut buf, value)?;
        }
        let checksum = crc32fast::hash(&buf);
        buf.put_u32(checksum);

        let target = 1 - state.cursor;
        let len = buf.len() as u64;
        let blob = &state.blobs[target];
        blob.write_at(buf, 0).await?;
        blob.resize(len).await?;
        blob.sync().await?;

        state.cursor = target;
        state.version = version;
        Ok(())
    }

    /// Apply `previous` at `key` if persisting a mutation failed.
    fn rollback(state: &mut State<E::Blob>, key: &str, previous: Option<Vec<u8>>) {
        match previous {
            Some(value) => state.entries.insert(key.to_string(), value),
            None => state.entries.remove(key),
        };
    }
}

impl<E: Storage> Cache for Durable<E> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let state = self.state.lock().await;
        Ok(state.entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        if state.entries.get(key).map(Vec::as_slice) == Some(value) {
            return Ok(());
        }
        let previous = state.entries.insert(key.to_string(), value.to_vec());
        if let Err(err) = Self::persist(&mut state).await {
            Self::rollback(&mut state, key, previous);
            return Err(err);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        let Some(previous) = state.entries.remove(key) else {
            return Ok(());
        };
        if let Err(err) = Self::persist(&mut state).await {
            Self::rollback(&mut state, key, Some(previous));
            return Err(err);
        }
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let state = self.state.lock().await;
        Ok(state
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key[prefix.len()..].to_string())
            .collect())
    }
}
