//! Rebuild a lost fragment from the surviving fragments of its segment.
//!
//! # Layout
//!
//! A segment is encoded into `data_shards` original shards followed by `parity_shards` recovery
//! shards, in the order the fragments appear in [Segment::fragments]. Any `data_shards` of them
//! are enough to rebuild every other shard.

use crate::{store::write_atomic, Digest, Segment};
use reed_solomon_simd::{ReedSolomonDecoder, ReedSolomonEncoder};
use std::{fs, io, path::Path};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur when encoding or reconstructing a segment.
#[derive(Debug, Error)]
pub enum Error {
    #[error("segment has {0} fragments, expected {1}")]
    InvalidLayout(usize, usize),
    #[error("fragment not in segment: {0}")]
    UnknownFragment(Digest),
    #[error("not enough shards: {0} < {1}")]
    NotEnoughShards(usize, usize),
    #[error("invalid shard size: {0}")]
    InvalidShardSize(usize),
    #[error("inconsistent shards")]
    Inconsistent,
    #[error("rebuilt fragment does not match digest: {0}")]
    DigestMismatch(Digest),
    #[error("reed-solomon error: {0}")]
    ReedSolomon(#[from] reed_solomon_simd::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Rebuilds a target fragment from whatever sibling fragments are present in a work directory.
pub trait Reconstructor: Clone + Send + Sync + 'static {
    /// Rebuild `target` of `segment` into `destination`.
    ///
    /// Siblings are read from files in `workspace` named by their hex digest.
    fn reconstruct(
        &self,
        workspace: &Path,
        segment: &Segment,
        target: &Digest,
        destination: &Path,
    ) -> Result<(), Error>;
}

/// Configuration for [ReedSolomon].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Number of original shards per segment.
    pub data_shards: usize,
    /// Number of recovery shards per segment.
    pub parity_shards: usize,
}

impl Config {
    /// Total number of fragments per segment.
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }
}

/// Encode `data` into `cfg.total_shards()` equally sized shards.
///
/// The data is zero-padded so that it splits into `cfg.data_shards` shards of even length.
pub fn encode(cfg: &Config, data: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    let mut shard_size = data.len().div_ceil(cfg.data_shards).max(2);
    if shard_size % 2 != 0 {
        shard_size += 1;
    }
    let mut padded = data.to_vec();
    padded.resize(shard_size * cfg.data_shards, 0);

    let mut shards: Vec<Vec<u8>> = padded.chunks(shard_size).map(<[u8]>::to_vec).collect();
    let mut encoder = ReedSolomonEncoder::new(cfg.data_shards, cfg.parity_shards, shard_size)?;
    for shard in &shards {
        encoder.add_original_shard(shard)?;
    }
    let recovery = encoder
        .encode()?
        .recovery_iter()
        .map(<[u8]>::to_vec)
        .collect::<Vec<_>>();
    shards.extend(recovery);
    Ok(shards)
}

/// A [Reconstructor] backed by Reed-Solomon coding.
#[derive(Clone, Debug)]
pub struct ReedSolomon {
    cfg: Config,
}

impl ReedSolomon {
    pub fn new(cfg: Config) -> Self {
        Self { cfg }
    }

    /// Read every sibling present in `workspace`, returning `(index, bytes)` pairs.
    fn read_shards(workspace: &Path, segment: &Segment) -> Result<Vec<(usize, Vec<u8>)>, Error> {
        let mut shards = Vec::new();
        for (index, fragment) in segment.fragments.iter().enumerate() {
            match fs::read(workspace.join(fragment.hash.to_string())) {
                Ok(bytes) => shards.push((index, bytes)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(shards)
    }

    /// Recover all original shards from the provided shards.
    fn originals(
        &self,
        shards: Vec<(usize, Vec<u8>)>,
        shard_size: usize,
    ) -> Result<Vec<Vec<u8>>, Error> {
        let k = self.cfg.data_shards;
        let m = self.cfg.parity_shards;
        let mut originals: Vec<Option<Vec<u8>>> = vec![None; k];
        let mut recoveries = Vec::new();
        for (index, shard) in shards {
            if index < k {
                originals[index] = Some(shard);
            } else {
                recoveries.push((index - k, shard));
            }
        }

        // Only decode if an original is missing
        if originals.iter().any(Option::is_none) {
            let mut decoder = ReedSolomonDecoder::new(k, m, shard_size)?;
            for (index, shard) in originals.iter().enumerate() {
                if let Some(shard) = shard {
                    decoder.add_original_shard(index, shard)?;
                }
            }
            for (index, shard) in &recoveries {
                decoder.add_recovery_shard(*index, shard)?;
            }
            let result = decoder.decode()?;
            for (index, shard) in result.restored_original_iter() {
                originals[index] = Some(shard.to_vec());
            }
        }
        originals
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(Error::Inconsistent)
    }
}

impl Reconstructor for ReedSolomon {
    fn reconstruct(
        &self,
        workspace: &Path,
        segment: &Segment,
        target: &Digest,
        destination: &Path,
    ) -> Result<(), Error> {
        let total = self.cfg.total_shards();
        if segment.fragments.len() != total {
            return Err(Error::InvalidLayout(segment.fragments.len(), total));
        }
        let position = segment
            .fragments
            .iter()
            .position(|f| &f.hash == target)
            .ok_or(Error::UnknownFragment(*target))?;

        // Gather siblings (never trust a stale copy of the target)
        let mut shards = Self::read_shards(workspace, segment)?;
        shards.retain(|(index, _)| *index != position);
        if shards.len() < self.cfg.data_shards {
            return Err(Error::NotEnoughShards(shards.len(), self.cfg.data_shards));
        }
        let shard_size = shards[0].1.len();
        if shard_size == 0 || shard_size % 2 != 0 {
            return Err(Error::InvalidShardSize(shard_size));
        }
        if shards.iter().any(|(_, shard)| shard.len() != shard_size) {
            return Err(Error::Inconsistent);
        }
        debug!(
            segment = %segment.hash,
            fragment = %target,
            shards = shards.len(),
            "reconstructing fragment"
        );

        // Rebuild the target
        let originals = self.originals(shards, shard_size)?;
        let rebuilt = if position < self.cfg.data_shards {
            originals[position].clone()
        } else {
            let mut encoder = ReedSolomonEncoder::new(
                self.cfg.data_shards,
                self.cfg.parity_shards,
                shard_size,
            )?;
            for shard in &originals {
                encoder.add_original_shard(shard)?;
            }
            let result = encoder.encode()?;
            let rebuilt = result
                .recovery_iter()
                .nth(position - self.cfg.data_shards)
                .map(<[u8]>::to_vec);
            rebuilt.ok_or(Error::Inconsistent)?
        };
        if Digest::of(&rebuilt) != *target {
            return Err(Error::DigestMismatch(*target));
        }
        write_atomic(destination, &rebuilt)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mocks, Fragment, PublicKey};
    use test_case::test_case;

    const CONFIG: Config = Config {
        data_shards: 4,
        parity_shards: 2,
    };

    fn segment(shards: &[Vec<u8>]) -> Segment {
        Segment {
            hash: Digest::of(b"segment"),
            fragments: shards
                .iter()
                .map(|shard| Fragment {
                    hash: Digest::of(shard),
                    miner: PublicKey::from([0; 32]),
                })
                .collect(),
        }
    }

    #[test]
    fn test_encode_shapes() {
        let shards = encode(&CONFIG, b"hello world").unwrap();
        assert_eq!(shards.len(), 6);
        assert!(shards.iter().all(|s| s.len() == 4));
        assert_eq!(&shards[0], b"hell");
        assert_eq!(&shards[2], b"rld\0");
    }

    #[test_case(0, &[1, 2, 3, 4]; "original from originals")]
    #[test_case(1, &[0, 3, 4, 5]; "original from mixed")]
    #[test_case(5, &[0, 1, 2, 3]; "parity from originals")]
    #[test_case(4, &[1, 2, 3, 5]; "parity from mixed")]
    fn test_reconstruct(target: usize, available: &[usize]) {
        let directory = mocks::directory("codec_reconstruct");
        let workspace = directory.join("workspace");
        fs::create_dir_all(&workspace).unwrap();
        let shards = encode(&CONFIG, &[7u8; 1000]).unwrap();
        let segment = segment(&shards);
        for index in available {
            let fragment = &segment.fragments[*index];
            fs::write(workspace.join(fragment.hash.to_string()), &shards[*index]).unwrap();
        }

        let destination = directory.join("out").join("fragment");
        let target_hash = segment.fragments[target].hash;
        ReedSolomon::new(CONFIG)
            .reconstruct(&workspace, &segment, &target_hash, &destination)
            .unwrap();
        assert_eq!(fs::read(&destination).unwrap(), shards[target]);
        fs::remove_dir_all(directory).unwrap();
    }

    #[test]
    fn test_not_enough_shards() {
        let directory = mocks::directory("codec_not_enough");
        fs::create_dir_all(&directory).unwrap();
        let shards = encode(&CONFIG, &[1u8; 64]).unwrap();
        let segment = segment(&shards);
        for index in [1, 2, 3] {
            let fragment = &segment.fragments[index];
            fs::write(directory.join(fragment.hash.to_string()), &shards[index]).unwrap();
        }
        let destination = directory.join("fragment");
        let result = ReedSolomon::new(CONFIG).reconstruct(
            &directory,
            &segment,
            &segment.fragments[0].hash,
            &destination,
        );
        assert!(matches!(result, Err(Error::NotEnoughShards(3, 4))));
        assert!(!destination.exists());
        fs::remove_dir_all(directory).unwrap();
    }

    #[test]
    fn test_corrupt_sibling_detected() {
        let directory = mocks::directory("codec_corrupt");
        fs::create_dir_all(&directory).unwrap();
        let shards = encode(&CONFIG, &[3u8; 64]).unwrap();
        let segment = segment(&shards);
        for index in [1, 2, 3, 4] {
            let mut shard = shards[index].clone();
            if index == 4 {
                shard[0] ^= 0xff;
            }
            let fragment = &segment.fragments[index];
            fs::write(directory.join(fragment.hash.to_string()), &shard).unwrap();
        }
        let destination = directory.join("fragment");
        let result = ReedSolomon::new(CONFIG).reconstruct(
            &directory,
            &segment,
            &segment.fragments[0].hash,
            &destination,
        );
        assert!(matches!(result, Err(Error::DigestMismatch(_))));
        assert!(!destination.exists());
        fs::remove_dir_all(directory).unwrap();
    }

    #[test]
    fn test_invalid_layout() {
        let shards = encode(&CONFIG, &[1u8; 8]).unwrap();
        let mut segment = segment(&shards);
        segment.fragments.pop();
        let result = ReedSolomon::new(CONFIG).reconstruct(
            Path::new("/nonexistent"),
            &segment,
            &segment.fragments[0].hash,
            Path::new("/nonexistent/fragment"),
        );
        assert!(matches!(result, Err(Error::InvalidLayout(5, 6))));
    }
}
