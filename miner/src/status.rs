//! Summarize the miner's registration on the ledger.

use crate::{Error, Ledger, MinerInfo, PeerId, PublicKey};
use std::fmt;

const KIB: u128 = 1 << 10;
const MIB: u128 = 1 << 20;
const GIB: u128 = 1 << 30;
const TIB: u128 = 1 << 40;
const PIB: u128 = 1 << 50;
const EIB: u128 = 1 << 60;

/// An amount of storage, rendered with binary units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Space(pub u128);

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        for (unit, name) in [
            (EIB, "EiB"),
            (PIB, "PiB"),
            (TIB, "TiB"),
            (GIB, "GiB"),
            (MIB, "MiB"),
            (KIB, "KiB"),
        ] {
            if bytes >= unit {
                return write!(f, "{:.2} {}", bytes as f64 / unit as f64, name);
            }
        }
        write!(f, "{} Bytes", bytes)
    }
}

/// The miner's registration as reported by the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub peer_id: PeerId,
    pub state: String,
    pub declared: Space,
    pub validated: Space,
    pub used: Space,
    pub locked: Space,
}

impl From<MinerInfo> for Status {
    fn from(info: MinerInfo) -> Self {
        Self {
            peer_id: info.peer_id,
            state: info.state,
            declared: Space(info.declaration_space),
            validated: Space(info.idle_space),
            used: Space(info.service_space),
            locked: Space(info.lock_space),
        }
    }
}

/// Fetch the status of `miner`.
///
/// Returns [Error::NotFound] if the miner is not registered.
pub async fn query(ledger: &mut impl Ledger, miner: &PublicKey) -> Result<Status, Error> {
    ledger.miner(miner).await.map(Status::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks;
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Runner};
    use test_case::test_case;

    #[test_case(0, "0 Bytes")]
    #[test_case(1023, "1023 Bytes")]
    #[test_case(1024, "1.00 KiB")]
    #[test_case(1536, "1.50 KiB")]
    #[test_case(8 * MIB, "8.00 MiB")]
    #[test_case(3 * GIB / 2, "1.50 GiB")]
    #[test_case(2 * TIB, "2.00 TiB")]
    #[test_case(5 * PIB, "5.00 PiB")]
    #[test_case(EIB, "1.00 EiB")]
    #[test_case(2048 * EIB, "2048.00 EiB")]
    fn test_space_display(bytes: u128, expected: &str) {
        assert_eq!(Space(bytes).to_string(), expected);
    }

    #[test_traced]
    fn test_query() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let mut ledger = mocks::Ledger::default();
            let miner = PublicKey::from([7; 32]);
            assert_eq!(
                query(&mut ledger, &miner).await.unwrap_err(),
                Error::NotFound
            );

            ledger.register(miner, mocks::peer(7));
            let status = query(&mut ledger, &miner).await.unwrap();
            assert_eq!(status.peer_id, mocks::peer(7));
            assert_eq!(status.state, "positive");
            assert_eq!(status.declared.to_string(), "1.00 TiB");
        });
    }
}
