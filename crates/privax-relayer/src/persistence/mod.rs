//! durable storage for the relayer state
//!
//! the state is persisted as four independent logical records: the leaf
//! sequence, the nullifier set, the deposit map and the withdrawal map. each
//! record is one json document so `load(save(state)) == state` holds exactly.
//!
//! backends only move bytes for a record; encoding and the read policy live
//! in the provided methods of [`StateStore`]:
//! - absent record: empty
//! - present but unreadable or undecodable: error (startup must abort)
//!
//! implementations:
//! - sled: embedded database, flushed on every write (default)
//! - json: one file per record in a data directory, atomic replace
//! - memory: in-process, for tests

pub mod json;
pub mod memory;
pub mod sled;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::records::{DepositRecord, WithdrawalRecord};

pub use self::json::JsonDirStore;
pub use self::memory::MemoryStore;
pub use self::sled::SledStore;

/// one of the four independently persisted structures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Leaves,
    Nullifiers,
    Deposits,
    Withdrawals,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Leaves,
        RecordKind::Nullifiers,
        RecordKind::Deposits,
        RecordKind::Withdrawals,
    ];

    /// storage key / file stem
    pub fn name(&self) -> &'static str {
        match self {
            RecordKind::Leaves => "leaves",
            RecordKind::Nullifiers => "nullifiers",
            RecordKind::Deposits => "deposits",
            RecordKind::Withdrawals => "withdrawals",
        }
    }
}

/// everything needed to rebuild the engine
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// leaf sequence in insertion order
    pub leaves: Vec<Digest>,
    /// nullifier set in ascending order
    pub nullifiers: Vec<Digest>,
    pub deposits: BTreeMap<Digest, DepositRecord>,
    pub withdrawals: BTreeMap<Digest, WithdrawalRecord>,
}

/// pluggable backend for persisting relayer state
///
/// implementors provide raw reads and writes of a single record; a write
/// must be durable when it returns `Ok`.
pub trait StateStore: Send + Sync {
    /// identifier for logging (e.g. "sled")
    fn id(&self) -> &'static str;

    /// raw bytes of a record, `None` if it was never written
    fn read_raw(&self, kind: RecordKind) -> Result<Option<Vec<u8>>>;

    /// replace a record
    fn write_raw(&self, kind: RecordKind, bytes: &[u8]) -> Result<()>;

    fn load(&self) -> Result<PersistedState> {
        let leaves: Vec<Digest> = decode(self, RecordKind::Leaves)?.unwrap_or_default();

        let mut nullifiers: Vec<Digest> = decode(self, RecordKind::Nullifiers)?.unwrap_or_default();
        nullifiers.sort_unstable();
        nullifiers.dedup();

        let deposits = decode(self, RecordKind::Deposits)?.unwrap_or_default();
        let withdrawals = decode(self, RecordKind::Withdrawals)?.unwrap_or_default();

        Ok(PersistedState {
            leaves,
            nullifiers,
            deposits,
            withdrawals,
        })
    }

    fn save_leaves(&self, leaves: &[Digest]) -> Result<()> {
        encode_and_write(self, RecordKind::Leaves, leaves)
    }

    fn save_nullifiers(&self, nullifiers: &[Digest]) -> Result<()> {
        encode_and_write(self, RecordKind::Nullifiers, nullifiers)
    }

    fn save_deposits(&self, deposits: &BTreeMap<Digest, DepositRecord>) -> Result<()> {
        encode_and_write(self, RecordKind::Deposits, deposits)
    }

    fn save_withdrawals(&self, withdrawals: &BTreeMap<Digest, WithdrawalRecord>) -> Result<()> {
        encode_and_write(self, RecordKind::Withdrawals, withdrawals)
    }

    /// write all four records
    fn save_all(&self, state: &PersistedState) -> Result<()> {
        self.save_leaves(&state.leaves)?;
        self.save_nullifiers(&state.nullifiers)?;
        self.save_deposits(&state.deposits)?;
        self.save_withdrawals(&state.withdrawals)
    }
}

fn decode<S, T>(store: &S, kind: RecordKind) -> Result<Option<T>>
where
    S: StateStore + ?Sized,
    T: DeserializeOwned,
{
    let Some(bytes) = store.read_raw(kind)? else {
        debug!("{}: no {} record, starting empty", store.id(), kind.name());
        return Ok(None);
    };

    let value = serde_json::from_slice(&bytes).map_err(|e| {
        Error::persistence(store.id(), format!("corrupt {} record: {}", kind.name(), e))
    })?;
    debug!("{}: loaded {} ({} bytes)", store.id(), kind.name(), bytes.len());
    Ok(Some(value))
}

fn encode_and_write<S, T>(store: &S, kind: RecordKind, value: &T) -> Result<()>
where
    S: StateStore + ?Sized,
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(value)
        .map_err(|e| Error::persistence(store.id(), format!("encode {}: {}", kind.name(), e)))?;
    store.write_raw(kind, &bytes)?;
    debug!("{}: saved {} ({} bytes)", store.id(), kind.name(), bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> PersistedState {
        let mut deposits = BTreeMap::new();
        deposits.insert(
            Digest([1u8; 32]),
            DepositRecord {
                depositor: "0xdepositor".into(),
                token: "0xtoken".into(),
                amount: u128::from(u64::MAX) + 7,
                timestamp: Some(1_700_000_000),
            },
        );
        let mut withdrawals = BTreeMap::new();
        withdrawals.insert(
            Digest([9u8; 32]),
            WithdrawalRecord {
                recipient: "0xrecipient".into(),
                token: "0xtoken".into(),
                amount: 3,
                commitment: Some(Digest([1u8; 32])),
                timestamp: None,
            },
        );
        PersistedState {
            leaves: vec![Digest([0u8; 32]), Digest([1u8; 32]), Digest([1u8; 32])],
            nullifiers: vec![Digest([8u8; 32]), Digest([9u8; 32])],
            deposits,
            withdrawals,
        }
    }

    #[test]
    fn test_memory_roundtrip_is_exact() {
        let store = MemoryStore::new();
        let state = sample_state();
        store.save_all(&state).unwrap();
        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn test_absent_records_load_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.load().unwrap(), PersistedState::default());
    }

    #[test]
    fn test_corrupt_record_is_an_error() {
        let store = MemoryStore::new();
        store.put_raw(RecordKind::Deposits, b"{not json".to_vec());
        let err = store.load().unwrap_err();
        assert!(matches!(err, Error::Persistence { store: "memory", .. }));
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_nullifiers_normalized_on_load() {
        let store = MemoryStore::new();
        let a = Digest([1u8; 32]);
        let b = Digest([2u8; 32]);
        store.save_nullifiers(&[b, a, b]).unwrap();
        assert_eq!(store.load().unwrap().nullifiers, vec![a, b]);
    }
}
