//! relayer state engine
//!
//! orchestrates the accumulator, the nullifier ledger and the record store
//! behind two recording operations. every mutation runs under one write lock,
//! including its persistence, so the nullifier check and insert cannot be
//! interleaved with another withdrawal. queries take the read lock.
//!
//! persistence is synchronous. when a save fails the in-memory mutation
//! stands, the affected record is remembered as pending and the caller gets
//! `Error::Persistence`. pending records are retried by the next mutation,
//! by repeating the failed withdrawal, or by [`RelayerEngine::persist`].

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::digest::{zero_commitment, Digest, DigestHasher, Sha256Hasher};
use crate::error::{Error, Result};
use crate::merkle::{MerkleAccumulator, MerklePath};
use crate::nullifier::NullifierSet;
use crate::persistence::{PersistedState, RecordKind, StateStore};
use crate::records::{DepositRecord, RecordStore, WithdrawalRecord};

// === inputs ===

/// deposit observed by an event source
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvent {
    pub depositor: String,
    pub token: String,
    pub amount: u128,
    pub commitment: Digest,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

/// withdrawal observed on chain, already authorized there
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalEvent {
    pub nullifier: Digest,
    pub recipient: String,
    pub token: String,
    pub amount: u128,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

/// withdrawal to record; `commitment` set means it must be in the tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub nullifier: Digest,
    pub recipient: String,
    pub token: String,
    pub amount: u128,
    pub commitment: Option<Digest>,
    pub timestamp: Option<u64>,
}

impl From<WithdrawalEvent> for WithdrawalRequest {
    fn from(event: WithdrawalEvent) -> Self {
        Self {
            nullifier: event.nullifier,
            recipient: event.recipient,
            token: event.token,
            amount: event.amount,
            commitment: None,
            timestamp: event.timestamp,
        }
    }
}

// === outputs ===

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DepositReceipt {
    pub leaf_index: usize,
    pub root: Digest,
}

/// accepted withdrawal
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WithdrawalReceipt {
    pub nullifier: Digest,
    pub recipient: String,
    pub token: String,
    pub amount: u128,
    /// inclusion path of the spent commitment, when one was supplied
    pub merkle_path: Option<MerklePath>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ZeroCommitmentInfo {
    pub zero_commitment: Digest,
    pub is_in_tree: bool,
    pub leaf_index: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub leaf_count: usize,
    pub nullifier_count: usize,
    pub deposit_count: usize,
    pub withdrawal_count: usize,
    pub root: Option<Digest>,
    /// false while some mutation has not reached the store
    pub durable: bool,
    pub hasher: &'static str,
    pub store: &'static str,
}

/// event source -> engine contract
///
/// listeners call these once per on-chain event (at least once; redelivery
/// appends a duplicate leaf or re-upserts a record).
pub trait EventSink: Send + Sync {
    fn on_deposit(&self, event: DepositEvent) -> Result<DepositReceipt>;

    fn on_withdrawal(&self, event: WithdrawalEvent) -> Result<WithdrawalReceipt>;
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn on_deposit(&self, event: DepositEvent) -> Result<DepositReceipt> {
        (**self).on_deposit(event)
    }

    fn on_withdrawal(&self, event: WithdrawalEvent) -> Result<WithdrawalReceipt> {
        (**self).on_withdrawal(event)
    }
}

// === engine ===

struct State<H> {
    tree: MerkleAccumulator<H>,
    nullifiers: NullifierSet,
    records: RecordStore,
    /// records mutated in memory but not yet saved
    pending: BTreeSet<RecordKind>,
    /// accepted withdrawals whose nullifier or record is not saved yet
    unsaved_withdrawals: HashSet<Digest>,
}

pub struct RelayerEngine<H = Sha256Hasher> {
    state: RwLock<State<H>>,
    store: Box<dyn StateStore>,
}

impl<H: DigestHasher> RelayerEngine<H> {
    /// restore from `store`, seeding and persisting genesis on first run
    ///
    /// fails if a persisted record exists but cannot be read, or if the
    /// genesis leaf cannot be saved.
    pub fn open(store: Box<dyn StateStore>, hasher: H) -> Result<Self> {
        info!("opening relayer state (store: {}, hasher: {})", store.id(), hasher.id());
        let persisted = store.load()?;

        let nullifiers: NullifierSet = persisted.nullifiers.into_iter().collect();
        let records = RecordStore::from_parts(persisted.deposits, persisted.withdrawals);

        let tree = if persisted.leaves.is_empty() {
            let tree = MerkleAccumulator::genesis(hasher);
            store.save_leaves(tree.leaves())?;
            info!("initialized merkle tree with zero commitment");
            tree
        } else {
            info!("initializing merkle tree with {} persisted leaves", persisted.leaves.len());
            MerkleAccumulator::from_leaves(hasher, persisted.leaves)
        };

        info!(
            "relayer initialized with {} leaves and {} used nullifiers",
            tree.len(),
            nullifiers.len()
        );
        if let Some(root) = tree.root() {
            info!("current merkle root: {}", root);
        }

        Ok(Self {
            state: RwLock::new(State {
                tree,
                nullifiers,
                records,
                pending: BTreeSet::new(),
                unsaved_withdrawals: HashSet::new(),
            }),
            store,
        })
    }

    /// record a deposit: upsert its record, append its commitment, persist
    pub fn record_deposit(&self, event: DepositEvent) -> Result<DepositReceipt> {
        let mut state = self.state.write();
        let commitment = event.commitment;
        info!("processing deposit: {}...", commitment.short());

        let record = DepositRecord {
            depositor: event.depositor,
            token: event.token,
            amount: event.amount,
            timestamp: event.timestamp,
        };
        if let Some(previous) = state.records.put_deposit(commitment, record) {
            warn!(
                "deposit record for {}... overwritten (previous amount {})",
                commitment.short(),
                previous.amount
            );
        }

        let (leaf_index, root) = state.tree.append(commitment);
        state.pending.insert(RecordKind::Deposits);
        state.pending.insert(RecordKind::Leaves);

        self.flush_pending(&mut state)?;

        info!("deposit processed at leaf {}, new merkle root: {}...", leaf_index, root.short());
        Ok(DepositReceipt { leaf_index, root })
    }

    /// record a withdrawal, rejecting a spent nullifier before any mutation
    ///
    /// the nullifier is checked first, then the commitment. a repeat of a
    /// withdrawal whose save failed is treated as a retry: pending records are
    /// saved again and the original receipt is returned once they are durable.
    pub fn record_withdrawal(&self, request: WithdrawalRequest) -> Result<WithdrawalReceipt> {
        let mut state = self.state.write();
        let nullifier = request.nullifier;
        info!("processing withdrawal for nullifier: {}...", nullifier.short());

        if state.nullifiers.contains(&nullifier) {
            if state.unsaved_withdrawals.contains(&nullifier) {
                info!("retrying save of withdrawal {}...", nullifier.short());
                self.flush_pending(&mut state)?;
                return Self::stored_receipt(&state, request);
            }
            warn!("nullifier already used: {}...", nullifier.short());
            if !state.pending.is_empty() {
                // failures are logged and stay pending
                let _ = self.flush_pending(&mut state);
            }
            return Err(Error::NullifierAlreadyUsed(nullifier));
        }

        let merkle_path = match request.commitment {
            Some(commitment) => match state.tree.index_of(&commitment) {
                Some(index) => Some(state.tree.path_at(index)?),
                None => {
                    warn!("commitment not found in merkle tree: {}...", commitment.short());
                    return Err(Error::CommitmentNotFound(commitment));
                }
            },
            None => None,
        };

        state.nullifiers.insert(nullifier);
        state.records.put_withdrawal(
            nullifier,
            WithdrawalRecord {
                recipient: request.recipient.clone(),
                token: request.token.clone(),
                amount: request.amount,
                commitment: request.commitment,
                timestamp: request.timestamp,
            },
        );
        state.unsaved_withdrawals.insert(nullifier);
        state.pending.insert(RecordKind::Nullifiers);
        state.pending.insert(RecordKind::Withdrawals);

        self.flush_pending(&mut state)?;

        info!("withdrawal accepted for nullifier: {}...", nullifier.short());
        Ok(WithdrawalReceipt {
            nullifier,
            recipient: request.recipient,
            token: request.token,
            amount: request.amount,
            merkle_path,
        })
    }

    /// receipt of an already accepted withdrawal, from its stored record
    fn stored_receipt(state: &State<H>, request: WithdrawalRequest) -> Result<WithdrawalReceipt> {
        let Some(record) = state.records.withdrawal(&request.nullifier) else {
            return Ok(WithdrawalReceipt {
                nullifier: request.nullifier,
                recipient: request.recipient,
                token: request.token,
                amount: request.amount,
                merkle_path: None,
            });
        };

        let merkle_path = match record.commitment.and_then(|c| state.tree.index_of(&c)) {
            Some(index) => Some(state.tree.path_at(index)?),
            None => None,
        };
        Ok(WithdrawalReceipt {
            nullifier: request.nullifier,
            recipient: record.recipient.clone(),
            token: record.token.clone(),
            amount: record.amount,
            merkle_path,
        })
    }

    /// explicit withdrawal submission: the spent commitment must be in the tree
    pub fn submit_withdrawal(
        &self,
        nullifier: Digest,
        commitment: Digest,
        recipient: impl Into<String>,
        token: impl Into<String>,
        amount: u128,
    ) -> Result<WithdrawalReceipt> {
        self.record_withdrawal(WithdrawalRequest {
            nullifier,
            recipient: recipient.into(),
            token: token.into(),
            amount,
            commitment: Some(commitment),
            timestamp: unix_now(),
        })
    }

    /// retry saving every record that previously failed to persist
    pub fn persist(&self) -> Result<()> {
        let mut state = self.state.write();
        self.flush_pending(&mut state)
    }

    fn flush_pending(&self, state: &mut State<H>) -> Result<()> {
        let kinds: Vec<RecordKind> = state.pending.iter().copied().collect();
        let mut first_err = None;

        for kind in kinds {
            let saved = match kind {
                RecordKind::Leaves => self.store.save_leaves(state.tree.leaves()),
                RecordKind::Nullifiers => self.store.save_nullifiers(&state.nullifiers.to_sorted_vec()),
                RecordKind::Deposits => self.store.save_deposits(state.records.deposits()),
                RecordKind::Withdrawals => self.store.save_withdrawals(state.records.withdrawals()),
            };
            match saved {
                Ok(()) => {
                    state.pending.remove(&kind);
                }
                Err(e) => {
                    error!("error saving {}: {} (kept in memory, not yet durable)", kind.name(), e);
                    first_err.get_or_insert(e);
                }
            }
        }

        if !state.pending.contains(&RecordKind::Nullifiers)
            && !state.pending.contains(&RecordKind::Withdrawals)
        {
            state.unsaved_withdrawals.clear();
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // === queries ===

    pub fn root(&self) -> Option<Digest> {
        self.state.read().tree.root()
    }

    /// inclusion path for a commitment, `Error::NotFound` if absent
    pub fn path(&self, commitment: &Digest) -> Result<MerklePath> {
        self.state.read().tree.path_for(commitment)
    }

    pub fn is_nullifier_used(&self, nullifier: &Digest) -> bool {
        self.state.read().nullifiers.contains(nullifier)
    }

    pub fn deposit(&self, commitment: &Digest) -> Option<DepositRecord> {
        self.state.read().records.deposit(commitment).cloned()
    }

    pub fn withdrawal(&self, nullifier: &Digest) -> Option<WithdrawalRecord> {
        self.state.read().records.withdrawal(nullifier).cloned()
    }

    pub fn leaf_count(&self) -> usize {
        self.state.read().tree.len()
    }

    pub fn is_durable(&self) -> bool {
        self.state.read().pending.is_empty()
    }

    pub fn zero_commitment_info(&self) -> ZeroCommitmentInfo {
        let state = self.state.read();
        let zero = zero_commitment(state.tree.hasher());
        let leaf_index = state.tree.index_of(&zero);
        ZeroCommitmentInfo {
            zero_commitment: zero,
            is_in_tree: leaf_index.is_some(),
            leaf_index,
        }
    }

    pub fn stats(&self) -> EngineStats {
        let state = self.state.read();
        EngineStats {
            leaf_count: state.tree.len(),
            nullifier_count: state.nullifiers.len(),
            deposit_count: state.records.deposit_count(),
            withdrawal_count: state.records.withdrawal_count(),
            root: state.tree.root(),
            durable: state.pending.is_empty(),
            hasher: state.tree.hasher().id(),
            store: self.store.id(),
        }
    }

    /// the in-memory state in its persisted shape
    pub fn snapshot(&self) -> PersistedState {
        let state = self.state.read();
        PersistedState {
            leaves: state.tree.leaves().to_vec(),
            nullifiers: state.nullifiers.to_sorted_vec(),
            deposits: state.records.deposits().clone(),
            withdrawals: state.records.withdrawals().clone(),
        }
    }
}

impl<H: DigestHasher> EventSink for RelayerEngine<H> {
    fn on_deposit(&self, event: DepositEvent) -> Result<DepositReceipt> {
        self.record_deposit(event)
    }

    fn on_withdrawal(&self, event: WithdrawalEvent) -> Result<WithdrawalReceipt> {
        self.record_withdrawal(event.into())
    }
}

fn unix_now() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}
