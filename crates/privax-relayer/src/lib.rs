//! # privax-relayer
//!
//! state engine for a privacy-pool relayer: an append-only merkle accumulator
//! of deposit commitments, a ledger of spent nullifiers and per-event
//! metadata, all durably persisted.
//!
//! ## architecture
//!
//! ```text
//!   deposit event            withdrawal event / request
//!        │                            │
//!        ▼                            ▼
//! ┌──────────────────────────────────────────────┐
//! │               RelayerEngine                  │
//! │  ┌──────────────┐ ┌────────────┐ ┌─────────┐ │
//! │  │ accumulator  │ │ nullifiers │ │ records │ │
//! │  └──────────────┘ └────────────┘ └─────────┘ │
//! └──────────────────────┬───────────────────────┘
//!                        │ save after every mutation
//!                        ▼
//!              ┌───────────────────┐
//!              │    StateStore     │  (sled | json dir | memory)
//!              └───────────────────┘
//! ```
//!
//! ## properties
//!
//! - leaf 0 is always the zero commitment
//! - a nullifier is accepted at most once, ever
//! - rejected operations leave state untouched
//! - reloading persisted state reproduces the same root and paths
//!
//! ## usage
//!
//! ```rust,ignore
//! use privax_relayer::{DepositEvent, MemoryStore, RelayerEngine, Sha256Hasher};
//!
//! let engine = RelayerEngine::open(Box::new(MemoryStore::new()), Sha256Hasher)?;
//! let receipt = engine.record_deposit(DepositEvent {
//!     depositor: "0xabc".into(),
//!     token: "0xdef".into(),
//!     amount: 100,
//!     commitment,
//!     timestamp: None,
//! })?;
//! let path = engine.path(&commitment)?;
//! assert!(path.verify(&commitment, &receipt.root, &Sha256Hasher));
//! ```

pub mod digest;
pub mod engine;
pub mod error;
pub mod merkle;
pub mod nullifier;
pub mod persistence;
pub mod records;

pub use digest::{
    zero_commitment, Blake3Hasher, Digest, DigestHasher, HexSha256Hasher, Sha256Hasher,
};
pub use engine::{
    DepositEvent, DepositReceipt, EngineStats, EventSink, RelayerEngine, WithdrawalEvent,
    WithdrawalReceipt, WithdrawalRequest, ZeroCommitmentInfo,
};
pub use error::{Error, Result};
pub use merkle::{compute_root, MerkleAccumulator, MerklePath, PathElement, Side};
pub use nullifier::NullifierSet;
pub use persistence::{JsonDirStore, MemoryStore, PersistedState, RecordKind, SledStore, StateStore};
pub use records::{DepositRecord, RecordStore, WithdrawalRecord};
