//! deposit and withdrawal metadata kept for audit and queries
//!
//! records are keyed by commitment (deposits) and nullifier (withdrawals).
//! a second write for the same key replaces the first one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;

/// metadata of a deposit, keyed by its commitment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    #[serde(alias = "user")]
    pub depositor: String,
    pub token: String,
    pub amount: u128,
    /// unix seconds, absent when the source event carries none
    pub timestamp: Option<u64>,
}

/// metadata of a withdrawal, keyed by its nullifier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    pub recipient: String,
    pub token: String,
    pub amount: u128,
    /// spent commitment, absent for withdrawals observed on chain
    pub commitment: Option<Digest>,
    pub timestamp: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordStore {
    deposits: BTreeMap<Digest, DepositRecord>,
    withdrawals: BTreeMap<Digest, WithdrawalRecord>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(
        deposits: BTreeMap<Digest, DepositRecord>,
        withdrawals: BTreeMap<Digest, WithdrawalRecord>,
    ) -> Self {
        Self { deposits, withdrawals }
    }

    /// upsert, returning the record that was replaced
    pub fn put_deposit(&mut self, commitment: Digest, record: DepositRecord) -> Option<DepositRecord> {
        self.deposits.insert(commitment, record)
    }

    /// upsert, returning the record that was replaced
    pub fn put_withdrawal(
        &mut self,
        nullifier: Digest,
        record: WithdrawalRecord,
    ) -> Option<WithdrawalRecord> {
        self.withdrawals.insert(nullifier, record)
    }

    pub fn deposit(&self, commitment: &Digest) -> Option<&DepositRecord> {
        self.deposits.get(commitment)
    }

    pub fn withdrawal(&self, nullifier: &Digest) -> Option<&WithdrawalRecord> {
        self.withdrawals.get(nullifier)
    }

    pub fn deposits(&self) -> &BTreeMap<Digest, DepositRecord> {
        &self.deposits
    }

    pub fn withdrawals(&self) -> &BTreeMap<Digest, WithdrawalRecord> {
        &self.withdrawals
    }

    pub fn deposit_count(&self) -> usize {
        self.deposits.len()
    }

    pub fn withdrawal_count(&self) -> usize {
        self.withdrawals.len()
    }
}
