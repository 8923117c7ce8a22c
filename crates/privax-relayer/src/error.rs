//! error types for the relayer state engine

use thiserror::Error;

use crate::digest::Digest;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("leaf value not found in the tree: {0}")]
    NotFound(Digest),

    #[error("leaf index {index} out of range (tree has {len} leaves)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("nullifier already used: {0}")]
    NullifierAlreadyUsed(Digest),

    #[error("commitment not found in merkle tree: {0}")]
    CommitmentNotFound(Digest),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("persistence error ({store}): {reason}")]
    Persistence { store: &'static str, reason: String },
}

impl Error {
    pub(crate) fn persistence(store: &'static str, reason: impl ToString) -> Self {
        Error::Persistence {
            store,
            reason: reason.to_string(),
        }
    }

    /// true for errors caused by the caller's input or by protocol state,
    /// false for infrastructure failures that may succeed on retry
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Error::Persistence { .. })
    }
}
