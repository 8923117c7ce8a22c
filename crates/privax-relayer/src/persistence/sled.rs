//! sled backend - one key per logical record

use std::path::Path;

use tracing::info;

use super::{RecordKind, StateStore};
use crate::error::{Error, Result};

const STORE_ID: &str = "sled";

/// relayer state in an embedded sled database
pub struct SledStore {
    db: ::sled::Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("opening sled store at {}", path.display());
        let db = ::sled::open(path).map_err(|e| Error::persistence(STORE_ID, e))?;
        Ok(Self { db })
    }

    /// wrap an already open database (e.g. a temporary one)
    pub fn from_db(db: ::sled::Db) -> Self {
        Self { db }
    }
}

impl StateStore for SledStore {
    fn id(&self) -> &'static str {
        STORE_ID
    }

    fn read_raw(&self, kind: RecordKind) -> Result<Option<Vec<u8>>> {
        self.db
            .get(kind.name())
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(|e| Error::persistence(STORE_ID, e))
    }

    fn write_raw(&self, kind: RecordKind, bytes: &[u8]) -> Result<()> {
        self.db
            .insert(kind.name(), bytes)
            .map_err(|e| Error::persistence(STORE_ID, e))?;
        // durable before we report success
        self.db
            .flush()
            .map_err(|e| Error::persistence(STORE_ID, format!("flush: {}", e)))?;
        Ok(())
    }
}
