//! json directory backend - one file per logical record
//!
//! layout inside the data directory:
//!   leaves.json       ["<hex>", ...]
//!   nullifiers.json   ["<hex>", ...]
//!   deposits.json     {"<commitment>": {depositor, token, amount, timestamp}}
//!   withdrawals.json  {"<nullifier>": {recipient, token, amount, commitment, timestamp}}
//!
//! files are written to a hidden temporary sibling, synced, then renamed over
//! the old file, so a crash mid-write leaves the previous version readable.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use super::{RecordKind, StateStore};
use crate::error::{Error, Result};

const STORE_ID: &str = "json";

pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// open a data directory, creating it if missing
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| Error::persistence(STORE_ID, format!("create {}: {}", dir.display(), e)))?;
        info!("json store initialized with data directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, kind: RecordKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.name()))
    }

    fn temp_path(&self, kind: RecordKind) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", kind.name()))
    }
}

impl StateStore for JsonDirStore {
    fn id(&self) -> &'static str {
        STORE_ID
    }

    fn read_raw(&self, kind: RecordKind) -> Result<Option<Vec<u8>>> {
        let path = self.record_path(kind);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::persistence(
                STORE_ID,
                format!("read {}: {}", path.display(), e),
            )),
        }
    }

    fn write_raw(&self, kind: RecordKind, bytes: &[u8]) -> Result<()> {
        let tmp = self.temp_path(kind);
        let path = self.record_path(kind);
        let io_err = |op: &str, p: &Path, e: std::io::Error| {
            Error::persistence(STORE_ID, format!("{} {}: {}", op, p.display(), e))
        };

        let mut file = File::create(&tmp).map_err(|e| io_err("create", &tmp, e))?;
        file.write_all(bytes).map_err(|e| io_err("write", &tmp, e))?;
        file.sync_all().map_err(|e| io_err("sync", &tmp, e))?;
        drop(file);

        fs::rename(&tmp, &path).map_err(|e| io_err("rename", &path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;

    #[test]
    fn test_files_land_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::open(dir.path().join("nested/data")).unwrap();

        store.save_nullifiers(&[Digest([5u8; 32])]).unwrap();

        let path = store.record_path(RecordKind::Nullifiers);
        assert!(path.ends_with("nullifiers.json"));
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text, format!("[\"{}\"]", "05".repeat(32)));
        assert!(!store.temp_path(RecordKind::Nullifiers).exists());
    }

    #[test]
    fn test_save_all_writes_one_file_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::open(dir.path()).unwrap();
        store.save_all(&crate::persistence::PersistedState::default()).unwrap();

        for kind in RecordKind::ALL {
            let path = store.dir().join(format!("{}.json", kind.name()));
            assert!(path.exists(), "{} missing", kind.name());
        }
    }

    #[test]
    fn test_reads_legacy_deposit_layout() {
        // older relayers wrote `user` instead of `depositor` and no commitment on withdrawals
        let dir = tempfile::tempdir().unwrap();
        let c = "11".repeat(32);
        let n = "22".repeat(32);
        fs::write(
            dir.path().join("deposits.json"),
            format!(r#"{{"{c}": {{"user": "0xu", "token": "0xt", "amount": 5, "timestamp": null}}}}"#),
        )
        .unwrap();
        fs::write(
            dir.path().join("withdrawals.json"),
            format!(r#"{{"{n}": {{"recipient": "0xr", "token": "0xt", "amount": 5, "timestamp": null}}}}"#),
        )
        .unwrap();

        let state = JsonDirStore::open(dir.path()).unwrap().load().unwrap();
        let deposit = &state.deposits[&Digest([0x11; 32])];
        assert_eq!(deposit.depositor, "0xu");
        assert_eq!(state.withdrawals[&Digest([0x22; 32])].commitment, None);
    }

    #[test]
    fn test_unreadable_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("leaves.json"), b"\xff\xfe").unwrap();
        let store = JsonDirStore::open(dir.path()).unwrap();
        assert!(matches!(store.load(), Err(Error::Persistence { store: "json", .. })));
    }
}
