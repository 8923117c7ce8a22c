//! in-memory backend for tests
//!
//! clones share the same records, so a test can keep a handle after moving a
//! clone into the engine and flip it into failing mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{RecordKind, StateStore};
use crate::error::{Error, Result};

const STORE_ID: &str = "memory";

#[derive(Default)]
struct Inner {
    records: Mutex<HashMap<RecordKind, Vec<u8>>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
    write_delay: Mutex<Option<Duration>>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// make every subsequent write fail (simulated disk failure)
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// stall every subsequent write (simulated slow disk)
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *self.inner.write_delay.lock() = delay;
    }

    /// number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    pub fn raw(&self, kind: RecordKind) -> Option<Vec<u8>> {
        self.inner.records.lock().get(&kind).cloned()
    }

    /// overwrite a record bypassing encoding (e.g. to plant corruption)
    pub fn put_raw(&self, kind: RecordKind, bytes: Vec<u8>) {
        self.inner.records.lock().insert(kind, bytes);
    }
}

impl StateStore for MemoryStore {
    fn id(&self) -> &'static str {
        STORE_ID
    }

    fn read_raw(&self, kind: RecordKind) -> Result<Option<Vec<u8>>> {
        Ok(self.raw(kind))
    }

    fn write_raw(&self, kind: RecordKind, bytes: &[u8]) -> Result<()> {
        let delay = *self.inner.write_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::persistence(
                STORE_ID,
                format!("write {} refused", kind.name()),
            ));
        }
        self.inner.records.lock().insert(kind, bytes.to_vec());
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
