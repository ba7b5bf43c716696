// src/store/memory.rs

use std::sync::{Mutex, MutexGuard};

use crate::errors::Result;
use crate::store::{BuildLedger, LedgerAccess};

/// Keeps the ledger in process memory only.
#[derive(Debug, Default)]
pub struct MemoryBuildStore {
    ledger: Mutex<BuildLedger>,
}

impl MemoryBuildStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BuildLedger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LedgerAccess for MemoryBuildStore {
    fn read<R>(&self, f: impl FnOnce(&BuildLedger) -> R) -> R {
        f(&self.lock())
    }

    fn commit<R>(&self, f: impl FnOnce(&mut BuildLedger) -> Result<R>) -> Result<R> {
        // Ledger operations validate before mutating, so no copy is needed.
        f(&mut self.lock())
    }
}
