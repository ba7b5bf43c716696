// src/store/file.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use crate::errors::Result;
use crate::store::{BuildLedger, LedgerAccess};

/// Keeps the ledger in a JSON file.
///
/// Each commit serialises the whole ledger to `<path>.tmp` and renames it
/// over `<path>`, so readers of the file never see a half-written plan.
#[derive(Debug)]
pub struct FileBuildStore {
    path: PathBuf,
    ledger: Mutex<BuildLedger>,
}

impl FileBuildStore {
    /// Open the store at `path`, loading it if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let ledger = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let ledger: BuildLedger = serde_json::from_str(&contents)?;
            info!(path = %path.display(), "loaded build store");
            ledger
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            debug!(path = %path.display(), "starting empty build store");
            BuildLedger::new()
        };

        Ok(Self {
            path,
            ledger: Mutex::new(ledger),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BuildLedger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, ledger: &BuildLedger) -> Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_vec_pretty(ledger)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LedgerAccess for FileBuildStore {
    fn read<R>(&self, f: impl FnOnce(&BuildLedger) -> R) -> R {
        f(&self.lock())
    }

    fn commit<R>(&self, f: impl FnOnce(&mut BuildLedger) -> Result<R>) -> Result<R> {
        let mut guard = self.lock();
        let mut next = guard.clone();
        let out = f(&mut next)?;
        if next != *guard {
            self.persist(&next)?;
            *guard = next;
        }
        Ok(out)
    }
}
