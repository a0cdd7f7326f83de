//! File persistence for the ledger record.
//!
//! Writes go to `<path>.tmp` and are renamed into place so a crash never
//! leaves a half-written ledger behind. Unreadable files are quarantined
//! and treated as missing.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::types::LedgerState;

/// Local JSON file holding the ledger record.
#[derive(Debug, Clone)]
pub struct LedgerFile {
    path: PathBuf,
}

impl LedgerFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    fn quarantine_path(&self) -> PathBuf {
        self.path.with_extension("json.corrupt")
    }

    /// Load the stored record. Missing or corrupt files yield `None`.
    pub fn load(&self) -> Option<LedgerState> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                debug!("No ledger file at {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<LedgerState>(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                let quarantine = self.quarantine_path();
                warn!(
                    "Quarantining corrupt ledger file {} -> {}: {}",
                    self.path.display(),
                    quarantine.display(),
                    e
                );
                let _ = fs::rename(&self.path, &quarantine);
                None
            }
        }
    }

    /// Atomically replace the stored record.
    pub fn save(&self, state: &LedgerState) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let body = serde_json::to_vec_pretty(state)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let tmp = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
        }

        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            e
        })
    }
}
