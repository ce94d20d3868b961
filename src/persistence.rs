//! JSON snapshots of a [`ChainExport`] on disk. Writes go to a sibling temp
//! file first and are renamed into place, so a crash never leaves a
//! truncated snapshot behind.

use crate::ledger::ChainExport;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[instrument(skip(export), fields(blocks = export.blocks.len()))]
pub fn save_snapshot(path: &Path, export: &ChainExport) -> Result<(), PersistenceError> {
    let bytes = serde_json::to_vec_pretty(export)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(io_error(&tmp))?;
    fs::rename(&tmp, path).map_err(io_error(path))?;
    debug!("Snapshot written");
    Ok(())
}

#[instrument]
pub fn load_snapshot(path: &Path) -> Result<ChainExport, PersistenceError> {
    let bytes = fs::read(path).map_err(io_error(path))?;
    let export: ChainExport = serde_json::from_slice(&bytes)?;
    debug!(blocks = export.blocks.len(), "Snapshot loaded");
    Ok(export)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BalanceConfig, RewardConfig};
    use crate::ledger::Ledger;

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.json");
        let ledger =
            Ledger::with_genesis(RewardConfig::default(), BalanceConfig::default()).unwrap();

        save_snapshot(&path, &ledger.to_export()).unwrap();
        assert!(!path.with_extension("tmp").exists());
        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded.blocks.len(), 1);
        assert_eq!(loaded.format_version, ledger.to_export().format_version);
    }

    #[test]
    fn missing_file_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        match load_snapshot(&path) {
            Err(PersistenceError::Io { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
