// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compressed state snapshots.
//!
//! A snapshot is the zstd-compressed JSON of `(seq, MaterializedState)`.
//! Recovery loads the snapshot and replays WAL entries after `seq`. Saves
//! go through a temp file and atomic rename so a crash mid-save never
//! clobbers the previous snapshot.

use crate::state::MaterializedState;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// zstd compression level for snapshots (speed over ratio).
const COMPRESSION_LEVEL: i32 = 3;

/// Errors that can occur in snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk snapshot payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    /// WAL sequence number this snapshot covers (entries <= seq are included)
    pub seq: u64,
    pub state: MaterializedState,
}

impl Snapshot {
    /// Load a snapshot, tolerating absence and corruption.
    ///
    /// A missing file yields a fresh state at seq 0. A corrupt file is
    /// rotated to `.bak` and also yields a fresh state — the WAL replays
    /// from 0 in that case.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Self {
                    seq: 0,
                    state: MaterializedState::default(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut compressed = Vec::new();
        file.read_to_end(&mut compressed)?;

        let parsed = zstd::decode_all(compressed.as_slice())
            .map_err(SnapshotError::Io)
            .and_then(|json| serde_json::from_slice::<Snapshot>(&json).map_err(Into::into));

        match parsed {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                let bak_path = rotate_bak_path(path);
                warn!(
                    path = %path.display(),
                    bak = %bak_path.display(),
                    error = %e,
                    "corrupt snapshot, rotating to .bak and starting fresh",
                );
                let _ = std::fs::rename(path, &bak_path);
                Ok(Self {
                    seq: 0,
                    state: MaterializedState::default(),
                })
            }
        }
    }

    /// Save the snapshot durably: write temp, fsync, atomic rename.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec(self)?;
        let compressed = zstd::encode_all(json.as_slice(), COMPRESSION_LEVEL)?;

        let tmp_path = path.with_extension("tmp");
        {
            let mut tmp_file = File::create(&tmp_path)?;
            tmp_file.write_all(&compressed)?;
            tmp_file.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;

        Ok(())
    }
}

/// Path for rotating a corrupt file out of the way without clobbering a
/// previous rotation.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let base = path.with_extension("bak");
    if !base.exists() {
        return base;
    }
    for i in 1..100 {
        let candidate = path.with_extension(format!("bak.{i}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    base
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
