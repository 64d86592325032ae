//! File-system checkpoints of the window operator.
//!
//! A checkpoint holds everything needed to resume an interrupted job: the
//! watermark, every open window's accumulator, the recently closed window
//! ids, and the counters. It is written when the job stops without flushing
//! and removed once a run has flushed every window to the sink.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::GroupKey;
use crate::window::{OperatorSnapshot, TumblingWindows};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CheckpointFile<K> {
    version: u32,
    /// Windows the snapshot was taken with; restoring under a different
    /// window layout would misassign every open accumulator.
    windows: TumblingWindows,
    snapshot: OperatorSnapshot<K>,
}

/// Single-file checkpoint store.
pub struct FsCheckpointStorage {
    path: PathBuf,
}

impl FsCheckpointStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write `snapshot` atomically: to a temporary file, then renamed over
    /// the previous checkpoint.
    pub fn save<K: GroupKey>(
        &self,
        windows: TumblingWindows,
        snapshot: &OperatorSnapshot<K>,
    ) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create checkpoint directory {}", parent.display())
            })?;
        }
        let file = CheckpointFile {
            version: FORMAT_VERSION,
            windows,
            snapshot: snapshot.clone(),
        };
        let bytes = bincode::serialize(&file).context("failed to encode checkpoint")?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)
            .with_context(|| format!("failed to write checkpoint {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to move checkpoint to {}", self.path.display()))?;
        Ok(())
    }

    /// Load the checkpoint, or `None` if there is none.
    ///
    /// Fails if the file is corrupt or was written for different windows.
    pub fn load<K: GroupKey>(&self, windows: TumblingWindows) -> Result<Option<OperatorSnapshot<K>>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read checkpoint {}", self.path.display()))
            }
        };
        let file: CheckpointFile<K> = bincode::deserialize(&bytes)
            .with_context(|| format!("failed to decode checkpoint {}", self.path.display()))?;
        if file.version != FORMAT_VERSION {
            bail!(
                "checkpoint {} has format version {}, expected {}",
                self.path.display(),
                file.version,
                FORMAT_VERSION
            );
        }
        if file.windows != windows {
            bail!(
                "checkpoint {} was taken with {:?}, job is configured with {:?}",
                self.path.display(),
                file.windows,
                windows
            );
        }
        Ok(Some(file.snapshot))
    }

    /// Remove the checkpoint. Missing files are fine.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("failed to remove checkpoint {}", self.path.display())),
        }
    }
}
