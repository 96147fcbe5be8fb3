//! Bounded undo/redo over whole-state snapshots.
//!
//! Two-tier storage: the newest `ram_buffer - 1` entries of each stack stay
//! resident as encoded bytes; older entries are written once to a private
//! scratch directory and released from memory. The undo stack never holds
//! more than `max_history` entries; the oldest is evicted (and its file
//! deleted) first. The scratch directory is removed when the manager drops.

use crate::{
    config::HistoryConfig,
    error::{IdentityError, Result},
    graph::GraphState,
};
use chrono::{DateTime, Utc};
use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Where a snapshot's encoded payload lives.
#[derive(Debug)]
enum Residency {
    Resident(Vec<u8>),
    Spilled(PathBuf),
}

/// One history entry.
#[derive(Debug)]
pub struct Snapshot {
    seq: u64,
    taken_at: DateTime<Utc>,
    label: String,
    residency: Residency,
}

impl Snapshot {
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self.residency, Residency::Spilled(_))
    }

    fn decode(&self) -> Result<GraphState> {
        match &self.residency {
            Residency::Resident(bytes) => Ok(bincode::deserialize(bytes)?),
            Residency::Spilled(path) => {
                let bytes = fs::read(path).map_err(IdentityError::serialization)?;
                Ok(bincode::deserialize(&bytes)?)
            }
        }
    }

    /// Resident → Spilled. The payload is written once and then released.
    fn spill_to(&mut self, dir: &Path) -> std::io::Result<()> {
        if let Residency::Resident(bytes) = &self.residency {
            let path = dir.join(format!("snapshot_{:08}.bin", self.seq));
            fs::write(&path, bytes)?;
            self.residency = Residency::Spilled(path);
        }
        Ok(())
    }

    /// Delete the backing file, if any.
    fn discard(self) {
        if let Residency::Spilled(path) = self.residency {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "could not delete spilled snapshot");
            }
        }
    }
}

/// Occupancy counters for UI and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HistoryStats {
    pub undo: usize,
    pub redo: usize,
    pub resident: usize,
    pub spilled: usize,
}

/// Undo/redo stacks with RAM residency bookkeeping and disk spillover.
#[derive(Debug)]
pub struct HistoryManager {
    config: HistoryConfig,
    undo: VecDeque<Snapshot>,
    redo: VecDeque<Snapshot>,
    scratch: Option<TempDir>,
    next_seq: u64,
}

impl HistoryManager {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            scratch: None,
            next_seq: 0,
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Record the state as it was before an operation named `label`.
    /// Discards the redo stack.
    pub fn push(&mut self, label: &str, state: &GraphState) -> Result<()> {
        let snap = self.encode(label, state)?;
        self.undo.push_back(snap);
        for stale in self.redo.drain(..) {
            stale.discard();
        }
        self.enforce_limits();
        Ok(())
    }

    /// Step back: `current` goes onto the redo stack and the newest undo entry
    /// is returned. `Ok(None)` when there is nothing to undo.
    ///
    /// If the entry cannot be decoded it is dropped, the error is returned and
    /// both stacks are otherwise unchanged.
    pub fn undo(&mut self, current: &GraphState) -> Result<Option<GraphState>> {
        let Some(label) = self.undo.back().map(|s| s.label.clone()) else {
            return Ok(None);
        };
        let current = self.encode(&label, current)?;
        let Some(entry) = self.undo.pop_back() else {
            return Ok(None);
        };
        let restored = Self::take(entry)?;
        self.redo.push_back(current);
        self.enforce_limits();
        Ok(Some(restored))
    }

    /// Step forward again; mirror image of [`HistoryManager::undo`].
    pub fn redo(&mut self, current: &GraphState) -> Result<Option<GraphState>> {
        let Some(label) = self.redo.back().map(|s| s.label.clone()) else {
            return Ok(None);
        };
        let current = self.encode(&label, current)?;
        let Some(entry) = self.redo.pop_back() else {
            return Ok(None);
        };
        let restored = Self::take(entry)?;
        self.undo.push_back(current);
        self.enforce_limits();
        Ok(Some(restored))
    }

    /// Drop both stacks and their files.
    pub fn clear(&mut self) {
        for snap in self.undo.drain(..).chain(self.redo.drain(..)) {
            snap.discard();
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Label of the operation the next undo reverts.
    pub fn undo_label(&self) -> Option<&str> {
        self.undo.back().map(Snapshot::label)
    }

    /// Label of the operation the next redo re-applies.
    pub fn redo_label(&self) -> Option<&str> {
        self.redo.back().map(Snapshot::label)
    }

    pub fn stats(&self) -> HistoryStats {
        let all = || self.undo.iter().chain(self.redo.iter());
        let spilled = all().filter(|s| s.is_spilled()).count();
        HistoryStats {
            undo: self.undo.len(),
            redo: self.redo.len(),
            resident: all().count() - spilled,
            spilled,
        }
    }

    /// Scratch directory, once anything has been spilled.
    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_ref().map(TempDir::path)
    }

    fn encode(&mut self, label: &str, state: &GraphState) -> Result<Snapshot> {
        let bytes = bincode::serialize(state)?;
        let seq = self.next_seq;
        self.next_seq += 1;
        Ok(Snapshot {
            seq,
            taken_at: Utc::now(),
            label: label.to_string(),
            residency: Residency::Resident(bytes),
        })
    }

    /// Decode an entry that has left its stack, deleting its file either way.
    fn take(entry: Snapshot) -> Result<GraphState> {
        let decoded = entry.decode();
        if let Err(e) = &decoded {
            warn!(label = entry.label(), error = %e, "history entry unreadable, dropped");
        }
        entry.discard();
        decoded
    }

    fn enforce_limits(&mut self) {
        while self.undo.len() > self.config.max_history {
            if let Some(oldest) = self.undo.pop_front() {
                debug!(label = oldest.label(), "evicting oldest undo entry");
                oldest.discard();
            }
        }
        while self.redo.len() > self.config.max_history {
            if let Some(oldest) = self.redo.pop_front() {
                oldest.discard();
            }
        }

        let keep = self.config.ram_buffer.saturating_sub(1);
        let needs_spill = |stack: &VecDeque<Snapshot>| {
            let cutoff = stack.len().saturating_sub(keep);
            stack.iter().take(cutoff).any(|s| !s.is_spilled())
        };
        if !needs_spill(&self.undo) && !needs_spill(&self.redo) {
            return;
        }
        let dir = match self.ensure_scratch() {
            Ok(dir) => dir,
            Err(e) => {
                warn!(error = %e, "cannot create history scratch dir, keeping snapshots in memory");
                return;
            }
        };
        for stack in [&mut self.undo, &mut self.redo] {
            let cutoff = stack.len().saturating_sub(keep);
            for snap in stack.iter_mut().take(cutoff) {
                if let Err(e) = snap.spill_to(&dir) {
                    warn!(
                        label = snap.label(),
                        error = %e,
                        "snapshot spill failed, keeping it resident"
                    );
                }
            }
        }
    }

    fn ensure_scratch(&mut self) -> std::io::Result<PathBuf> {
        if self.scratch.is_none() {
            let dir = tempfile::Builder::new().prefix("idmap-history-").tempdir()?;
            debug!(path = %dir.path().display(), "created history scratch dir");
            self.scratch = Some(dir);
        }
        Ok(self
            .scratch
            .as_ref()
            .map(|d| d.path().to_path_buf())
            .unwrap_or_default())
    }
}

impl Drop for HistoryManager {
    fn drop(&mut self) {
        self.clear();
    }
}
