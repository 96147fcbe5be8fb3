//! Session: the shared, lock-guarded owner of one editing session.
//!
//! # Locking
//! - The graph mutex is the single consistency domain for tracks, lineage and
//!   the audit log. It is never held across file I/O; stable views are copied
//!   out under the lock.
//! - The history mutex serializes mutations so undo entries land in the same
//!   order as the operations they precede. Lock order is history, then graph.
//! - Readers take only the graph lock.
//!
//! Every mutating call copies the pre-operation state, runs the operation and,
//! if the operation changed something, pushes the copy into the history.
//! Failed or no-op operations leave no undo entry.

use crate::{
    absorb::NoiseAbsorber,
    autosave,
    config::{AbsorbParams, SessionConfig, StitchParams},
    error::Result,
    export,
    graph::{GraphState, IdentityGraph},
    history::{HistoryManager, HistoryStats},
    loader::{CancelFlag, StreamLoader},
    merge::RoleMergeReport,
    split::SplitOutcome,
    stitch::AutoStitcher,
    track::TrackSummary,
    types::{Cast, Frame, Role, TrackId},
};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::{collections::BTreeMap, path::Path};
use tracing::{debug, info, warn};

/// Counters reported after a successful load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub records: usize,
    pub detections: usize,
    pub tracks: usize,
    pub untracked: usize,
}

pub struct Session {
    config: SessionConfig,
    graph: Mutex<IdentityGraph>,
    cast: RwLock<Cast>,
    history: Mutex<HistoryManager>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_graph(IdentityGraph::new(), config)
    }

    pub fn with_graph(graph: IdentityGraph, config: SessionConfig) -> Self {
        let history = HistoryManager::new(config.history.clone());
        let cast = config.cast.clone();
        Self {
            config,
            graph: Mutex::new(graph),
            cast: RwLock::new(cast),
            history: Mutex::new(history),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Loading and restore
    // -----------------------------------------------------------------------

    /// Parse a gzip detection stream and, only if it parses completely,
    /// replace the live graph. Clears the undo history.
    pub fn load_path(
        &self,
        path: &Path,
        cancel: Option<CancelFlag>,
        on_progress: impl FnMut(usize) + Send,
    ) -> Result<LoadSummary> {
        let mut loader = StreamLoader::new().with_progress(self.config.progress_every, on_progress);
        if let Some(flag) = cancel {
            loader = loader.with_cancel(flag);
        }
        let loaded = loader.load_path(path)?;
        let summary = LoadSummary {
            records: loaded.records,
            detections: loaded.detections,
            tracks: loaded.tracks.len(),
            untracked: loaded.untracked,
        };

        let mut history = self.history.lock();
        self.graph.lock().commit_load(loaded, &path.display().to_string());
        history.clear();
        Ok(summary)
    }

    /// Replace the live graph with an autosave. Clears the undo history.
    ///
    /// Roles carried by restored tracks but missing from the cast are added
    /// to it, so custom roles survive a save/restore cycle.
    pub fn restore_autosave(&self, path: &Path) -> Result<usize> {
        let restored = autosave::read_autosave(path)?;
        let tracks = restored.len();
        {
            let mut cast = self.cast.write();
            for track in restored.tracks().values() {
                if let Role::Named(name) = &track.role {
                    if cast.add(name.as_str()) {
                        debug!(role = %name, "cast member restored from autosave");
                    }
                }
            }
        }
        let mut history = self.history.lock();
        *self.graph.lock() = restored;
        history.clear();
        Ok(tracks)
    }

    /// Write an autosave from a copy of the live graph.
    pub fn autosave(&self, path: &Path) -> Result<()> {
        let copy = self.graph.lock().clone();
        autosave::write_autosave(&copy, path)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    fn mutate<T>(
        &self,
        label: &str,
        changed: impl FnOnce(&T) -> bool,
        op: impl FnOnce(&mut IdentityGraph, &Cast) -> Result<T>,
    ) -> Result<T> {
        let cast = self.cast.read().clone();
        let mut history = self.history.lock();
        let (out, before) = {
            let mut graph = self.graph.lock();
            let before = graph.state();
            let out = op(&mut graph, &cast)?;
            (out, before)
        };
        if changed(&out) {
            if let Err(e) = history.push(label, &before) {
                warn!(label, error = %e, "could not record undo step");
            }
        }
        Ok(out)
    }

    pub fn merge(&self, master: TrackId, slave: TrackId) -> bool {
        self.mutate("Merge", |m: &bool| *m, |g, _| Ok(g.merge(master, slave)))
            .unwrap_or(false)
    }

    pub fn manual_merge(&self, ids: &[TrackId]) -> Result<Option<TrackId>> {
        self.mutate("Manual merge", Option::is_some, |g, cast| g.manual_merge(ids, cast))
    }

    pub fn merge_all_by_role(&self) -> RoleMergeReport {
        self.mutate(
            "Merge all by role",
            |r: &RoleMergeReport| r.merged > 0,
            |g, cast| Ok(g.merge_all_by_role(cast)),
        )
        .unwrap_or_default()
    }

    pub fn split(&self, id: TrackId, at_frame: Frame, keep_head: bool) -> Result<SplitOutcome> {
        self.mutate("Split", |_| true, |g, _| g.split(id, at_frame, keep_head))
    }

    /// Auto-stitch with the session's configured parameters.
    pub fn auto_stitch(&self) -> usize {
        self.auto_stitch_with(self.config.stitch.clone())
    }

    pub fn auto_stitch_with(&self, params: StitchParams) -> usize {
        let stitcher = AutoStitcher::new(params, self.config.fps);
        self.mutate("Auto-stitch", |n: &usize| *n > 0, |g, _| Ok(stitcher.run(g)))
            .unwrap_or(0)
    }

    /// Absorb noise with the session's configured parameters.
    pub fn absorb_noise(&self) -> usize {
        self.absorb_noise_with(&self.config.absorb)
    }

    pub fn absorb_noise_with(&self, params: &AbsorbParams) -> usize {
        let absorber = NoiseAbsorber::from_params(params, self.config.fps);
        self.mutate("Absorb noise", |n: &usize| *n > 0, |g, cast| Ok(absorber.run(g, cast)))
            .unwrap_or(0)
    }

    pub fn assign_role(&self, ids: &[TrackId], role: Role) -> Result<usize> {
        self.mutate("Assign role", |n: &usize| *n > 0, |g, _| g.assign_role(ids, role))
    }

    /// Add a role to the cast. Returns false if it already existed.
    pub fn add_cast_member(&self, name: &str) -> bool {
        let added = self.cast.write().add(name);
        if added {
            self.graph
                .lock()
                .record("AddCastMember", json!({ "role": name }));
        }
        added
    }

    /// Remove a role from the cast and reset its tracks to `Ignore`.
    /// Returns the number of tracks reset.
    pub fn remove_cast_member(&self, name: &str) -> usize {
        if !self.cast.write().remove(name) {
            return 0;
        }
        self.mutate("Remove cast member", |n: &usize| *n > 0, |g, _| Ok(g.clear_role(name)))
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Undo / redo
    // -----------------------------------------------------------------------

    /// Revert the last operation. Returns false when there is nothing to undo.
    pub fn undo(&self) -> Result<bool> {
        self.step("Undo", HistoryManager::undo_label, HistoryManager::undo)
    }

    /// Re-apply the last undone operation.
    pub fn redo(&self) -> Result<bool> {
        self.step("Redo", HistoryManager::redo_label, HistoryManager::redo)
    }

    fn step(
        &self,
        action: &str,
        label_of: fn(&HistoryManager) -> Option<&str>,
        apply: fn(&mut HistoryManager, &GraphState) -> Result<Option<GraphState>>,
    ) -> Result<bool> {
        let mut history = self.history.lock();
        let Some(label) = label_of(&history).map(str::to_string) else {
            return Ok(false);
        };
        let current = self.graph.lock().state();
        let Some(restored) = apply(&mut history, &current)? else {
            return Ok(false);
        };
        let mut graph = self.graph.lock();
        graph.restore_state(restored);
        graph.record(action, json!({ "operation": label }));
        info!(action, operation = %label, "history step applied");
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.history.lock().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.lock().can_redo()
    }

    pub fn history_stats(&self) -> HistoryStats {
        self.history.lock().stats()
    }

    // -----------------------------------------------------------------------
    // Read views
    // -----------------------------------------------------------------------

    /// Run `f` against the live graph under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&IdentityGraph) -> R) -> R {
        f(&self.graph.lock())
    }

    /// Copy of tracks and lineage.
    pub fn snapshot(&self) -> GraphState {
        self.graph.lock().state()
    }

    pub fn cast(&self) -> Cast {
        self.cast.read().clone()
    }

    pub fn summaries(&self) -> Vec<TrackSummary> {
        self.graph.lock().summaries(self.config.fps)
    }

    /// Listing with short un-roled tracks hidden per the session config.
    pub fn visible_summaries(&self) -> Vec<TrackSummary> {
        let cast = self.cast();
        self.graph
            .lock()
            .visible_summaries(self.config.fps, &cast, self.config.hide_short_secs)
    }

    pub fn identity_map(&self) -> BTreeMap<TrackId, Role> {
        self.graph.lock().identity_map()
    }

    pub fn write_identity_map(&self, path: &Path) -> Result<usize> {
        let copy = self.graph.lock().clone();
        export::write_identity_map(&copy, path)
    }

    pub fn write_audit_log(&self, path: &Path) -> Result<()> {
        let copy = self.graph.lock().clone();
        export::write_audit_log(&copy, path)
    }
}
