//! The identity graph: track store, lineage map and audit log as one
//! consistency domain.
//!
//! # Invariants
//! - every lineage value is a live track id (one hop, never a chain)
//! - every live track id is a lineage key
//! - a freshly allocated id is greater than every id ever issued

use crate::{
    audit::AuditLog,
    error::{IdentityError, Result},
    track::{Track, TrackSummary},
    types::{Cast, Role, TrackId},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

/// Live tracks keyed by id.
pub type TrackMap = BTreeMap<TrackId, Track>;

/// `original id → current master id`.
pub type Lineage = BTreeMap<TrackId, TrackId>;

/// The part of the graph captured by undo/redo snapshots.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    pub tracks: TrackMap,
    pub lineage: Lineage,
}

/// Mutable entity graph. Engines mutate it through `&mut self`; sharing across
/// threads goes through [`crate::session::Session`].
#[derive(Clone, Debug, Default)]
pub struct IdentityGraph {
    pub(crate) tracks: TrackMap,
    pub(crate) lineage: Lineage,
    pub(crate) audit: AuditLog,
    /// Set when the last load synthesized ids for untracked detections
    pub(crate) untracked_present: bool,
}

impl IdentityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a graph from parts, e.g. a restored autosave.
    pub fn from_parts(tracks: TrackMap, lineage: Lineage, audit: AuditLog) -> Self {
        Self {
            tracks,
            lineage,
            audit,
            untracked_present: false,
        }
    }

    pub fn tracks(&self) -> &TrackMap {
        &self.tracks
    }

    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.tracks.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn untracked_present(&self) -> bool {
        self.untracked_present
    }

    /// Live track currently representing `original`.
    pub fn resolve(&self, original: TrackId) -> Option<TrackId> {
        let mut current = *self.lineage.get(&original)?;
        // Merges keep lineage single-hop; the bound only guards corrupted input.
        for _ in 0..=self.lineage.len() {
            if self.tracks.contains_key(&current) {
                return Some(current);
            }
            match self.lineage.get(&current) {
                Some(next) if *next != current => current = *next,
                _ => return None,
            }
        }
        None
    }

    /// Lineage keys that do not resolve to a live track.
    pub fn dangling_lineage(&self) -> Vec<TrackId> {
        self.lineage
            .keys()
            .copied()
            .filter(|k| self.resolve(*k).is_none())
            .collect()
    }

    /// Smallest id greater than every id ever issued.
    pub fn next_track_id(&self) -> TrackId {
        let max_issued = self
            .lineage
            .keys()
            .chain(self.tracks.keys())
            .chain(self.tracks.values().flat_map(|t| t.merged_from.iter()))
            .map(|id| id.0)
            .max();
        TrackId(max_issued.map_or(0, |m| m + 1))
    }

    /// Copy of the snapshot-relevant state.
    pub fn state(&self) -> GraphState {
        GraphState {
            tracks: self.tracks.clone(),
            lineage: self.lineage.clone(),
        }
    }

    /// Replace tracks and lineage wholesale (undo/redo). The audit log is kept.
    pub fn restore_state(&mut self, state: GraphState) {
        self.tracks = state.tracks;
        self.lineage = state.lineage;
    }

    /// Append an audit entry.
    pub fn record(&mut self, action: &str, details: serde_json::Value) {
        self.audit.record(action, details);
    }

    // -----------------------------------------------------------------------
    // Roles
    // -----------------------------------------------------------------------

    /// Set the role of every listed track. All ids are validated first.
    pub fn assign_role(&mut self, ids: &[TrackId], role: Role) -> Result<usize> {
        if let Some(missing) = ids.iter().find(|id| !self.tracks.contains_key(id)) {
            return Err(IdentityError::UnknownTrackId(*missing));
        }
        let mut changed = 0;
        for id in ids {
            if let Some(track) = self.tracks.get_mut(id) {
                if track.role != role {
                    track.role = role.clone();
                    changed += 1;
                }
            }
        }
        if changed > 0 {
            let id_list: Vec<u64> = ids.iter().map(|id| id.0).collect();
            self.record(
                "AssignRole",
                json!({ "ids": id_list, "role": role.as_str(), "changed": changed }),
            );
        }
        Ok(changed)
    }

    /// Reset every track labelled `name` to `Ignore` (cast member removed).
    pub fn clear_role(&mut self, name: &str) -> usize {
        let target = Role::named(name);
        let mut cleared = 0;
        for track in self.tracks.values_mut() {
            if track.role == target {
                track.role = Role::Ignore;
                cleared += 1;
            }
        }
        if cleared > 0 {
            self.record("ClearRole", json!({ "role": name, "tracks": cleared }));
        }
        cleared
    }

    // -----------------------------------------------------------------------
    // Read views
    // -----------------------------------------------------------------------

    /// One summary row per live track, ascending id.
    pub fn summaries(&self, fps: f64) -> Vec<TrackSummary> {
        self.tracks
            .iter()
            .map(|(id, t)| TrackSummary::new(*id, t, fps))
            .collect()
    }

    /// Summaries with short un-roled tracks hidden. The filter is relaxed when
    /// the stream carried untracked detections, which are short by nature.
    pub fn visible_summaries(
        &self,
        fps: f64,
        cast: &Cast,
        hide_short_secs: f64,
    ) -> Vec<TrackSummary> {
        let hide = hide_short_secs > 0.0 && !self.untracked_present;
        self.tracks
            .iter()
            .filter(|(_, t)| {
                !hide || cast.contains(&t.role) || t.duration_secs(fps) >= hide_short_secs
            })
            .map(|(id, t)| TrackSummary::new(*id, t, fps))
            .collect()
    }

    /// Flattened `original id → role` map for downstream stages. Ids whose
    /// resolved track is un-roled are omitted.
    pub fn identity_map(&self) -> BTreeMap<TrackId, Role> {
        self.lineage
            .keys()
            .filter_map(|original| {
                let master = self.resolve(*original)?;
                let role = &self.tracks.get(&master)?.role;
                (!role.is_ignore()).then(|| (*original, role.clone()))
            })
            .collect()
    }
}
