//! Merge engine: folding tracks into one another.
//!
//! Overlapping frame ranges are merged as-is; a merged track may carry two
//! detections for the same frame. Noise absorption is the only caller that
//! requires disjoint spans.

use crate::{
    error::{IdentityError, Result},
    graph::IdentityGraph,
    types::{Cast, Role, TrackId},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// Outcome of [`IdentityGraph::merge_all_by_role`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMergeReport {
    /// Number of slave tracks folded away
    pub merged: usize,
    /// Roles that had more than one track
    pub roles: Vec<Role>,
}

impl IdentityGraph {
    /// Fold `slave` into `master`.
    ///
    /// Detections are appended and stably re-sorted by frame, provenance sets
    /// are unioned and every lineage entry pointing at `slave` is repointed to
    /// `master`. Absent ids (or `master == slave`) make this a silent no-op;
    /// returns whether anything changed.
    pub fn merge(&mut self, master: TrackId, slave: TrackId) -> bool {
        if master == slave || !self.tracks.contains_key(&master) {
            return false;
        }
        let Some(slave_track) = self.tracks.remove(&slave) else {
            return false;
        };
        let moved = slave_track.len();

        if let Some(master_track) = self.tracks.get_mut(&master) {
            master_track.frames.extend(slave_track.frames);
            master_track.boxes.extend(slave_track.boxes);
            master_track.merged_from.extend(slave_track.merged_from);
            master_track.sort_by_frame();
        }

        for current in self.lineage.values_mut() {
            if *current == slave {
                *current = master;
            }
        }
        // Tracks created by older tooling may lack their own lineage entry.
        self.lineage.entry(slave).or_insert(master);

        debug!(%master, %slave, moved, "merged track");
        self.record(
            "Merge",
            json!({ "master": master.0, "slave": slave.0, "detections": moved }),
        );
        true
    }

    /// Merge the selected tracks into the numerically smallest id.
    ///
    /// If the master is not labelled with a cast role but one of the slaves
    /// is, the master takes the first such slave role. Every id is validated
    /// before anything is mutated. Returns the master id, or `None` when fewer
    /// than two distinct ids were given.
    pub fn manual_merge(&mut self, ids: &[TrackId], cast: &Cast) -> Result<Option<TrackId>> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if let Some(missing) = ids.iter().find(|id| !self.contains(**id)) {
            return Err(IdentityError::UnknownTrackId(*missing));
        }
        let Some((&master, slaves)) = ids.split_first() else {
            return Ok(None);
        };
        if slaves.is_empty() {
            return Ok(None);
        }

        let mut role = self.tracks[&master].role.clone();
        for &slave in slaves {
            let slave_role = &self.tracks[&slave].role;
            if !cast.contains(&role) && cast.contains(slave_role) {
                role = slave_role.clone();
            }
            self.merge(master, slave);
        }
        if let Some(track) = self.tracks.get_mut(&master) {
            track.role = role;
        }
        Ok(Some(master))
    }

    /// For every cast role, merge all tracks carrying it into the
    /// earliest-allocated (smallest) id.
    pub fn merge_all_by_role(&mut self, cast: &Cast) -> RoleMergeReport {
        let mut report = RoleMergeReport::default();
        for role in cast.roles() {
            let ids: Vec<TrackId> = self
                .tracks
                .iter()
                .filter(|(_, t)| t.role == role)
                .map(|(id, _)| *id)
                .collect();
            let Some((&master, slaves)) = ids.split_first() else {
                continue;
            };
            if slaves.is_empty() {
                continue;
            }
            for &slave in slaves {
                if self.merge(master, slave) {
                    report.merged += 1;
                }
            }
            report.roles.push(role);
        }
        if report.merged > 0 {
            let roles: Vec<&str> = report.roles.iter().map(Role::as_str).collect();
            self.record(
                "MergeAllByRole",
                json!({ "merged": report.merged, "roles": roles }),
            );
        }
        report
    }
}
