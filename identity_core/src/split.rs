//! Split engine: cutting a track in two at a frame boundary.

use crate::{
    error::{IdentityError, Result, SplitRejection},
    graph::IdentityGraph,
    track::Track,
    types::{Frame, TrackId},
};
use serde_json::json;
use tracing::debug;

/// Result of a successful split.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitOutcome {
    /// Freshly allocated id
    pub new_id: TrackId,
    /// Number of detections moved under `new_id`
    pub new_len: usize,
}

impl IdentityGraph {
    /// Split `id` at the first detection whose frame is `>= at_frame`.
    ///
    /// The head holds frames `< at_frame`, the tail the rest. With
    /// `keep_head` the tail moves to the new id; otherwise the head does. The
    /// new track is un-roled, has empty provenance and maps to itself in the
    /// lineage.
    pub fn split(&mut self, id: TrackId, at_frame: Frame, keep_head: bool) -> Result<SplitOutcome> {
        let track = self
            .tracks
            .get(&id)
            .ok_or(IdentityError::UnknownTrackId(id))?;
        let cut = track
            .frames
            .iter()
            .position(|f| *f >= at_frame)
            .ok_or(IdentityError::InvalidSplitPoint {
                track: id,
                frame: at_frame,
                rejection: SplitRejection::OutOfBounds,
            })?;
        if cut == 0 {
            return Err(IdentityError::InvalidSplitPoint {
                track: id,
                frame: at_frame,
                rejection: SplitRejection::AtStart,
            });
        }

        let new_id = self.next_track_id();
        let Some(original) = self.tracks.get_mut(&id) else {
            return Err(IdentityError::UnknownTrackId(id));
        };
        let tail_frames = original.frames.split_off(cut);
        let tail_boxes = original.boxes.split_off(cut);

        let mut fresh = Track {
            frames: tail_frames,
            boxes: tail_boxes,
            ..Default::default()
        };
        if !keep_head {
            std::mem::swap(&mut original.frames, &mut fresh.frames);
            std::mem::swap(&mut original.boxes, &mut fresh.boxes);
        }
        let new_len = fresh.len();
        self.tracks.insert(new_id, fresh);
        self.lineage.insert(new_id, new_id);

        debug!(%id, %new_id, at_frame, keep_head, new_len, "split track");
        self.record(
            "Split",
            json!({
                "original_id": id.0,
                "new_id": new_id.0,
                "frame": at_frame,
                "kept": if keep_head { "head" } else { "tail" },
            }),
        );
        Ok(SplitOutcome { new_id, new_len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BBox, Role};

    fn graph_with_range(id: u64, frames: std::ops::RangeInclusive<u64>) -> IdentityGraph {
        let mut g = IdentityGraph::new();
        let mut t = Track::new(TrackId(id));
        for f in frames {
            t.push(f, BBox::new(f as f64, 0.0, f as f64 + 5.0, 5.0));
        }
        t.role = Role::named("Target");
        g.tracks.insert(TrackId(id), t);
        g.lineage.insert(TrackId(id), TrackId(id));
        g
    }

    #[test]
    fn keep_head_moves_tail_to_new_id() {
        let mut g = graph_with_range(3, 10..=20);
        let out = g.split(TrackId(3), 15, true).unwrap();
        assert_eq!(out.new_id, TrackId(4));
        assert_eq!(out.new_len, 6);
        assert_eq!(g.track(TrackId(3)).unwrap().frames, (10..=14).collect::<Vec<_>>());
        let fresh = g.track(TrackId(4)).unwrap();
        assert_eq!(fresh.frames, (15..=20).collect::<Vec<_>>());
        assert!(fresh.role.is_ignore());
        assert!(fresh.merged_from.is_empty());
        assert_eq!(g.lineage()[&TrackId(4)], TrackId(4));
        assert_eq!(g.audit().last().unwrap().details["kept"], "head");
    }

    #[test]
    fn keep_tail_moves_head_to_new_id() {
        let mut g = graph_with_range(3, 10..=20);
        let out = g.split(TrackId(3), 15, false).unwrap();
        assert_eq!(out.new_len, 5);
        assert_eq!(g.track(TrackId(3)).unwrap().frames, (15..=20).collect::<Vec<_>>());
        assert_eq!(g.track(out.new_id).unwrap().frames, (10..=14).collect::<Vec<_>>());
        assert_eq!(g.track(TrackId(3)).unwrap().role, Role::named("Target"));
    }

    #[test]
    fn rejects_bad_split_points_without_mutation() {
        let mut g = graph_with_range(1, 10..=20);
        let before = g.state();
        assert!(matches!(
            g.split(TrackId(1), 10, true),
            Err(IdentityError::InvalidSplitPoint { rejection: SplitRejection::AtStart, .. })
        ));
        assert!(matches!(
            g.split(TrackId(1), 5, true),
            Err(IdentityError::InvalidSplitPoint { rejection: SplitRejection::AtStart, .. })
        ));
        assert!(matches!(
            g.split(TrackId(1), 21, true),
            Err(IdentityError::InvalidSplitPoint { rejection: SplitRejection::OutOfBounds, .. })
        ));
        assert!(matches!(g.split(TrackId(2), 15, true), Err(IdentityError::UnknownTrackId(_))));
        assert_eq!(g.state(), before);
        assert!(g.audit().is_empty());
    }

    #[test]
    fn split_then_merge_round_trips() {
        let mut g = graph_with_range(1, 10..=20);
        let original = g.track(TrackId(1)).unwrap().clone();
        let out = g.split(TrackId(1), 13, true).unwrap();
        assert!(g.merge(TrackId(1), out.new_id));
        let merged = g.track(TrackId(1)).unwrap();
        assert_eq!(merged.frames, original.frames);
        assert_eq!(merged.boxes, original.boxes);
    }
}
