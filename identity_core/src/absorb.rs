//! Supervised noise absorption: folding short un-roled fragments into the
//! role-bearing main track they continue.
//!
//! Unlike auto-stitching, candidates are only ever merged into a main track,
//! never with each other, and a candidate whose frame span overlaps the main
//! track's span is never absorbed regardless of distance.

use crate::{
    config::{secs_to_frames, AbsorbParams},
    graph::IdentityGraph,
    track::Track,
    types::{Cast, TrackId},
};
use serde_json::json;
use tracing::{debug, info};

/// Runs noise absorption with fixed parameters.
#[derive(Clone, Debug)]
pub struct NoiseAbsorber {
    max_distance: f64,
    max_gap_frames: f64,
}

impl NoiseAbsorber {
    /// `max_gap_frames` is the exclusive upper bound on the frame gap.
    pub fn new(max_distance: f64, max_gap_frames: f64) -> Self {
        Self {
            max_distance,
            max_gap_frames,
        }
    }

    /// Build from seconds-based parameters at the given sample rate.
    pub fn from_params(params: &AbsorbParams, fps: f64) -> Self {
        Self::new(params.max_distance, secs_to_frames(params.max_time_gap_secs, fps))
    }

    /// Absorb candidates until a pass absorbs nothing. Returns the number of
    /// fragments absorbed.
    pub fn run(&self, graph: &mut IdentityGraph, cast: &Cast) -> usize {
        let mut main = Vec::new();
        let mut candidates = Vec::new();
        for (id, track) in graph.tracks() {
            if cast.contains(&track.role) {
                main.push(*id);
            } else {
                candidates.push(*id);
            }
        }

        let mut absorbed = 0;
        let mut changed = true;
        while changed {
            changed = false;
            for &main_id in &main {
                let mut taken = Vec::new();
                for &cand_id in &candidates {
                    let (Some(m), Some(c)) = (graph.track(main_id), graph.track(cand_id)) else {
                        continue;
                    };
                    if self.accepts(m, c) {
                        graph.merge(main_id, cand_id);
                        debug!(main = %main_id, fragment = %cand_id, "absorbed fragment");
                        absorbed += 1;
                        changed = true;
                        taken.push(cand_id);
                    }
                }
                candidates.retain(|c| !taken.contains(c));
            }
        }

        info!(absorbed, main_tracks = main.len(), "noise absorption finished");
        if absorbed > 0 {
            graph.record(
                "AbsorbNoise",
                json!({
                    "absorbed": absorbed,
                    "max_distance": self.max_distance,
                    "max_gap_frames": self.max_gap_frames,
                }),
            );
        }
        absorbed
    }

    /// True if `cand` continues `main` just before or just after it.
    fn accepts(&self, main: &Track, cand: &Track) -> bool {
        let (Some(m_span), Some(c_span)) = (main.span(), cand.span()) else {
            return false;
        };
        if c_span.start() <= m_span.end() && m_span.start() <= c_span.end() {
            return false;
        }

        let within = |gap: i64| gap > 0 && (gap as f64) < self.max_gap_frames;

        let gap_after = *c_span.start() as i64 - *m_span.end() as i64;
        let after = within(gap_after)
            && matches!(
                (main.last_box(), cand.first_box()),
                (Some(m), Some(c)) if m.center_distance(c) < self.max_distance
            );

        let gap_before = *m_span.start() as i64 - *c_span.end() as i64;
        let before = within(gap_before)
            && matches!(
                (cand.last_box(), main.first_box()),
                (Some(c), Some(m)) if c.center_distance(m) < self.max_distance
            );

        after || before
    }
}
