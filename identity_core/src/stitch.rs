//! Unsupervised auto-stitching of temporally and spatially adjacent fragments.
//!
//! # Algorithm
//! Repeat until a full pass merges nothing:
//! 1. Order live tracks by first frame (ties by id).
//! 2. For each track A, look at the next `lookahead` tracks B. B is eligible
//!    when it starts strictly after A ends and within `max_time_gap` frames.
//! 3. Among eligible B pick the smallest distance between A's last box center
//!    and B's first box center; the earliest candidate wins ties.
//! 4. Merge if that distance is below `max_distance`, then re-evaluate A at
//!    the same position of the refreshed ordering.
//!
//! This is a greedy local heuristic. It can merge unrelated fragments; callers
//! confirm with the operator and rely on undo.

use crate::{
    config::{secs_to_frames, StitchParams},
    graph::IdentityGraph,
    types::TrackId,
};
use serde_json::json;
use tracing::{debug, info};

/// Runs auto-stitching with fixed parameters.
#[derive(Clone, Debug)]
pub struct AutoStitcher {
    params: StitchParams,
    max_gap_frames: f64,
}

impl AutoStitcher {
    pub fn new(params: StitchParams, fps: f64) -> Self {
        let max_gap_frames = secs_to_frames(params.max_time_gap_secs, fps);
        Self {
            params,
            max_gap_frames,
        }
    }

    pub fn params(&self) -> &StitchParams {
        &self.params
    }

    /// Stitch until a fixed point. Returns the number of merges performed.
    pub fn run(&self, graph: &mut IdentityGraph) -> usize {
        let mut merged = 0;
        let mut passes = 0;
        loop {
            passes += 1;
            let mut changed = false;
            let mut order = start_order(graph);
            let mut i = 0;
            while i + 1 < order.len() {
                match self.best_candidate(graph, &order, i) {
                    Some(b) => {
                        graph.merge(order[i], b);
                        merged += 1;
                        changed = true;
                        // A keeps its start frame, so it stays at index i.
                        order = start_order(graph);
                    }
                    None => i += 1,
                }
            }
            if !changed {
                break;
            }
        }

        info!(merged, passes, "auto-stitch finished");
        if merged > 0 {
            self.record(graph, merged);
        }
        merged
    }

    fn best_candidate(
        &self,
        graph: &IdentityGraph,
        order: &[TrackId],
        i: usize,
    ) -> Option<TrackId> {
        let a = graph.track(order[i])?;
        let a_last = a.last_frame()?;
        let a_box = a.last_box()?;

        let end = (i + 1 + self.params.lookahead).min(order.len());
        let mut best: Option<(TrackId, f64)> = None;
        for &b_id in &order[i + 1..end] {
            let Some(b) = graph.track(b_id) else { continue };
            let (Some(b_first), Some(b_box)) = (b.first_frame(), b.first_box()) else {
                continue;
            };
            let gap = b_first as i64 - a_last as i64;
            if gap <= 0 || gap as f64 > self.max_gap_frames {
                continue;
            }
            let dist = a_box.center_distance(b_box);
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((b_id, dist));
            }
        }

        let (b_id, dist) = best?;
        if dist < self.params.max_distance {
            debug!(a = %order[i], b = %b_id, dist, "stitch candidate accepted");
            Some(b_id)
        } else {
            None
        }
    }

    fn record(&self, graph: &mut IdentityGraph, merged: usize) {
        graph.record(
            "AutoStitch",
            json!({
                "merged": merged,
                "lookahead": self.params.lookahead,
                "max_time_gap_secs": self.params.max_time_gap_secs,
                "max_distance": self.params.max_distance,
            }),
        );
    }
}

/// Live track ids ordered by first frame, then id. Empty tracks are skipped.
fn start_order(graph: &IdentityGraph) -> Vec<TrackId> {
    let mut order: Vec<(u64, TrackId)> = graph
        .tracks()
        .iter()
        .filter_map(|(id, t)| Some((t.first_frame()?, *id)))
        .collect();
    order.sort_unstable();
    order.into_iter().map(|(_, id)| id).collect()
}
