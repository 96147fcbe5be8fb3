//! Imperfect tracker model.
//!
//! Turns ground-truth targets into the detections a real tracker would emit:
//! missed detections, id switches after a miss, box jitter, and spurious
//! short-lived fragments. The mapping from emitted track id back to target id
//! is kept for scoring.

use crate::{
    stream::{FrameRecord, RawDetection},
    target::Target,
};
use identity_core::BBox;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Fragmentation knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FragmentParams {
    /// Per-frame probability a visible target is missed
    pub p_miss: f64,
    /// Probability a target reappears under a fresh id after a miss
    pub p_switch_after_miss: f64,
    /// Per-frame probability a target drops its id while visible
    pub p_spontaneous_switch: f64,
    /// Box corner jitter, pixels (uniform ±)
    pub jitter: f64,
    /// Expected spurious fragments spawned per frame
    pub noise_rate: f64,
    /// Length range of spurious fragments, frames
    pub noise_len: (u64, u64),
    /// Probability a detection is emitted without a track id
    pub p_untracked: f64,
}

impl Default for FragmentParams {
    fn default() -> Self {
        Self {
            p_miss: 0.02,
            p_switch_after_miss: 0.5,
            p_spontaneous_switch: 0.002,
            jitter: 2.0,
            noise_rate: 0.01,
            noise_len: (2, 8),
            p_untracked: 0.0,
        }
    }
}

struct NoiseFragment {
    id: u64,
    frames_left: u64,
    bbox: BBox,
}

pub struct TrackerSim {
    params: FragmentParams,
    rng: ChaCha8Rng,
    next_id: u64,
    /// target id → currently assigned track id
    active: HashMap<u64, u64>,
    noise: Vec<NoiseFragment>,
    /// emitted track id → target id (noise fragments absent)
    truth: BTreeMap<u64, u64>,
    frame_size: (f64, f64),
}

impl TrackerSim {
    pub fn new(params: FragmentParams, seed: u64, frame_size: (f64, f64)) -> Self {
        Self {
            params,
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_id: 1,
            active: HashMap::new(),
            noise: Vec::new(),
            truth: BTreeMap::new(),
            frame_size,
        }
    }

    fn fresh_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn jittered(&mut self, b: BBox) -> BBox {
        let j = self.params.jitter;
        if j <= 0.0 {
            return b;
        }
        let mut d = || self.rng.gen_range(-j..=j);
        BBox::new(b.x1 + d(), b.y1 + d(), b.x2 + d(), b.y2 + d())
    }

    /// Emit one frame of detections for the given targets.
    pub fn observe(&mut self, frame: u64, targets: &[Target]) -> FrameRecord {
        let mut det = Vec::new();

        for target in targets.iter().filter(|t| t.is_active(frame)) {
            if self.rng.gen::<f64>() < self.params.p_miss {
                if self.rng.gen::<f64>() < self.params.p_switch_after_miss {
                    self.active.remove(&target.id);
                }
                continue;
            }
            if self.rng.gen::<f64>() < self.params.p_spontaneous_switch {
                self.active.remove(&target.id);
            }
            let track_id = match self.active.get(&target.id) {
                Some(id) => *id,
                None => {
                    let id = self.fresh_id();
                    self.active.insert(target.id, id);
                    self.truth.insert(id, target.id);
                    id
                }
            };
            let bbox = self.jittered(target.bbox());
            det.push(self.detection(Some(track_id), bbox));
        }

        if self.rng.gen::<f64>() < self.params.noise_rate {
            let (lo, hi) = self.params.noise_len;
            let (w, h) = self.frame_size;
            let x = self.rng.gen_range(0.0..w.max(1.0));
            let y = self.rng.gen_range(0.0..h.max(1.0));
            let id = self.fresh_id();
            self.noise.push(NoiseFragment {
                id,
                frames_left: self.rng.gen_range(lo.max(1)..=hi.max(lo.max(1))),
                bbox: BBox::new(x, y, x + 40.0, y + 90.0),
            });
        }
        let mut fragments = std::mem::take(&mut self.noise);
        for frag in &mut fragments {
            let bbox = self.jittered(frag.bbox);
            det.push(self.detection(Some(frag.id), bbox));
            frag.frames_left -= 1;
        }
        fragments.retain(|f| f.frames_left > 0);
        self.noise = fragments;

        FrameRecord { f_idx: frame, det }
    }

    fn detection(&mut self, track_id: Option<u64>, bbox: BBox) -> RawDetection {
        let untracked = self.rng.gen::<f64>() < self.params.p_untracked;
        RawDetection {
            track_id: if untracked { None } else { track_id.map(|id| id as i64) },
            conf: self.rng.gen_range(0.5..1.0),
            bbox: bbox.into(),
        }
    }

    /// Emitted track id → target id, for every id that followed a target.
    pub fn truth(&self) -> &BTreeMap<u64, u64> {
        &self.truth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::MotionSpec;

    #[test]
    fn perfect_tracker_keeps_one_id_per_target() {
        let params = FragmentParams {
            p_miss: 0.0,
            p_spontaneous_switch: 0.0,
            noise_rate: 0.0,
            jitter: 0.0,
            ..FragmentParams::default()
        };
        let mut sim = TrackerSim::new(params, 7, (1920.0, 1080.0));
        let mut targets = vec![
            Target::new(0, [100.0, 500.0], [3.0, 0.0], MotionSpec::ConstantVelocity),
            Target::new(1, [900.0, 500.0], [-3.0, 0.0], MotionSpec::ConstantVelocity),
        ];
        for f in 0..50 {
            let rec = sim.observe(f, &targets);
            assert_eq!(rec.det.len(), 2);
            targets.iter_mut().for_each(Target::step);
        }
        assert_eq!(sim.truth().len(), 2);
    }

    #[test]
    fn misses_fragment_ids() {
        let params = FragmentParams {
            p_miss: 0.2,
            p_switch_after_miss: 1.0,
            noise_rate: 0.0,
            ..FragmentParams::default()
        };
        let mut sim = TrackerSim::new(params, 3, (1920.0, 1080.0));
        let targets = vec![Target::new(
            0,
            [100.0, 500.0],
            [0.0, 0.0],
            MotionSpec::ConstantVelocity,
        )];
        for f in 0..300 {
            sim.observe(f, &targets);
        }
        assert!(sim.truth().len() > 5);
        assert!(sim.truth().values().all(|t| *t == 0));
    }
}
