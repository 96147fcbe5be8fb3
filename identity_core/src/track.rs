//! Track: chronological detection history, role label and provenance.

use crate::types::{BBox, Frame, Role, TrackId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// One consolidated identity. The track's id is its key in the store.
///
/// `frames` and `boxes` are parallel and sorted by frame after every mutation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Frame index of each detection (ascending)
    pub frames: Vec<Frame>,
    /// Detection box for each entry of `frames`
    pub boxes: Vec<BBox>,
    /// Human-assigned label
    #[serde(default)]
    pub role: Role,
    /// Original ids folded into this track
    #[serde(default)]
    pub merged_from: BTreeSet<TrackId>,
}

impl Track {
    /// Empty track whose provenance is its own original id.
    pub fn new(origin: TrackId) -> Self {
        Self {
            merged_from: BTreeSet::from([origin]),
            ..Default::default()
        }
    }

    /// Build a track from already-paired detections (sorted on the way in).
    pub fn from_detections(
        merged_from: BTreeSet<TrackId>,
        detections: Vec<(Frame, BBox)>,
    ) -> Self {
        let mut track = Self {
            merged_from,
            ..Default::default()
        };
        for (frame, bbox) in detections {
            track.push(frame, bbox);
        }
        track.sort_by_frame();
        track
    }

    /// Append one detection. Call [`Track::sort_by_frame`] when done appending
    /// out-of-order data.
    pub fn push(&mut self, frame: Frame, bbox: BBox) {
        self.frames.push(frame);
        self.boxes.push(bbox);
    }

    /// Stable sort of the parallel sequences by frame.
    pub fn sort_by_frame(&mut self) {
        if self.frames.windows(2).all(|w| w[0] <= w[1]) {
            return;
        }
        let mut paired: Vec<(Frame, BBox)> = self.detections().collect();
        paired.sort_by_key(|(frame, _)| *frame);
        let (frames, boxes) = paired.into_iter().unzip();
        self.frames = frames;
        self.boxes = boxes;
    }

    /// Detections as `(frame, box)` pairs in stored order.
    pub fn detections(&self) -> impl Iterator<Item = (Frame, BBox)> + '_ {
        self.frames.iter().copied().zip(self.boxes.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn first_frame(&self) -> Option<Frame> {
        self.frames.first().copied()
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.frames.last().copied()
    }

    pub fn first_box(&self) -> Option<&BBox> {
        self.boxes.first()
    }

    pub fn last_box(&self) -> Option<&BBox> {
        self.boxes.last()
    }

    /// Inclusive frame span, `None` for an empty track.
    pub fn span(&self) -> Option<RangeInclusive<Frame>> {
        Some(self.first_frame()?..=self.last_frame()?)
    }

    /// Seconds covered by the detections at the given sample rate.
    pub fn duration_secs(&self, fps: f64) -> f64 {
        if fps <= 0.0 {
            return 0.0;
        }
        self.len() as f64 / fps
    }
}

/// Read-only row describing one live track, for listings and exports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub id: TrackId,
    pub detections: usize,
    pub duration_secs: f64,
    pub first_frame: Option<Frame>,
    pub last_frame: Option<Frame>,
    pub role: Role,
    pub merged_from: Vec<TrackId>,
}

impl TrackSummary {
    pub fn new(id: TrackId, track: &Track, fps: f64) -> Self {
        Self {
            id,
            detections: track.len(),
            duration_secs: track.duration_secs(fps),
            first_frame: track.first_frame(),
            last_frame: track.last_frame(),
            role: track.role.clone(),
            merged_from: track.merged_from.iter().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(x: f64) -> BBox {
        BBox::new(x, 0.0, x + 1.0, 1.0)
    }

    #[test]
    fn sort_is_stable_on_equal_frames() {
        let mut t = Track::new(TrackId(1));
        t.push(5, b(0.0));
        t.push(3, b(1.0));
        t.push(5, b(2.0));
        t.push(3, b(3.0));
        t.sort_by_frame();
        assert_eq!(t.frames, vec![3, 3, 5, 5]);
        let xs: Vec<f64> = t.boxes.iter().map(|bb| bb.x1).collect();
        assert_eq!(xs, vec![1.0, 3.0, 0.0, 2.0]);
    }

    #[test]
    fn span_and_duration() {
        let t = Track::from_detections(
            BTreeSet::from([TrackId(2)]),
            vec![(12, b(0.0)), (10, b(0.0)), (11, b(0.0))],
        );
        assert_eq!(t.span(), Some(10..=12));
        assert!((t.duration_secs(30.0) - 0.1).abs() < 1e-12);
        assert_eq!(Track::default().span(), None);
    }
}
