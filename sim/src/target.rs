//! Ground-truth subjects moving in image space.
//!
//! Each target has a true state [px, py, vx, vy] in pixels and pixels/frame
//! plus a fixed box size. The simulator steps each target once per frame.

use identity_core::BBox;
use serde::{Deserialize, Serialize};

/// How a target moves between frames.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MotionSpec {
    /// No acceleration.
    ConstantVelocity,
    /// Constant yaw rate in the image plane. `omega` in rad/frame.
    ConstantTurn { omega: f64 },
    /// Walk back and forth between `x_min` and `x_max`.
    Pacing { x_min: f64, x_max: f64 },
}

/// A simulated subject with ground-truth state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Target {
    /// Ground-truth subject id
    pub id: u64,
    /// True state [px, py, vx, vy]
    pub state: [f64; 4],
    /// Box width and height
    pub size: [f64; 2],
    pub motion: MotionSpec,
    /// First frame the target is visible
    pub appear_at: Option<u64>,
    /// Target leaves the scene at this frame
    pub disappear_at: Option<u64>,
}

impl Target {
    pub fn new(id: u64, pos: [f64; 2], vel: [f64; 2], motion: MotionSpec) -> Self {
        Self {
            id,
            state: [pos[0], pos[1], vel[0], vel[1]],
            size: [60.0, 160.0],
            motion,
            appear_at: None,
            disappear_at: None,
        }
    }

    /// Advance one frame.
    pub fn step(&mut self) {
        let s = &mut self.state;
        match self.motion {
            MotionSpec::ConstantVelocity => {}
            MotionSpec::ConstantTurn { omega } => {
                let v = s[2].hypot(s[3]);
                let heading = s[3].atan2(s[2]) + omega;
                s[2] = v * heading.cos();
                s[3] = v * heading.sin();
            }
            MotionSpec::Pacing { x_min, x_max } => {
                if (s[0] <= x_min && s[2] < 0.0) || (s[0] >= x_max && s[2] > 0.0) {
                    s[2] = -s[2];
                }
            }
        }
        s[0] += s[2];
        s[1] += s[3];
    }

    pub fn is_active(&self, frame: u64) -> bool {
        self.appear_at.map_or(true, |a| frame >= a) && self.disappear_at.map_or(true, |d| frame < d)
    }

    /// Box centered on the true position.
    pub fn bbox(&self) -> BBox {
        let [w, h] = self.size;
        let [x, y, ..] = self.state;
        BBox::new(x - w / 2.0, y - h / 2.0, x + w / 2.0, y + h / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacing_reverses_at_bounds() {
        let pacing = MotionSpec::Pacing {
            x_min: 0.0,
            x_max: 100.0,
        };
        let mut t = Target::new(0, [95.0, 0.0], [10.0, 0.0], pacing);
        t.step();
        assert_eq!(t.state[0], 105.0);
        t.step();
        assert_eq!(t.state[0], 95.0);
    }

    #[test]
    fn visibility_window_is_half_open() {
        let mut t = Target::new(0, [0.0, 0.0], [0.0, 0.0], MotionSpec::ConstantVelocity);
        t.appear_at = Some(5);
        t.disappear_at = Some(10);
        assert!(!t.is_active(4));
        assert!(t.is_active(5));
        assert!(!t.is_active(10));
    }
}
