//! `sim` — Scenario simulator: subject trajectories, fragmenting tracker, stream output.

pub mod scenarios;
pub mod stream;
pub mod target;
pub mod tracker_sim;

pub use scenarios::{Scenario, ScenarioKind, SimOutput};
pub use stream::{load_truth, save_truth, write_stream, FrameRecord, GroundTruth};
pub use target::{MotionSpec, Target};
pub use tracker_sim::{FragmentParams, TrackerSim};
