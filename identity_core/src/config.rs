//! Tunable parameters for the bulk engines, the history buffer and the
//! session. Every struct has operator-friendly defaults and can be read from
//! a JSON file where missing fields fall back to those defaults.

use crate::{error::Result, types::Cast};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unsupervised auto-stitching parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchParams {
    /// Number of subsequent tracks (by start frame) considered per track
    pub lookahead: usize,
    /// Largest occlusion bridged, in seconds
    pub max_time_gap_secs: f64,
    /// Largest center-to-center jump bridged, in pixels
    pub max_distance: f64,
}

impl Default for StitchParams {
    fn default() -> Self {
        Self {
            lookahead: 15,
            max_time_gap_secs: 2.0,
            max_distance: 150.0,
        }
    }
}

/// Supervised noise absorption parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbsorbParams {
    /// Largest center-to-center jump between a fragment and its main track
    pub max_distance: f64,
    /// Largest gap between a fragment and its main track, in seconds
    pub max_time_gap_secs: f64,
}

impl Default for AbsorbParams {
    fn default() -> Self {
        Self {
            max_distance: 100.0,
            max_time_gap_secs: 2.0,
        }
    }
}

/// Undo/redo capacity policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Undo entries retained in total
    pub max_history: usize,
    /// Most recent entries kept in memory; older ones spill to disk
    pub ram_buffer: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history: 50,
            ram_buffer: 5,
        }
    }
}

/// Everything a [`crate::session::Session`] needs besides the data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sample rate of the source video
    pub fps: f64,
    pub stitch: StitchParams,
    pub absorb: AbsorbParams,
    pub history: HistoryConfig,
    /// Initial role table
    pub cast: Cast,
    /// Un-roled tracks shorter than this are hidden from listings (0 disables)
    pub hide_short_secs: f64,
    /// Loader progress callback interval, in records
    pub progress_every: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            stitch: StitchParams::default(),
            absorb: AbsorbParams::default(),
            history: HistoryConfig::default(),
            cast: Cast::default(),
            hide_short_secs: 1.0,
            progress_every: 1000,
        }
    }
}

impl SessionConfig {
    /// Read a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(config)
    }
}

/// Convert a duration in seconds to a frame count at `fps`.
pub fn secs_to_frames(secs: f64, fps: f64) -> f64 {
    secs * fps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: SessionConfig =
            serde_json::from_str(r#"{"fps": 25.0, "stitch": {"lookahead": 4}}"#).unwrap();
        assert_eq!(cfg.fps, 25.0);
        assert_eq!(cfg.stitch.lookahead, 4);
        assert_eq!(cfg.stitch.max_distance, 150.0);
        assert_eq!(cfg.history, HistoryConfig::default());
        assert_eq!(cfg.cast.len(), 3);
    }

    #[test]
    fn seconds_to_frames() {
        assert_eq!(secs_to_frames(2.0, 30.0), 60.0);
    }
}
