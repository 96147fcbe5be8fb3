//! Detection stream I/O: write simulated output in the tracker's gzip NDJSON
//! format, plus the ground-truth sidecar used for scoring.

use flate2::{write::GzEncoder, Compression};
use identity_core::BBox;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// One line of the stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrameRecord {
    pub f_idx: u64,
    pub det: Vec<RawDetection>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawDetection {
    /// `None` serializes as `null` (untracked)
    pub track_id: Option<i64>,
    pub conf: f64,
    #[serde(rename = "box")]
    pub bbox: RawBox,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RawBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl From<BBox> for RawBox {
    fn from(b: BBox) -> Self {
        Self {
            x1: b.x1,
            y1: b.y1,
            x2: b.x2,
            y2: b.y2,
        }
    }
}

/// Write records as gzip-compressed NDJSON.
pub fn write_stream(records: &[FrameRecord], path: &Path) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let mut enc = GzEncoder::new(BufWriter::new(file), Compression::default());
    for rec in records {
        serde_json::to_writer(&mut enc, rec)?;
        enc.write_all(b"\n")?;
    }
    enc.finish()?.flush()?;
    Ok(())
}

/// Ground truth recorded next to a generated stream.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GroundTruth {
    pub scenario_name: String,
    pub seed: u64,
    pub fps: f64,
    /// Emitted track id → subject id
    pub track_to_target: BTreeMap<u64, u64>,
}

pub fn save_truth(truth: &GroundTruth, path: &Path) -> anyhow::Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, truth)?;
    Ok(())
}

pub fn load_truth(path: &Path) -> anyhow::Result<GroundTruth> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
