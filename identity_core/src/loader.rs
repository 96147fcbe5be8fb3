//! Detection loader: gzip NDJSON tracker output → scratch track store.
//!
//! The whole stream is parsed into private scratch state. Only a fully parsed
//! stream is committed to a live [`IdentityGraph`]; a truncated or malformed
//! stream, or a cancellation, leaves the live graph untouched.
//!
//! # Untracked detections
//! Detections without a tracker id (`null` or negative) get a synthesized id
//! `SYNTHETIC_ID_BASE + frame * SYNTHETIC_FRAME_STRIDE + position`, where
//! `position` is the detection's index within its frame record. Source ids
//! must stay below the base so the two ranges never collide.

use crate::{
    error::{IdentityError, Result},
    graph::{IdentityGraph, Lineage, TrackMap},
    track::Track,
    types::{BBox, Frame, TrackId},
};
use flate2::read::MultiGzDecoder;
use serde::Deserialize;
use serde_json::json;
use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{debug, info};

/// First synthesized id. Source ids must be smaller.
pub const SYNTHETIC_ID_BASE: u64 = 1 << 32;

/// Id space reserved per frame for untracked detections.
pub const SYNTHETIC_FRAME_STRIDE: u64 = 4096;

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FrameRecord {
    f_idx: Frame,
    #[serde(default)]
    det: Vec<RawDetection>,
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    #[serde(default)]
    track_id: Option<i64>,
    #[serde(rename = "box")]
    bbox: RawBox,
}

#[derive(Debug, Deserialize)]
struct RawBox {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag shared between a worker and its owner.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Scratch store
// ---------------------------------------------------------------------------

/// A fully parsed stream, ready to be committed.
#[derive(Clone, Debug, Default)]
pub struct LoadedStream {
    pub tracks: TrackMap,
    pub lineage: Lineage,
    /// Frame records read
    pub records: usize,
    /// Detections read
    pub detections: usize,
    /// Detections that received a synthesized id
    pub untracked: usize,
}

impl LoadedStream {
    pub fn untracked_present(&self) -> bool {
        self.untracked > 0
    }

    fn ingest(&mut self, line: usize, record: FrameRecord) -> Result<()> {
        for (pos, det) in record.det.into_iter().enumerate() {
            let id = match det.track_id {
                Some(raw) if raw >= 0 => {
                    let raw = raw as u64;
                    if raw >= SYNTHETIC_ID_BASE {
                        return Err(IdentityError::malformed(
                            line,
                            format!("track id {raw} collides with the synthetic id range"),
                        ));
                    }
                    TrackId(raw)
                }
                _ => {
                    self.untracked += 1;
                    synthetic_id(record.f_idx, pos).ok_or_else(|| {
                        IdentityError::malformed(
                            line,
                            "cannot synthesize id for untracked detection",
                        )
                    })?
                }
            };
            let b = det.bbox;
            self.tracks
                .entry(id)
                .or_insert_with(|| Track::new(id))
                .push(record.f_idx, BBox::new(b.x1, b.y1, b.x2, b.y2));
            self.lineage.insert(id, id);
            self.detections += 1;
        }
        self.records += 1;
        Ok(())
    }

    fn finish(mut self) -> Self {
        for track in self.tracks.values_mut() {
            track.sort_by_frame();
        }
        self
    }
}

/// Synthesized id for the detection at `pos` within frame `frame`.
pub fn synthetic_id(frame: Frame, pos: usize) -> Option<TrackId> {
    let pos = pos as u64;
    if pos >= SYNTHETIC_FRAME_STRIDE {
        return None;
    }
    frame
        .checked_mul(SYNTHETIC_FRAME_STRIDE)?
        .checked_add(pos)?
        .checked_add(SYNTHETIC_ID_BASE)
        .map(TrackId)
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Streaming parser with optional cancellation and progress reporting.
#[derive(Default)]
pub struct StreamLoader<'a> {
    cancel: Option<CancelFlag>,
    progress_every: usize,
    on_progress: Option<Box<dyn FnMut(usize) + Send + 'a>>,
}

impl<'a> StreamLoader<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `flag` between records and abort with [`IdentityError::Cancelled`].
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Call `f(records_read)` every `every` records.
    pub fn with_progress(mut self, every: usize, f: impl FnMut(usize) + Send + 'a) -> Self {
        self.progress_every = every;
        self.on_progress = Some(Box::new(f));
        self
    }

    /// Parse a gzip-compressed stream from disk.
    pub fn load_path(&mut self, path: &Path) -> Result<LoadedStream> {
        let file = File::open(path)?;
        let loaded = self.read_gz(file)?;
        info!(
            path = %path.display(),
            records = loaded.records,
            tracks = loaded.tracks.len(),
            untracked = loaded.untracked,
            "detection stream parsed"
        );
        Ok(loaded)
    }

    /// Parse a gzip-compressed stream.
    pub fn read_gz<R: Read>(&mut self, reader: R) -> Result<LoadedStream> {
        self.read(BufReader::new(MultiGzDecoder::new(reader)))
    }

    /// Parse an uncompressed NDJSON stream.
    pub fn read<R: BufRead>(&mut self, reader: R) -> Result<LoadedStream> {
        let mut scratch = LoadedStream::default();
        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
                debug!(line = line_no, "load cancelled");
                return Err(IdentityError::Cancelled);
            }
            let line = line.map_err(|e| IdentityError::malformed(line_no, e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: FrameRecord = serde_json::from_str(&line)
                .map_err(|e| IdentityError::malformed(line_no, e.to_string()))?;
            scratch.ingest(line_no, record)?;

            if self.progress_every > 0 && scratch.records % self.progress_every == 0 {
                if let Some(cb) = self.on_progress.as_mut() {
                    cb(scratch.records);
                }
            }
        }
        Ok(scratch.finish())
    }
}

impl IdentityGraph {
    /// Replace the live store, lineage and audit log with a parsed stream.
    pub fn commit_load(&mut self, loaded: LoadedStream, source: &str) {
        let untracked_present = loaded.untracked_present();
        self.tracks = loaded.tracks;
        self.lineage = loaded.lineage;
        self.untracked_present = untracked_present;
        self.audit.clear();
        self.record(
            "Load",
            json!({
                "source": source,
                "records": loaded.records,
                "detections": loaded.detections,
                "tracks": self.tracks.len(),
                "untracked": loaded.untracked,
            }),
        );
        info!(tracks = self.tracks.len(), untracked_present, "load committed");
    }
}
