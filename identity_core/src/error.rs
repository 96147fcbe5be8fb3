//! Error types for the identity engine.
//!
//! No error here is fatal: each one means "the requested operation did not
//! happen" and the live state is exactly what it was before the call.

use crate::types::{Frame, TrackId};
use thiserror::Error;

/// Result type alias for the identity engine
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Why a split point was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitRejection {
    /// The split frame is at or before the first frame of the track
    AtStart,
    /// No frame of the track is at or after the split frame
    OutOfBounds,
}

impl std::fmt::Display for SplitRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitRejection::AtStart => f.write_str("split point is at or before the first frame"),
            SplitRejection::OutOfBounds => f.write_str("split point is past the last frame"),
        }
    }
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("malformed detection stream at line {line}: {reason}")]
    MalformedStream { line: usize, reason: String },

    #[error("unknown track id {0}")]
    UnknownTrackId(TrackId),

    #[error("cannot split track {track} at frame {frame}: {rejection}")]
    InvalidSplitPoint {
        track: TrackId,
        frame: Frame,
        rejection: SplitRejection,
    },

    #[error("snapshot serialization failed: {0}")]
    SerializationFailure(String),

    #[error("operation cancelled by operator")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IdentityError {
    pub fn malformed<S: Into<String>>(line: usize, reason: S) -> Self {
        Self::MalformedStream {
            line,
            reason: reason.into(),
        }
    }

    pub fn serialization<E: std::fmt::Display>(err: E) -> Self {
        Self::SerializationFailure(err.to_string())
    }
}

impl From<bincode::Error> for IdentityError {
    fn from(err: bincode::Error) -> Self {
        Self::serialization(err)
    }
}
