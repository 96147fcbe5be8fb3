//! `identity_core` — Identity consolidation over fragmented tracker output.
//!
//! # Module layout
//! - [`types`]    — Ids, boxes, roles and the cast
//! - [`track`]    — Track storage and summary rows
//! - [`graph`]    — Track store, lineage map and audit log under one owner
//! - [`loader`]   — Gzip NDJSON detection stream → scratch store
//! - [`merge`]    — Low-level, manual and role-wide merges
//! - [`split`]    — Split a track at a frame
//! - [`stitch`]   — Automatic tail-to-head stitching
//! - [`absorb`]   — Fold short noise fragments into main tracks
//! - [`audit`]    — Append-only action log
//! - [`history`]  — Bounded undo/redo with disk spillover
//! - [`autosave`] — Atomic whole-session autosave and restore
//! - [`export`]   — Identity map and audit log outputs
//! - [`session`]  — Lock-guarded session tying it all together
//! - [`worker`]   — Background jobs with progress and cancellation
//! - [`config`]   — Tunables

pub mod absorb;
pub mod audit;
pub mod autosave;
pub mod config;
pub mod error;
pub mod export;
pub mod graph;
pub mod history;
pub mod loader;
pub mod merge;
pub mod session;
pub mod split;
pub mod stitch;
pub mod track;
pub mod types;
pub mod worker;

pub use absorb::NoiseAbsorber;
pub use audit::{AuditEntry, AuditLog};
pub use config::{AbsorbParams, HistoryConfig, SessionConfig, StitchParams};
pub use error::{IdentityError, Result};
pub use graph::{GraphState, IdentityGraph};
pub use history::{HistoryManager, HistoryStats};
pub use loader::{CancelFlag, LoadedStream, StreamLoader};
pub use merge::RoleMergeReport;
pub use session::{LoadSummary, Session};
pub use split::SplitOutcome;
pub use stitch::AutoStitcher;
pub use track::{Track, TrackSummary};
pub use types::{BBox, Cast, Frame, Role, TrackId};
pub use worker::{spawn_job, spawn_load, JobEvent, JobHandle};
