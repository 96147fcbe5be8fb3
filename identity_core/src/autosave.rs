//! Crash-safe autosave of the whole graph.
//!
//! Layout: `{"tracks": {...}, "id_lineage": {...}, "audit_log": [...]}`. The
//! file is written to a temporary sibling and renamed into place, so a crash
//! mid-write never leaves a truncated autosave behind.

use crate::{
    audit::AuditLog,
    error::{IdentityError, Result},
    graph::{IdentityGraph, Lineage, TrackMap},
    loader::SYNTHETIC_ID_BASE,
};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};
use tempfile::NamedTempFile;
use tracing::info;

#[derive(Serialize)]
struct AutosaveRef<'a> {
    tracks: &'a TrackMap,
    id_lineage: &'a Lineage,
    audit_log: &'a AuditLog,
}

#[derive(Deserialize)]
struct AutosaveFile {
    tracks: TrackMap,
    #[serde(default)]
    id_lineage: Lineage,
    #[serde(default)]
    audit_log: AuditLog,
}

/// Write `graph` to `path` atomically.
pub fn write_autosave(graph: &IdentityGraph, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer(
            &mut writer,
            &AutosaveRef {
                tracks: graph.tracks(),
                id_lineage: graph.lineage(),
                audit_log: graph.audit(),
            },
        )?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| IdentityError::Io(e.error))?;
    info!(path = %path.display(), tracks = graph.len(), "autosave written");
    Ok(())
}

/// Read an autosave, filling in any lineage the file lacks.
pub fn read_autosave(path: &Path) -> Result<IdentityGraph> {
    let file = File::open(path)?;
    let saved: AutosaveFile = serde_json::from_reader(BufReader::new(file))?;
    let mut lineage = saved.id_lineage;
    let added = repair_lineage(&saved.tracks, &mut lineage);
    let mut graph = IdentityGraph::from_parts(saved.tracks, lineage, saved.audit_log);
    graph.untracked_present = graph.lineage.keys().any(|id| id.0 >= SYNTHETIC_ID_BASE);
    info!(
        path = %path.display(),
        tracks = graph.len(),
        repaired = added,
        untracked_present = graph.untracked_present,
        "autosave restored"
    );
    Ok(graph)
}

/// Ensure every live id maps to itself and every id in a track's provenance
/// maps to that track. Existing entries win. Returns the number added.
pub fn repair_lineage(tracks: &TrackMap, lineage: &mut Lineage) -> usize {
    let before = lineage.len();
    for (id, track) in tracks {
        lineage.entry(*id).or_insert(*id);
        for historical in &track.merged_from {
            lineage.entry(*historical).or_insert(*id);
        }
    }
    lineage.len() - before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        track::Track,
        types::{BBox, Role, TrackId},
    };
    use serde_json::json;

    #[test]
    fn round_trip_preserves_graph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.autosave.json");

        let mut g = IdentityGraph::new();
        g.tracks.insert(TrackId(1), {
            let mut t = Track::new(TrackId(1));
            t.push(4, BBox::new(1.0, 2.0, 3.0, 4.0));
            t.role = Role::named("Target");
            t
        });
        g.lineage.insert(TrackId(1), TrackId(1));
        g.lineage.insert(TrackId(2), TrackId(1));
        g.record("Merge", json!({"master": 1, "slave": 2}));

        write_autosave(&g, &path).unwrap();
        let back = read_autosave(&path).unwrap();
        assert_eq!(back.state(), g.state());
        assert_eq!(back.audit(), g.audit());
        // only the final file remains
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn restore_synthesizes_missing_lineage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        std::fs::write(
            &path,
            r#"{"tracks": {"3": {"frames": [1, 2], "boxes": [[0,0,1,1],[0,0,1,1]],
                "role": "Confederate_1", "merged_from": [3, 8, 9]}}}"#,
        )
        .unwrap();
        let g = read_autosave(&path).unwrap();
        assert_eq!(g.lineage().len(), 3);
        assert_eq!(g.lineage()[&TrackId(9)], TrackId(3));
        assert_eq!(g.resolve(TrackId(8)), Some(TrackId(3)));
        assert!(g.audit().is_empty());
        assert!(!g.untracked_present());
    }

    #[test]
    fn restore_flags_synthetic_ids_as_untracked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("untracked.json");
        let synthetic = crate::loader::synthetic_id(40, 2).unwrap();

        let mut g = IdentityGraph::new();
        for id in [TrackId(1), synthetic] {
            let mut t = Track::new(id);
            t.push(40, BBox::new(0.0, 0.0, 1.0, 1.0));
            g.tracks.insert(id, t);
            g.lineage.insert(id, id);
        }
        write_autosave(&g, &path).unwrap();
        assert!(read_autosave(&path).unwrap().untracked_present());

        // still flagged once the fragment has been merged away
        g.merge(TrackId(1), synthetic);
        write_autosave(&g, &path).unwrap();
        let back = read_autosave(&path).unwrap();
        assert!(back.untracked_present());
        assert_eq!(back.visible_summaries(30.0, &Default::default(), 1.0).len(), 1);
    }

    #[test]
    fn keys_are_string_encoded_ids() {
        let mut g = IdentityGraph::new();
        g.tracks.insert(TrackId(12), Track::new(TrackId(12)));
        g.lineage.insert(TrackId(12), TrackId(12));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        write_autosave(&g, &path).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["id_lineage"]["12"], 12);
        assert_eq!(raw["tracks"]["12"]["role"], "Ignore");
    }
}
