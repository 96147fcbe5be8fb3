//! Outputs consumed by downstream geometry and statistics stages.

use crate::{error::Result, graph::IdentityGraph};
use serde_json::{Map, Value};
use std::{fs::File, io::BufWriter, path::Path};
use tracing::info;

/// `{"<original id>": "<role>", ...}` with un-roled ids omitted.
pub fn identity_map_json(graph: &IdentityGraph) -> Value {
    let map: Map<String, Value> = graph
        .identity_map()
        .into_iter()
        .map(|(id, role)| (id.to_string(), Value::String(role.into())))
        .collect();
    Value::Object(map)
}

/// Write the identity map. Returns the number of mapped original ids.
pub fn write_identity_map(graph: &IdentityGraph, path: &Path) -> Result<usize> {
    let json = identity_map_json(graph);
    let count = json.as_object().map_or(0, Map::len);
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, &json)?;
    info!(path = %path.display(), mapped = count, "identity map written");
    Ok(count)
}

/// Write the audit log as a JSON array.
pub fn write_audit_log(graph: &IdentityGraph, path: &Path) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, graph.audit().entries())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        track::Track,
        types::{Role, TrackId},
    };

    #[test]
    fn maps_every_original_id_of_roled_tracks() {
        let mut g = IdentityGraph::new();
        for id in [1, 2, 3] {
            g.tracks.insert(TrackId(id), Track::new(TrackId(id)));
            g.lineage.insert(TrackId(id), TrackId(id));
        }
        g.merge(TrackId(1), TrackId(2));
        g.assign_role(&[TrackId(1)], Role::named("Target")).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.json");
        assert_eq!(write_identity_map(&g, &path).unwrap(), 2);
        let back: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["1"], "Target");
        assert_eq!(back["2"], "Target");
        assert!(back.get("3").is_none());

        let audit = dir.path().join("audit.json");
        write_audit_log(&g, &audit).unwrap();
        let back: Value = serde_json::from_str(&std::fs::read_to_string(&audit).unwrap()).unwrap();
        assert_eq!(back.as_array().unwrap().len(), 2);
    }
}
