use flate2::{write::GzEncoder, Compression};
use identity_core::{
    config::HistoryConfig, BBox, IdentityError, IdentityGraph, Role, Session, SessionConfig,
    StitchParams, Track, TrackId,
};
use serde_json::json;
use std::{collections::BTreeSet, io::Write, path::Path};

fn write_gz(path: &Path, lines: &[serde_json::Value]) {
    let mut enc = GzEncoder::new(std::fs::File::create(path).unwrap(), Compression::default());
    for l in lines {
        writeln!(enc, "{l}").unwrap();
    }
    enc.finish().unwrap();
}

fn det(id: u64, x: f64) -> serde_json::Value {
    json!({"track_id": id, "box": {"x1": x, "y1": 0.0, "x2": x + 10.0, "y2": 10.0}})
}

fn graph_of(tracks: &[(u64, std::ops::RangeInclusive<u64>, f64)]) -> IdentityGraph {
    let mut tm = identity_core::graph::TrackMap::new();
    let mut lineage = identity_core::graph::Lineage::new();
    for (id, frames, x) in tracks {
        let mut t = Track::new(TrackId(*id));
        for f in frames.clone() {
            t.push(f, BBox::new(*x, 0.0, x + 10.0, 10.0));
        }
        tm.insert(TrackId(*id), t);
        lineage.insert(TrackId(*id), TrackId(*id));
    }
    IdentityGraph::from_parts(tm, lineage, Default::default())
}

fn assert_lineage_consistent(g: &IdentityGraph) {
    assert!(g.dangling_lineage().is_empty(), "dangling: {:?}", g.dangling_lineage());
    for id in g.tracks().keys() {
        assert_eq!(g.lineage()[id], *id);
    }
}

#[test]
fn load_merge_and_export_identity_map() {
    let dir = tempfile::tempdir().unwrap();
    let stream = dir.path().join("det.jsonl.gz");
    write_gz(
        &stream,
        &[
            json!({"f_idx": 10, "det": [det(5, 0.0)]}),
            json!({"f_idx": 11, "det": [det(5, 1.0)]}),
            json!({"f_idx": 12, "det": [det(5, 2.0)]}),
            json!({"f_idx": 20, "det": [det(7, 10.0)]}),
            json!({"f_idx": 21, "det": [det(7, 11.0)]}),
        ],
    );

    let session = Session::new(SessionConfig::default());
    let summary = session.load_path(&stream, None, |_| {}).unwrap();
    assert_eq!(summary.tracks, 2);

    assert!(session.merge(TrackId(5), TrackId(7)));
    session.assign_role(&[TrackId(5)], Role::named("Target")).unwrap();
    session.read(|g| {
        let t = g.track(TrackId(5)).unwrap();
        assert_eq!(t.frames, vec![10, 11, 12, 20, 21]);
        assert_eq!(t.boxes[3].x1, 10.0);
        assert_eq!(t.merged_from, BTreeSet::from([TrackId(5), TrackId(7)]));
        assert_eq!(g.lineage()[&TrackId(7)], TrackId(5));
        assert_eq!(g.resolve(TrackId(7)), Some(TrackId(5)));
        assert!(!g.contains(TrackId(7)));
    });

    let out = dir.path().join("identity_map.json");
    assert_eq!(session.write_identity_map(&out).unwrap(), 2);
    let map: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
    assert_eq!(map, json!({"5": "Target", "7": "Target"}));
}

#[test]
fn malformed_stream_keeps_previous_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.gz");
    write_gz(&good, &[json!({"f_idx": 0, "det": [det(1, 0.0)]})]);
    let bad = dir.path().join("bad.gz");
    std::fs::write(&bad, b"not gzip at all").unwrap();

    let session = Session::new(SessionConfig::default());
    session.load_path(&good, None, |_| {}).unwrap();
    let before = session.snapshot();
    assert!(matches!(
        session.load_path(&bad, None, |_| {}),
        Err(IdentityError::MalformedStream { .. })
    ));
    assert_eq!(session.snapshot(), before);
}

#[test]
fn split_at_midpoint_then_merge_back() {
    let mut g = graph_of(&[(3, 10..=20, 0.0)]);
    let out = g.split(TrackId(3), 15, true).unwrap();
    assert_eq!(g.track(TrackId(3)).unwrap().frames, (10..15).collect::<Vec<_>>());
    assert_eq!(g.track(out.new_id).unwrap().frames, (15..=20).collect::<Vec<_>>());
    assert_lineage_consistent(&g);

    assert!(g.merge(TrackId(3), out.new_id));
    assert_eq!(g.track(TrackId(3)).unwrap().frames, (10..=20).collect::<Vec<_>>());
    assert_lineage_consistent(&g);
}

#[test]
fn stitch_respects_distance_threshold() {
    let params = StitchParams::default();
    let stitcher = identity_core::AutoStitcher::new(params, 30.0);

    let mut far = graph_of(&[(1, 0..=9, 0.0), (2, 15..=20, 151.0)]);
    assert_eq!(stitcher.run(&mut far), 0);

    let mut near = graph_of(&[(1, 0..=9, 0.0), (2, 15..=20, 149.0)]);
    assert_eq!(stitcher.run(&mut near), 1);
    assert_lineage_consistent(&near);
}

#[test]
fn lineage_stays_consistent_over_merge_sequences() {
    let mut g = graph_of(&[
        (1, 0..=4, 0.0),
        (2, 10..=14, 0.0),
        (3, 20..=24, 0.0),
        (4, 30..=34, 0.0),
        (5, 40..=44, 0.0),
    ]);
    for (m, s) in [(2, 3), (1, 2), (5, 4), (1, 5), (1, 1), (9, 1)] {
        g.merge(TrackId(m), TrackId(s));
        assert_lineage_consistent(&g);
    }
    assert_eq!(g.len(), 1);
    for orig in 1..=5 {
        assert_eq!(g.resolve(TrackId(orig)), Some(TrackId(1)));
    }
    assert_eq!(g.track(TrackId(1)).unwrap().len(), 25);
}

#[test]
fn merge_order_does_not_change_detections() {
    let mut a = graph_of(&[(1, 0..=4, 0.0), (2, 3..=8, 5.0)]);
    let mut b = a.clone();
    a.merge(TrackId(1), TrackId(2));
    b.merge(TrackId(2), TrackId(1));
    let da: Vec<_> = a.track(TrackId(1)).unwrap().frames.clone();
    let db: Vec<_> = b.track(TrackId(2)).unwrap().frames.clone();
    assert_eq!(da, db);
    assert!(da.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn merging_slaves_in_either_order_gives_same_state() {
    let mut tracks = identity_core::graph::TrackMap::new();
    let mut lineage = identity_core::graph::Lineage::new();
    for (id, frames) in [(1u64, vec![0u64, 5, 9]), (2, vec![3, 7]), (3, vec![1, 8])] {
        let mut t = Track::new(TrackId(id));
        for f in frames {
            t.push(f, BBox::new(id as f64, f as f64, id as f64 + 10.0, f as f64 + 10.0));
        }
        tracks.insert(TrackId(id), t);
        lineage.insert(TrackId(id), TrackId(id));
    }
    let base = IdentityGraph::from_parts(tracks, lineage, Default::default());

    let mut b_then_c = base.clone();
    assert!(b_then_c.merge(TrackId(1), TrackId(2)));
    assert!(b_then_c.merge(TrackId(1), TrackId(3)));

    let mut c_then_b = base;
    assert!(c_then_b.merge(TrackId(1), TrackId(3)));
    assert!(c_then_b.merge(TrackId(1), TrackId(2)));

    assert_eq!(b_then_c.state(), c_then_b.state());
    let t = b_then_c.track(TrackId(1)).unwrap();
    assert_eq!(t.frames, vec![0, 1, 3, 5, 7, 8, 9]);
    assert_eq!(t.merged_from, BTreeSet::from([TrackId(1), TrackId(2), TrackId(3)]));
    assert_eq!(b_then_c.lineage()[&TrackId(2)], TrackId(1));
    assert_eq!(b_then_c.lineage()[&TrackId(3)], TrackId(1));
}

#[test]
fn session_history_is_bounded() {
    let config = SessionConfig {
        history: HistoryConfig {
            max_history: 3,
            ram_buffer: 2,
        },
        ..SessionConfig::default()
    };
    let tracks: Vec<(u64, std::ops::RangeInclusive<u64>, f64)> =
        (0..6).map(|i| (i, i * 10..=i * 10 + 4, 0.0)).collect();
    let session = Session::with_graph(graph_of(&tracks), config);
    for i in 1..6 {
        assert!(session.merge(TrackId(0), TrackId(i)));
    }
    let stats = session.history_stats();
    assert_eq!(stats.undo, 3);
    assert_eq!(stats.resident, 1);
    assert_eq!(stats.spilled, 2);

    let mut undone = 0;
    while session.undo().unwrap() {
        undone += 1;
    }
    assert_eq!(undone, 3);
    // three merges reverted, two remain
    assert_eq!(session.read(|g| g.len()), 4);
}

#[test]
fn autosave_round_trip_through_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("autosave.json");
    let session = Session::with_graph(
        graph_of(&[(1, 0..=4, 0.0), (2, 10..=14, 0.0)]),
        SessionConfig::default(),
    );
    session.merge(TrackId(1), TrackId(2));
    session.autosave(&path).unwrap();

    let restored = Session::new(SessionConfig::default());
    assert_eq!(restored.restore_autosave(&path).unwrap(), 1);
    assert_eq!(restored.snapshot(), session.snapshot());
    assert!(!restored.can_undo());
}
