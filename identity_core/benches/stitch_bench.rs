use criterion::{black_box, criterion_group, criterion_main, Criterion};
use identity_core::graph::{Lineage, TrackMap};
use identity_core::{AutoStitcher, BBox, IdentityGraph, StitchParams, Track, TrackId};

/// `n` targets walking right, each cut into five fragments with short gaps.
fn fragmented(n: u64) -> IdentityGraph {
    let mut tracks = TrackMap::new();
    let mut lineage = Lineage::new();
    let mut next = 0;
    for target in 0..n {
        let y = target as f64 * 300.0;
        for piece in 0..5u64 {
            let id = TrackId(next);
            next += 1;
            let mut t = Track::new(id);
            let start = piece * 40;
            for f in start..start + 30 {
                let x = f as f64 * 2.0;
                t.push(f, BBox::new(x, y, x + 40.0, y + 80.0));
            }
            tracks.insert(id, t);
            lineage.insert(id, id);
        }
    }
    IdentityGraph::from_parts(tracks, lineage, Default::default())
}

fn bench_stitch(c: &mut Criterion) {
    let mut group = c.benchmark_group("auto_stitch");
    let stitcher = AutoStitcher::new(StitchParams::default(), 30.0);

    for n in [10, 100, 500] {
        let graph = fragmented(n);
        group.bench_function(format!("{n}_targets"), |b| {
            b.iter(|| {
                let mut g = graph.clone();
                black_box(stitcher.run(&mut g));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_stitch);
criterion_main!(benches);
