use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::DVec2;

use hexmark::data::{LocationRecord, LocationRegistry};
use hexmark::markers::icon::MarkerTypeMode;
use hexmark::markers::overlay::{rebuild, IconSizes};
use hexmark::markers::store::MarkerStore;
use hexmark::markers::hit;

/// A registry shaped like a real map: a few hundred hex cells on a
/// pixel grid.
fn registry(n: i64) -> LocationRegistry {
    let mut records = Vec::new();
    for q in 0..n {
        for r in 0..n {
            records.push(LocationRecord {
                pixel_coords: [100.0 + q as f64 * 64.0, 100.0 + r as f64 * 56.0],
                hex_coords: [q, r],
            });
        }
    }
    LocationRegistry::from_records(records)
}

fn bench_rebuild(c: &mut Criterion) {
    let reg = registry(16); // 256 locations
    let mut store = MarkerStore::new();
    for (i, loc) in reg.iter().enumerate() {
        if i % 2 == 0 {
            store.toggle(&loc.key, "#ff0000");
        }
    }
    let sizes = IconSizes {
        circle: 10.0,
        hex: 36.0,
    };

    c.bench_function("overlay_rebuild_both", |b| {
        b.iter(|| {
            rebuild(
                black_box(&reg),
                black_box(&store),
                MarkerTypeMode::Both,
                sizes,
                black_box(2.0),
            )
        })
    });
}

fn bench_hit_test(c: &mut Criterion) {
    let reg = registry(16);

    c.bench_function("hit_locate", |b| {
        b.iter(|| hit::locate(black_box(DVec2::new(612.0, -380.0)), black_box(&reg)))
    });

    c.bench_function("hit_locate_miss", |b| {
        b.iter(|| hit::locate(black_box(DVec2::new(-5000.0, 5000.0)), black_box(&reg)))
    });
}

criterion_group!(benches, bench_rebuild, bench_hit_test);
criterion_main!(benches);
