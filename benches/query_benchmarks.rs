//! Query benchmarks: plan + optimize + execute over the built-in
//! datasets.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use quarry::Session;

fn bench_point_filter(c: &mut Criterion) {
    c.bench_function("filter_satellite_by_name", |b| {
        let mut session = Session::default();
        b.iter(|| {
            let result = session
                .execute(black_box("SELECT * FROM $satellites WHERE name = 'Calypso'"))
                .expect("query runs");
            black_box(result.shape())
        });
    });
}

fn bench_group_by(c: &mut Criterion) {
    c.bench_function("group_satellites_by_planet", |b| {
        let mut session = Session::default();
        b.iter(|| {
            let result = session
                .execute(black_box(
                    "SELECT COUNT(*), planetId FROM $satellites GROUP BY planetId",
                ))
                .expect("query runs");
            black_box(result.shape())
        });
    });
}

fn bench_join(c: &mut Criterion) {
    c.bench_function("join_satellites_to_planets", |b| {
        let mut session = Session::default();
        b.iter(|| {
            let result = session
                .execute(black_box(
                    "SELECT * FROM $satellites INNER JOIN $planets \
                     ON $satellites.planetId = $planets.id",
                ))
                .expect("query runs");
            black_box(result.shape())
        });
    });
}

fn bench_unnest(c: &mut Criterion) {
    c.bench_function("unnest_astronaut_missions", |b| {
        let mut session = Session::default();
        b.iter(|| {
            let result = session
                .execute(black_box(
                    "SELECT * FROM $astronauts CROSS JOIN UNNEST(missions) AS m \
                     WHERE m = 'Apollo 11'",
                ))
                .expect("query runs");
            black_box(result.shape())
        });
    });
}

criterion_group!(
    benches,
    bench_point_filter,
    bench_group_by,
    bench_join,
    bench_unnest
);
criterion_main!(benches);
