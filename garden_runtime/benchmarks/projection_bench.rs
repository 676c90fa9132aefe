use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use garden_runtime::{decode_parcels_json, GridProjector, Parcel};

fn dense_parcels(side: i32) -> Arc<[Parcel]> {
    (0..side)
        .flat_map(|y| (0..side).map(move |x| (x, y)))
        .enumerate()
        .map(|(idx, (x, y))| Parcel::at(idx as i64, x, y).with_humidity(f64::from((x * 7 + y * 3) % 100)))
        .collect()
}

// One parcel in every fourth cell, centred on the origin.
fn sparse_parcels(side: i32) -> Arc<[Parcel]> {
    let half = side / 2;
    (0..side)
        .flat_map(|y| (0..side).map(move |x| (x, y)))
        .filter(|(x, y)| (x + y) % 4 == 0)
        .enumerate()
        .map(|(idx, (x, y))| Parcel::at(idx as i64, x - half, y - half))
        .collect()
}

fn parcels_json(side: i32) -> String {
    let records: Vec<String> = (0..side)
        .flat_map(|y| (0..side).map(move |x| (x, y)))
        .enumerate()
        .map(|(idx, (x, y))| {
            format!(
                r#"{{"id":{idx},"xcoordinate":{x},"ycoordinate":{y},"humidityLevel":42.5,"plants":[],"insects":[]}}"#
            )
        })
        .collect();
    format!("[{}]", records.join(","))
}

fn bench_projection(c: &mut Criterion) {
    let projector = GridProjector::default();
    let mut group = c.benchmark_group("grid_projection");

    for side in [16i32, 64, 256] {
        group.throughput(Throughput::Elements((side * side) as u64));

        let dense = dense_parcels(side);
        group.bench_with_input(BenchmarkId::new("dense", side), &dense, |b, parcels| {
            b.iter(|| projector.project(Arc::clone(parcels)));
        });

        let sparse = sparse_parcels(side);
        group.bench_with_input(BenchmarkId::new("sparse", side), &sparse, |b, parcels| {
            b.iter(|| projector.project(Arc::clone(parcels)));
        });
    }

    group.finish();
}

fn bench_ingestion(c: &mut Criterion) {
    let mut group = c.benchmark_group("parcel_ingestion");

    for side in [16i32, 64] {
        let payload = parcels_json(side);
        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_with_input(BenchmarkId::new("decode", side), &payload, |b, payload| {
            b.iter(|| decode_parcels_json(payload));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_projection, bench_ingestion);
criterion_main!(benches);
