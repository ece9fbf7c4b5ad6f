use utilities::data_sets::uint16_pyramid;

use volume_stream_core::prelude::*;
use volume_stream_storage::prelude::*;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn select_level_full_volume(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_level_full_volume");
    for num_levels in LEVEL_COUNTS.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(num_levels), num_levels, |b, &num_levels| {
            let pyramid = set_up_pyramid(num_levels);
            let volume = pyramid.volume_bounds();
            b.iter(|| {
                black_box(select_level(&pyramid, 1 << 20, &volume, &volume, SelectionMode::Volume));
            });
        });
    }
    group.finish();
}

fn select_level_cropped_plane(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_level_cropped_plane");
    for num_levels in LEVEL_COUNTS.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(num_levels), num_levels, |b, &num_levels| {
            let pyramid = set_up_pyramid(num_levels);
            let volume = pyramid.volume_bounds();
            let crop = WorldBox::from_bounds([100.0, 900.0, 300.0, 700.0, 0.0, 64.0]);
            b.iter(|| {
                black_box(select_level(
                    &pyramid,
                    512 * 512,
                    &crop,
                    &volume,
                    SelectionMode::Plane(Axis3::Z),
                ));
            });
        });
    }
    group.finish();
}

fn chunks_overlapping_region(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunks_overlapping_region");
    for size in REGION_SIZES.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let aligner = ChunkAligner::new(PointN([16, 64, 64]), PointN([512, 4096, 4096]));
            let region = PixelRegion::new(PointN([3, 17, 29]), PointN([3 + size, 17 + size, 29 + size]));
            b.iter(|| {
                let aligned = aligner.align(&region);
                black_box(aligner.chunks_overlapping(&aligned.aligned).count());
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    select_level_full_volume,
    select_level_cropped_plane,
    chunks_overlapping_region
);
criterion_main!(benches);

const LEVEL_COUNTS: [usize; 3] = [2, 5, 8];
const REGION_SIZES: [i64; 3] = [64, 256, 1024];

fn set_up_pyramid(num_levels: usize) -> Pyramid {
    let shapes: Vec<[u64; 3]> = (0..num_levels)
        .map(|i| {
            let xy = (1024u64 >> i).max(1);
            [(64u64 >> i).max(1), xy, xy]
        })
        .collect();

    uint16_pyramid(&shapes, [16, 128, 128])
}
