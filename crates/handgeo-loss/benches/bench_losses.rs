use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use handgeo_3d::{CircleTarget, PlaneDescriptor, PointBatch};
use handgeo_loss::{OnCircleLoss, PlaneFitLoss};

const POINTS_PER_ITEM: usize = 778;

fn random_batch(rng: &mut StdRng, batch_size: usize) -> PointBatch {
    let points = (0..batch_size * POINTS_PER_ITEM)
        .map(|_| {
            [
                rng.random_range(-0.1..0.1),
                rng.random_range(-0.1..0.1),
                rng.random_range(-0.1..0.1),
            ]
        })
        .collect();
    PointBatch::new(points, POINTS_PER_ITEM).expect("whole items")
}

fn bench_losses(c: &mut Criterion) {
    let mut group = c.benchmark_group("losses");
    let mut rng = StdRng::seed_from_u64(0);

    for batch_size in [1, 32, 128].iter() {
        group.throughput(criterion::Throughput::Elements(
            (*batch_size * POINTS_PER_ITEM) as u64,
        ));

        let predicted = random_batch(&mut rng, *batch_size);
        let reference = random_batch(&mut rng, *batch_size);
        let planes =
            vec![PlaneDescriptor::new([0.0; 3], [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]); *batch_size];
        let targets = vec![CircleTarget::new([0.0; 3], [0.0, 0.0, 1.0], 0.05); *batch_size];

        let plane_loss = PlaneFitLoss::new(PlaneFitLoss::LEGACY_SCALE);
        group.bench_with_input(
            BenchmarkId::new("plane_fit_forward", batch_size),
            &predicted,
            |b, predicted| b.iter(|| black_box(plane_loss.forward(predicted, &planes))),
        );

        let circle_loss = OnCircleLoss::wrapped();
        group.bench_with_input(
            BenchmarkId::new("on_circle_forward", batch_size),
            &predicted,
            |b, predicted| b.iter(|| black_box(circle_loss.forward(predicted, &reference, &targets))),
        );
        group.bench_with_input(
            BenchmarkId::new("on_circle_backward", batch_size),
            &predicted,
            |b, predicted| {
                b.iter(|| black_box(circle_loss.backward(predicted, &reference, &targets)))
            },
        );
    }
}

criterion_group!(benches, bench_losses);
criterion_main!(benches);
