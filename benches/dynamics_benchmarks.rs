use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use limb_dynamics::dynamics::{matrix_exponential, JointDynamicsEngine};
use limb_dynamics::limb::presets::{hand_4dof, wrist_2dof, wrist_muscles};
use limb_dynamics::{ModelConfig, Side};
use ndarray::Array2;

const BATCH_SIZES: &[usize] = &[1, 16, 64, 256, 1024];
const DT: f64 = 0.0166667;

fn benchmark_matrix_exponential(c: &mut Criterion) {
    let mut group = c.benchmark_group("matrix_exponential");

    // augmented Van Loan sizes for 1, 2 and 4 DOF
    for &n in &[6usize, 12, 24] {
        let a = Array2::from_shape_fn((n, n), |(i, j)| ((i * n + j) as f64 * 0.7).sin() * 3.0);
        group.bench_with_input(BenchmarkId::from_parameter(n), &a, |b, a| {
            b.iter(|| matrix_exponential(black_box(a.view())))
        });
    }

    group.finish();
}

fn benchmark_joint_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("joint_step");

    for (label, config) in [
        ("exact", ModelConfig::default()),
        ("approximate", ModelConfig::approximate()),
        ("exact_compensated", ModelConfig::default().with_nn_ratio(0.5)),
    ] {
        let engine = JointDynamicsEngine::new(&wrist_muscles(Side::Left), &[0.004, 0.008], &config)
            .expect("wrist engine");

        for &batch in BATCH_SIZES {
            let state = Array2::from_shape_fn((batch, 4), |(r, c)| ((r + c) as f64 * 0.1).sin() * 0.3);
            let activation = Array2::from_shape_fn((batch, 4), |(r, c)| ((r * 3 + c) % 10) as f64 / 10.0);

            group.throughput(Throughput::Elements(batch as u64));
            group.bench_with_input(BenchmarkId::new(label, batch), &batch, |b, _| {
                b.iter(|| engine.forward(black_box(state.view()), black_box(activation.view()), DT))
            });
        }
    }

    group.finish();
}

fn benchmark_limb_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("limb_step");

    let wrist = wrist_2dof(8, Side::Right).expect("wrist preset");
    let hand = hand_4dof(8).expect("hand preset");

    for (label, model) in [("wrist_2dof", &wrist), ("hand_4dof", &hand)] {
        let state = Array2::zeros((1, model.state_width()));
        let raw = Array2::from_elem((1, model.channels()), 0.3);
        group.bench_function(label, |b| {
            b.iter(|| model.forward(black_box(state.view()), black_box(raw.view()), DT))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_matrix_exponential,
    benchmark_joint_step,
    benchmark_limb_step
);
criterion_main!(benches);
