//! Benchmarks for temporal filter and ellipse fitting performance

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gaze_estimation::ellipse::fit_ellipse;
use gaze_estimation::filters::{create_filter, TemporalFilter};
use gaze_estimation::frame::Point2;

fn benchmark_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("filters");

    // Simulated noisy gaze measurements at 30 fps
    let measurements: Vec<(f64, f64, f64)> = (0..300)
        .map(|i| {
            let t = i as f64 * 33.0;
            let x = 0.5 + 0.2 * (t / 1000.0).sin() + 0.01 * rand::random::<f64>();
            let y = 0.5 + 0.1 * (t / 1000.0).cos() + 0.01 * rand::random::<f64>();
            (x, y, t)
        })
        .collect();

    for name in ["none", "kalman", "adaptive_kalman"] {
        group.bench_with_input(
            BenchmarkId::new("stream_300", name),
            &measurements,
            |b, measurements| {
                b.iter(|| {
                    let mut filter: Box<dyn TemporalFilter> = create_filter(name).unwrap();
                    for &(x, y, t) in measurements {
                        black_box(filter.apply(black_box(x), black_box(y), t));
                    }
                });
            },
        );
    }

    group.finish();
}

fn benchmark_ellipse_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("ellipse");

    for &n in &[5usize, 8, 16] {
        let points: Vec<Point2> = (0..n)
            .map(|i| {
                let t = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
                Point2::new(
                    100.0 + 5.0 * t.cos() + 0.05 * rand::random::<f64>(),
                    80.0 + 4.5 * t.sin() + 0.05 * rand::random::<f64>(),
                )
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("fit", n), &points, |b, points| {
            b.iter(|| black_box(fit_ellipse(black_box(points))));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_filters, benchmark_ellipse_fit);
criterion_main!(benches);
