use chart_pilot::core::{
    AxisSample, CoordinateTransform, FallbackDomain, LabelHit, PixelSpan, Point, Rect,
    VerificationHeuristic, parse_axis_label,
};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn axis_samples(count: usize) -> Vec<AxisSample> {
    (0..count)
        .map(|i| {
            let value = 160.0 - i as f64 * 0.5;
            AxisSample::new(value, 50.0 + (160.0 - value) * 35.0 + (i % 3) as f64 * 0.3)
        })
        .collect()
}

fn bench_axis_label_parsing(c: &mut Criterion) {
    let labels: Vec<String> = (0..200)
        .map(|i| format!("${},{:03}.{:02}", 1 + i / 100, i % 1000, i % 100))
        .collect();

    c.bench_function("axis_label_parse_200", |b| {
        b.iter(|| {
            for label in &labels {
                let _ = black_box(parse_axis_label(black_box(label)));
            }
        })
    });
}

fn bench_transform_fit(c: &mut Criterion) {
    let samples = axis_samples(40);
    let span = PixelSpan::new(50.0, 700.0);

    c.bench_function("transform_fit_40_samples", |b| {
        b.iter(|| {
            let transform =
                CoordinateTransform::fit(black_box(&samples), FallbackDomain::default(), span);
            black_box(transform.value_to_pixel(black_box(151.25)))
        })
    });
}

fn bench_proximity_verification(c: &mut Criterion) {
    let heuristic = VerificationHeuristic::new(
        ["0", "0.236", "0.382", "0.5", "0.618", "0.786", "1"]
            .into_iter()
            .map(str::to_owned)
            .collect(),
    );
    let start = Point::new(400.0, 176.0);
    let end = Point::new(1000.0, 624.0);
    let hits: Vec<LabelHit> = (0..300)
        .map(|i| {
            let t = (i % 7) as f64 / 6.0;
            let at = start.lerp(end, t);
            let x = if i % 2 == 0 { at.x } else { at.x + 900.0 };
            LabelHit::new(
                format!("0.{}{} (150.00)", i % 10, i % 7),
                Rect::new(x - 15.0, at.y - 6.0, 30.0, 12.0),
            )
        })
        .collect();

    c.bench_function("proximity_verify_300_labels", |b| {
        b.iter(|| black_box(heuristic.evaluate(start, end, black_box(&hits))))
    });
}

criterion_group!(
    benches,
    bench_axis_label_parsing,
    bench_transform_fit,
    bench_proximity_verification
);
criterion_main!(benches);
