//! Equalizer stage throughput.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lib_dsp::{ClockBlock, ClockTracker, Dfe, DfeMode, DfeSettings, Fir, Iir, PrbsGenerator};
use lib_types::units::Seconds;

const SAMPLES_PER_UI: usize = 16;

fn stimulus(num_bits: usize) -> Vec<f64> {
    let mut prbs = PrbsGenerator::new(15).unwrap();
    prbs.generate_nrz(num_bits, SAMPLES_PER_UI, Seconds::from_ps(2.0)).samples
}

fn bench_equalizers(c: &mut Criterion) {
    let mut group = c.benchmark_group("equalizers");

    for num_bits in [1_000usize, 10_000].iter() {
        let wave = stimulus(*num_bits);

        group.bench_with_input(BenchmarkId::new("ffe", num_bits), &wave, |b, w| {
            let mut fir = Fir::new(vec![-0.1, 0.75, -0.15], SAMPLES_PER_UI).unwrap();
            b.iter(|| {
                let mut buf = w.clone();
                fir.apply(black_box(&mut buf));
                buf
            });
        });

        group.bench_with_input(BenchmarkId::new("ctle", num_bits), &wave, |b, w| {
            let mut iir = Iir::new(&[1.2, -0.9, 0.1], &[1.0, -0.6, 0.08]).unwrap();
            b.iter(|| {
                let mut buf = w.clone();
                iir.apply(black_box(&mut buf));
                buf
            });
        });

        group.bench_with_input(BenchmarkId::new("dfe_adaptive", num_bits), &wave, |b, w| {
            b.iter(|| {
                let mut dfe = Dfe::new(DfeSettings {
                    mode: DfeMode::Adaptive,
                    taps: vec![0.0; 8],
                    tap_min: vec![-0.5; 8],
                    tap_max: vec![0.5; 8],
                    vout: 1.0,
                    step_size: 0.01,
                    samples_per_ui: SAMPLES_PER_UI,
                })
                .unwrap();
                let mut clock = ClockTracker::new(
                    Seconds::from_ps(2.0 * SAMPLES_PER_UI as f64),
                    Seconds::from_ps(2.0),
                    0.5,
                    16,
                )
                .unwrap();

                let mut buf = w.clone();
                let mut marks = vec![0.0; buf.len()];
                let locked_from = clock.mark(&mut marks);
                dfe.process(
                    black_box(&mut buf),
                    &ClockBlock {
                        edges: &marks,
                        locked_from,
                    },
                );
                buf
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_equalizers);
criterion_main!(benches);
