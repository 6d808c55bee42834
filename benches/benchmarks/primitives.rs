use std::hint::black_box;

use criterion::{criterion_group, Criterion};

use cadence::{euclidean, TimeBase, TimePrimitives, TransportSnapshot};

// ---------------------------------------------------------------------------------------------

fn primitives_at(pulse: u64) -> TimePrimitives {
    TimePrimitives::new(TransportSnapshot::new(pulse, TimeBase::default()), 0x1234)
}

// ---------------------------------------------------------------------------------------------

pub fn gates(c: &mut Criterion) {
    let mut group = c.benchmark_group("Primitives");
    group.bench_function("Gates", |b| {
        b.iter(|| {
            for pulse in 0..96 * 4 {
                let p = primitives_at(pulse);
                black_box(p.beat(0.5));
                black_box(p.rhythm(0.25, 5, 16, 2));
                black_box(p.binrhythm(0.25, 0b1001_0010, 8));
                black_box(p.oncount(&[1.0, 2.5, 4.0], 4.0));
                black_box(p.flip(2.0, 30.0));
            }
        })
    });
    group.bench_function("Euclidean", |b| b.iter(|| black_box(euclidean(13, 64, 3))));
    group.finish();
}

pub fn oscillators(c: &mut Criterion) {
    let mut group = c.benchmark_group("Primitives");
    group.bench_function("Oscillators", |b| {
        b.iter(|| {
            for pulse in 0..96 * 4 {
                let p = primitives_at(pulse);
                black_box(p.usine(4.0) + p.utriangle(2.0) + p.usaw(1.0) + p.usquare(1.0, 0.25));
            }
        })
    });
    group.finish();
}

// ---------------------------------------------------------------------------------------------

criterion_group! {
    name = primitives;
    config = Criterion::default();
    targets = gates, oscillators
}
