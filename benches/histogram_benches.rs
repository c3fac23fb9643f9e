// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use criterion::{criterion_group, criterion_main, Criterion, SamplingMode};

use atlas_timetag::histogram::Histogram;
use atlas_timetag::types::HistogramType;

/// Builds a strong-spot altimetric histogram with a synthetic signal peak
/// plus a flat noise floor across the rest of the bin array, large enough
/// to exercise `calc_attributes`'s full sliding-window filter pass.
fn setup_histogram() -> Histogram {
    let mut hist = Histogram::new(
        HistogramType::StrongAltimetric,
        50_000,
        0.225,
        0,
        1,
        None,
        0.0,
        0.0,
        0.0,
    )
    .expect("bin size and integration period are positive");

    hist.set_transmit_count(50_000);
    for i in 0..9999i64 {
        hist.set_bin(i, 2);
    }
    for i in 4000..4010i64 {
        hist.set_bin(i, 400);
    }
    hist
}

fn bench_calc_attributes(c: &mut Criterion) {
    let group = &mut c.benchmark_group("histogram");
    group.sampling_mode(SamplingMode::Flat);

    let hist = setup_histogram();

    group.bench_function("calc_attributes", |b| {
        b.iter(|| {
            let mut hist = hist.clone();
            hist.calc_attributes(0.0, 10.0);
        })
    });
}

criterion_group!(benches, bench_calc_attributes);
criterion_main!(benches);
