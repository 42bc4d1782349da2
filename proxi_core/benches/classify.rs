use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use proxi_core::{
    CalibrationParams, CalibrationRecord, CrosstalkSearch, FilterSettings, Policy, classify,
};
use proxi_traits::Measurement;

// Synthetic readings: ranges sweeping 0..2000 mm with a xorshift-scattered
// signal rate and the occasional bad status.
fn synth_readings(n: usize, seed: u32) -> Vec<Measurement> {
    let mut state = seed.max(1);
    let mut next = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        x
    };
    (0..n)
        .map(|i| Measurement {
            range_mm: (i % 2000) as u16,
            signal_rate: (next() % 80) << 16,
            ambient_rate: 1 << 16,
            status: if next() % 16 == 0 { 4 } else { 0 },
        })
        .collect()
}

fn sample_size(g: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    // BENCH_SAMPLE_SIZE=10 cargo bench -p proxi_core --bench classify
    match std::env::var("BENCH_SAMPLE_SIZE")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
    {
        Some(n) => g.sample_size(n.max(10)),
        None => g.sample_size(50),
    };
}

pub fn bench_policies(c: &mut Criterion) {
    let mut g = c.benchmark_group("classify");
    sample_size(&mut g);
    let readings = synth_readings(4096, 0x5EED);
    let record = CalibrationRecord::default();
    let settings = FilterSettings::default();

    for (name, kind) in [
        ("ratio", proxi_config::FilterPolicy::Ratio),
        ("tiered", proxi_config::FilterPolicy::Tiered),
    ] {
        let policy = Policy::select(kind, &settings, &record);
        g.bench_function(name, |b| {
            b.iter(|| {
                readings
                    .iter()
                    .filter(|m| classify(black_box(*m), &policy))
                    .count()
            })
        });
    }
    g.finish();
}

pub fn bench_crosstalk_sweep(c: &mut Criterion) {
    let mut g = c.benchmark_group("crosstalk_sweep");
    sample_size(&mut g);
    let params = CalibrationParams {
        // Never found, so the whole range is swept.
        found_mm: 0,
        ..CalibrationParams::default()
    };
    g.bench_function("full_range", |b| {
        b.iter_batched(
            || CrosstalkSearch::new(&params),
            |mut search| {
                for c in params.candidates() {
                    let bias = (1500i64 - i64::from(c)).abs() / 4;
                    search.observe(c, (600 - bias.min(600)) as u16);
                }
                black_box(search.best())
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

criterion_group!(benches, bench_policies, bench_crosstalk_sweep);
criterion_main!(benches);
