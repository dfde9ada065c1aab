use auralis_dsp::{extract, StereoBuffer};
use criterion::{criterion_group, criterion_main, Criterion};

fn synth_track(secs: f32, sample_rate: u32) -> StereoBuffer {
    let n = (secs * sample_rate as f32) as usize;
    let left: Vec<f32> = (0..n)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.3 * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
                + 0.1 * (2.0 * std::f32::consts::PI * 3300.0 * t).sin()
        })
        .collect();
    let right: Vec<f32> = (0..n)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.3 * (2.0 * std::f32::consts::PI * 221.0 * t).sin()
        })
        .collect();
    StereoBuffer::new(left, right, sample_rate)
}

fn bench_extract(c: &mut Criterion) {
    let track = synth_track(30.0, 44100);
    c.bench_function("extract_30s", |b| {
        b.iter(|| extract(std::hint::black_box(&track)).unwrap())
    });
}

criterion_group!(benches, bench_extract);
criterion_main!(benches);
