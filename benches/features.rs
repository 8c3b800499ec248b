//! Micro-benchmarks for the feature post-processing stages and the 16 kHz
//! audio front-end.
//!
//! Run with: `cargo bench --bench features`

use candle_core::{DType, Device, Tensor};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use hubert_frontend::audio::{preprocess, AudioBuffer, AudioInput, WaveformNormalizer};
use hubert_frontend::features::{concat_channels, TemporalResampler, TopKGate};
use std::f32::consts::PI;
use std::hint::black_box;

/// Frames per second at the 20 ms HuBERT hop
const FRAME_RATE: usize = 50;

fn sine_wave(duration_secs: f32, sample_rate: u32) -> Vec<f32> {
    let n = (duration_secs * sample_rate as f32) as usize;
    (0..n)
        .map(|i| (2.0 * PI * 440.0 * i as f32 / sample_rate as f32).sin())
        .collect()
}

fn features(channels: usize, duration_secs: usize) -> Tensor {
    Tensor::rand(0f32, 1.0, (1, duration_secs * FRAME_RATE, channels), &Device::Cpu).unwrap()
}

fn bench_top_k_gate(c: &mut Criterion) {
    let mut group = c.benchmark_group("top_k_gate");

    for k in [1usize, 10, 32] {
        let gate = TopKGate::new(k).unwrap();
        for duration in [1usize, 10] {
            let xs = features(256, duration);
            group.bench_with_input(
                BenchmarkId::from_parameter(format!("k{k}_{duration}s")),
                &xs,
                |b, xs| {
                    b.iter(|| gate.forward(black_box(xs), 2).unwrap());
                },
            );
        }
    }
    group.finish();
}

fn bench_temporal_resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("temporal_resample");

    for factor in [2usize, 4] {
        let resampler = TemporalResampler::new(factor).unwrap();
        for duration in [1usize, 10] {
            let xs = features(1024, duration).transpose(1, 2).unwrap().contiguous().unwrap();
            group.bench_with_input(
                BenchmarkId::from_parameter(format!("d{factor}_{duration}s")),
                &xs,
                |b, xs| {
                    b.iter(|| resampler.forward(black_box(xs)).unwrap());
                },
            );
        }
    }
    group.finish();
}

fn bench_concat_channels(c: &mut Criterion) {
    let mut group = c.benchmark_group("concat_channels");

    for duration in [1usize, 10] {
        let frames = duration * FRAME_RATE;
        let members = vec![
            Tensor::zeros((1, 1024, frames), DType::F32, &Device::Cpu).unwrap(),
            Tensor::ones((1, 1024, frames), DType::F32, &Device::Cpu).unwrap(),
        ];
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("2x1024_{duration}s")),
            &members,
            |b, members| {
                b.iter(|| concat_channels(black_box(members)).unwrap());
            },
        );
    }
    group.finish();
}

fn bench_preprocess(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocess");
    let normalizer = WaveformNormalizer::default();

    for rate in [16000u32, 44100] {
        for duration in [1.0f32, 10.0] {
            let audio = AudioBuffer::new(sine_wave(duration, rate), rate);
            group.bench_with_input(
                BenchmarkId::from_parameter(format!("{rate}hz_{duration}s")),
                &audio,
                |b, audio| {
                    b.iter(|| {
                        let audio = preprocess(AudioInput::Buffer(black_box(audio))).unwrap();
                        normalizer.input_values(&audio, &Device::Cpu).unwrap()
                    });
                },
            );
        }
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_top_k_gate,
    bench_temporal_resample,
    bench_concat_channels,
    bench_preprocess
);
criterion_main!(benches);
