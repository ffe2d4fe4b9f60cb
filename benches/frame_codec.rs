use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use livetrans::audio::AudioFrame;
use livetrans::audio::codec::{Linear16Frames, decode_linear16, to_linear16};
use std::hint::black_box;

const SAMPLE_RATE: u32 = 48000;

/// One second of a 440Hz tone, interleaved over `channels`.
fn tone_frame(channels: u16) -> AudioFrame {
    let samples = SAMPLE_RATE as usize;
    let mut data = Vec::with_capacity(samples * channels as usize);
    for i in 0..samples {
        let t = i as f32 / SAMPLE_RATE as f32;
        let value = (t * 440.0 * std::f32::consts::TAU).sin() * 0.5;
        for _ in 0..channels {
            data.push(value);
        }
    }
    AudioFrame::new(SAMPLE_RATE, channels, data)
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_linear16");
    for channels in [1u16, 2] {
        let frame = tone_frame(channels);
        group.throughput(Throughput::Elements(frame.data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(channels), &frame, |b, frame| {
            b.iter(|| to_linear16(black_box(frame)))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let pcm = to_linear16(&tone_frame(1));
    let mut group = c.benchmark_group("decode_linear16");
    group.throughput(Throughput::Bytes(pcm.len() as u64));
    group.bench_function("1s_mono", |b| b.iter(|| decode_linear16(black_box(&pcm))));
    group.finish();
}

fn bench_reframe(c: &mut Criterion) {
    let pcm = to_linear16(&tone_frame(1));
    let mut group = c.benchmark_group("reframe_linear16");
    for frame_ms in [10usize, 20] {
        let frame_samples = SAMPLE_RATE as usize * frame_ms / 1000;
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}ms", frame_ms)),
            &frame_samples,
            |b, &frame_samples| {
                b.iter(|| {
                    Linear16Frames::new(black_box(&pcm), frame_samples, SAMPLE_RATE).count()
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_reframe);
criterion_main!(benches);
