//! Criterion benchmarks for the MeshProxy serial framer and decoder.
//!
//! The host polls stats as fast as every 10 ms, so framing a burst of
//! replies interleaved with firmware text must stay far below that.
//!
//! Run with:
//! ```bash
//! cargo bench --package meshproxy-core --bench framer_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meshproxy_core::protocol::{decode_frame, encode_frame, FrameCodec};

// ── Stream fixtures ───────────────────────────────────────────────────────────

fn stats_frame() -> Vec<u8> {
    encode_frame(0x82, &[0u8; 24]).expect("encode must succeed for benchmark setup")
}

fn rx_packet_frame() -> Vec<u8> {
    let mut payload = vec![0x01, 0x92, 0xFF, 0xF9, 56];
    payload.extend(std::iter::repeat(0xAB).take(56));
    encode_frame(0x83, &payload).expect("encode must succeed for benchmark setup")
}

fn clean_stream(frames: usize) -> Vec<u8> {
    let mut stream = Vec::new();
    for i in 0..frames {
        if i % 2 == 0 {
            stream.extend(stats_frame());
        } else {
            stream.extend(rx_packet_frame());
        }
    }
    stream
}

fn noisy_stream(frames: usize) -> Vec<u8> {
    let mut stream = Vec::new();
    for _ in 0..frames {
        stream.extend_from_slice(b"RX: MeshCore 120 TX: Meshtastic 118\r\n");
        stream.extend(stats_frame());
    }
    stream
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_feed(c: &mut Criterion) {
    let streams = [
        ("clean_100", clean_stream(100)),
        ("noisy_100", noisy_stream(100)),
    ];

    let mut group = c.benchmark_group("frame_codec_feed");
    for (name, stream) in &streams {
        group.bench_with_input(BenchmarkId::new("whole", name), stream, |b, stream| {
            b.iter(|| {
                let mut codec = FrameCodec::new();
                codec.feed(black_box(stream))
            })
        });
        group.bench_with_input(BenchmarkId::new("chunked_64", name), stream, |b, stream| {
            b.iter(|| {
                let mut codec = FrameCodec::new();
                let mut count = 0;
                for chunk in stream.chunks(64) {
                    count += codec.feed(black_box(chunk)).frames.len();
                }
                count
            })
        });
    }
    group.finish();
}

fn bench_feed_and_decode(c: &mut Criterion) {
    let stream = clean_stream(100);
    c.bench_function("feed_and_decode_100", |b| {
        b.iter(|| {
            let mut codec = FrameCodec::new();
            codec
                .feed(black_box(&stream))
                .frames
                .iter()
                .filter_map(|f| decode_frame(f).ok())
                .count()
        })
    });
}

criterion_group!(benches, bench_feed, bench_feed_and_decode);
criterion_main!(benches);
