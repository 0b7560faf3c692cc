//! Segmenter throughput benchmarks.
//!
//! Run with: cargo bench -p speakstream-pipeline --bench segmenter_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use speakstream_pipeline::{Segmenter, SegmenterConfig};

const PARAGRAPH: &str = "The quick brown fox jumps over the lazy dog. \
    Streaming synthesis wants its chunks early, so the segmenter cuts at \
    sentence marks when it can, and falls back to commas, semicolons, or \
    plain whitespace once a run of text grows past the cap. Some sentences \
    are short. Others ramble on for quite a while without ever reaching a \
    natural stopping point, which is exactly the case the length cap exists \
    to handle. ";

fn bench_char_tokens(c: &mut Criterion) {
    let mut group = c.benchmark_group("segmenter_char_tokens");

    for repeat in [1usize, 4, 16] {
        let text = PARAGRAPH.repeat(repeat);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(repeat), &text, |b, text| {
            b.iter(|| {
                let mut segmenter = Segmenter::new(SegmenterConfig::default());
                let mut chunks = 0usize;
                let mut buf = [0u8; 4];
                for ch in text.chars() {
                    chunks += segmenter.feed(ch.encode_utf8(&mut buf)).len();
                }
                if segmenter.flush().is_some() {
                    chunks += 1;
                }
                black_box(chunks)
            })
        });
    }

    group.finish();
}

fn bench_word_tokens(c: &mut Criterion) {
    let mut group = c.benchmark_group("segmenter_word_tokens");

    let text = PARAGRAPH.repeat(4);
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("repeat_4", |b| {
        b.iter(|| {
            let mut segmenter = Segmenter::new(SegmenterConfig::default());
            let mut chunks = 0usize;
            for token in text.split_inclusive(' ') {
                chunks += segmenter.feed(token).len();
            }
            if segmenter.flush().is_some() {
                chunks += 1;
            }
            black_box(chunks)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_char_tokens, bench_word_tokens);
criterion_main!(benches);
