//! Benchmarks for the length-limited Huffman codec.

use criterion::{Criterion, criterion_group, criterion_main};
use oxione_codec::HuffmanCodec;
use std::hint::black_box;

fn quality_corpus(len: usize) -> Vec<u8> {
    // Phred-like quality bytes: a narrow, skewed distribution.
    let mut out = Vec::with_capacity(len);
    let mut x: u32 = 0x2545_f491;
    for _ in 0..len {
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        out.push(b'!' + (x % 40) as u8);
    }
    out
}

fn bench_huffman(c: &mut Criterion) {
    let corpus = quality_corpus(1 << 20);
    let mut vc = HuffmanCodec::new();
    vc.add_samples(&corpus[..100_000]).unwrap();
    vc.build_code(true).unwrap();

    let mut encoded = Vec::new();
    let nbits = vc.encode(&corpus, &mut encoded).unwrap();

    c.bench_function("huffman_encode_1mb", |b| {
        let mut out = Vec::new();
        b.iter(|| {
            vc.encode(black_box(&corpus), &mut out).unwrap();
        })
    });

    c.bench_function("huffman_decode_1mb", |b| {
        let mut out = Vec::new();
        b.iter(|| {
            out.clear();
            vc.decode(black_box(&encoded), nbits, &mut out).unwrap();
        })
    });

    c.bench_function("huffman_build_code", |b| {
        b.iter(|| {
            let mut fresh = HuffmanCodec::new();
            fresh.add_samples(&corpus[..100_000]).unwrap();
            fresh.build_code(true).unwrap();
        })
    });
}

criterion_group!(benches, bench_huffman);
criterion_main!(benches);
