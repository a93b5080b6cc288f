//! Stream aggregation benchmark suite.
//!
//! Benchmarks folding a token stream into one response at different scales:
//! - Token counts: 100, 1000, 10000
//! - Chunk sizes: 64 B, 1 KiB, 16 KiB
//!
//! Run with: cargo bench --bench aggregator
//! Results saved to: target/criterion/

use std::convert::Infallible;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures_util::stream;
use grok_bridge::{RequestId, StreamAggregator};
use tokio::runtime::Runtime;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const TOKEN_COUNTS: &[usize] = &[100, 1_000, 10_000];
const CHUNK_SIZES: &[usize] = &[64, 1_024, 16_384];

// ============================================================================
// Fixtures
// ============================================================================

/// Builds a line-delimited body of `count` token records and a trailing
/// metadata record.
fn token_body(count: usize) -> Vec<u8> {
    let mut body = String::with_capacity(count * 48);
    for i in 0..count {
        body.push_str(&format!(
            "{{\"result\":{{\"response\":{{\"token\":\"tok{i} \"}}}}}}\n"
        ));
    }
    body.push_str("{\"result\":{\"title\":{\"newTitle\":\"Bench\"}}}\n");
    body.into_bytes()
}

fn split_chunks(body: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    body.chunks(chunk_size).map(<[u8]>::to_vec).collect()
}

// ============================================================================
// Benchmark: Token Streams
// ============================================================================

fn bench_token_stream(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let mut group = c.benchmark_group("token_stream");

    for &count in TOKEN_COUNTS {
        let body = token_body(count);
        let chunks = split_chunks(&body, 1_024);
        group.throughput(Throughput::Bytes(body.len() as u64));

        group.bench_with_input(BenchmarkId::new("tokens", count), &chunks, |b, chunks| {
            b.to_async(&rt).iter(|| async {
                let source = stream::iter(chunks.iter().cloned().map(Ok::<_, Infallible>));
                StreamAggregator::new()
                    .consume(RequestId::generate(), source)
                    .await
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Chunk Sizes
// ============================================================================

fn bench_chunk_size(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let body = token_body(1_000);

    let mut group = c.benchmark_group("chunk_size");
    group.throughput(Throughput::Bytes(body.len() as u64));

    for &size in CHUNK_SIZES {
        let chunks = split_chunks(&body, size);

        group.bench_with_input(BenchmarkId::new("bytes", size), &chunks, |b, chunks| {
            b.to_async(&rt).iter(|| async {
                let source = stream::iter(chunks.iter().cloned().map(Ok::<_, Infallible>));
                StreamAggregator::new()
                    .consume(RequestId::generate(), source)
                    .await
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_token_stream, bench_chunk_size);
criterion_main!(benches);
