use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rarity_core::Frame;

fn bench_chunk_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_decode");

    for size in [512usize, 4096, 64 * 1024] {
        let buf = Frame::Chunk {
            index: 42,
            data: vec![0xAA; size],
        }
        .encode()
        .unwrap();

        group.throughput(Throughput::Bytes(buf.len() as u64));
        group.bench_with_input(BenchmarkId::new("bytes", size), &buf, |b, buf| {
            b.iter(|| Frame::decode(black_box(buf)))
        });
    }

    group.finish();
}

fn bench_chunk_encode(c: &mut Criterion) {
    let frame = Frame::Chunk {
        index: 7,
        data: vec![0xBB; 512],
    };

    let mut group = c.benchmark_group("chunk_encode");
    group.throughput(Throughput::Bytes(frame.encoded_len() as u64));
    group.bench_function("encode_512", |b| b.iter(|| black_box(&frame).encode()));
    group.finish();
}

fn bench_text_roundtrip(c: &mut Criterion) {
    c.bench_function("text_ack_roundtrip", |b| {
        b.iter(|| {
            let buf = Frame::text(black_box("ACK")).encode().unwrap();
            Frame::decode(&buf).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_chunk_decode,
    bench_chunk_encode,
    bench_text_roundtrip
);
criterion_main!(benches);
