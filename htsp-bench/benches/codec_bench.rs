//! HTSP codec benchmarks.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use htsp_protocol::field::{decode_s64, encode_field, encode_s64};
use htsp_protocol::{Decoder, Encoder, Message, Value};

fn create_dvr_entry(title_size: usize) -> Message {
    Message::new()
        .with(Message::METHOD, "dvrEntryAdd")
        .with("id", 12345i64)
        .with("channel", 42i64)
        .with("start", 1_700_000_000i64)
        .with("stop", 1_700_003_600i64)
        .with("title", "x".repeat(title_size))
        .with("state", "scheduled")
}

fn bench_message_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_encode");

    for size in [100, 1000, 10000] {
        let message = create_dvr_entry(size);

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &message, |b, message| {
            b.iter(|| black_box(Encoder::encode_message(message).unwrap()));
        });
    }

    group.finish();
}

fn bench_message_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_decode");

    for size in [100, 1000, 10000] {
        let encoded = Encoder::encode_message(&create_dvr_entry(size)).unwrap();

        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| {
                let mut decoder = Decoder::new();
                decoder.extend(encoded);
                black_box(decoder.decode_message().unwrap())
            });
        });
    }

    group.finish();
}

fn bench_stream_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_decode");

    // Initial sync burst: many small pushes in one read
    for count in [10, 100, 1000] {
        let mut stream = BytesMut::new();
        for id in 0..count {
            let push = Message::new()
                .with(Message::METHOD, "channelAdd")
                .with("channelId", id as i64)
                .with("channelName", format!("Channel {}", id));
            stream.extend_from_slice(&Encoder::encode_message(&push).unwrap());
        }

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &stream, |b, stream| {
            b.iter(|| {
                let mut decoder = Decoder::new();
                decoder.extend(stream);
                let mut n = 0;
                while let Some(message) = decoder.decode_message().unwrap() {
                    black_box(message);
                    n += 1;
                }
                n
            });
        });
    }

    group.finish();
}

fn bench_s64(c: &mut Criterion) {
    let mut group = c.benchmark_group("s64");

    for value in [0i64, 65535, 1 << 40, -1] {
        let encoded = encode_s64(value);
        group.bench_with_input(BenchmarkId::new("encode", value), &value, |b, value| {
            b.iter(|| black_box(encode_s64(*value)));
        });
        group.bench_with_input(BenchmarkId::new("decode", value), &encoded, |b, encoded| {
            b.iter(|| black_box(decode_s64(encoded).unwrap()));
        });
    }

    group.finish();
}

fn bench_field_encode(c: &mut Criterion) {
    let value = Value::from("The quick brown fox");
    c.bench_function("field_encode_str", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(64);
            encode_field(&mut buf, "title", &value).unwrap();
            black_box(buf)
        });
    });
}

criterion_group!(
    benches,
    bench_message_encode,
    bench_message_decode,
    bench_stream_decode,
    bench_s64,
    bench_field_encode,
);

criterion_main!(benches);
