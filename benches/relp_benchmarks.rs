// ABOUTME: Benchmark suite for RELP wire codec performance testing
// ABOUTME: Measures frame encoding, decoding, and offer-set handling across message sizes

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use relp::codec::FrameCodec;
use relp::frame::{Command, Frame, Rsp};
use relp::offers::OfferSet;
use std::time::Duration;

fn sample_msg(len: usize) -> Frame {
    Frame::new(421, Command::Msg, vec![b'x'; len])
}

fn sample_init() -> Frame {
    Frame::new(
        1,
        Command::Init,
        OfferSet::standard(128, &["syslog"]).to_bytes(),
    )
}

fn sample_rsp() -> Frame {
    Frame::rsp(421, &Rsp::ok("OK"))
}

fn decode_one(wire: &[u8]) -> Frame {
    let mut buf = BytesMut::from(wire);
    FrameCodec::new()
        .decode(&mut buf)
        .unwrap()
        .expect("complete frame")
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");
    group.measurement_time(Duration::from_secs(10));

    let msg = sample_msg(160);
    group.bench_function("msg", |b| {
        b.iter(|| FrameCodec::encode_bytes(black_box(&msg)))
    });

    let init = sample_init();
    group.bench_function("init", |b| {
        b.iter(|| FrameCodec::encode_bytes(black_box(&init)))
    });

    let rsp = sample_rsp();
    group.bench_function("rsp", |b| {
        b.iter(|| FrameCodec::encode_bytes(black_box(&rsp)))
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");
    group.measurement_time(Duration::from_secs(10));

    let msg_wire = FrameCodec::encode_bytes(&sample_msg(160));
    group.bench_function("msg", |b| b.iter(|| decode_one(black_box(&msg_wire))));

    let init_wire = FrameCodec::encode_bytes(&sample_init());
    group.bench_function("init", |b| b.iter(|| decode_one(black_box(&init_wire))));

    let rsp_wire = FrameCodec::encode_bytes(&sample_rsp());
    group.bench_function("rsp", |b| b.iter(|| decode_one(black_box(&rsp_wire))));

    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("roundtrip");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("msg", |b| {
        b.iter(|| {
            let wire = FrameCodec::encode_bytes(black_box(&sample_msg(160)));
            decode_one(&wire)
        })
    });

    group.finish();
}

fn bench_message_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_sizes");
    group.measurement_time(Duration::from_secs(10));

    // typical syslog line lengths up to bulk payloads
    for &size in &[64usize, 512, 2048, 8192] {
        let wire = FrameCodec::encode_bytes(&sample_msg(size));
        group.bench_with_input(BenchmarkId::new("decode_msg", size), &wire, |b, wire| {
            b.iter(|| decode_one(black_box(wire)))
        });
    }

    group.finish();
}

fn bench_offers(c: &mut Criterion) {
    let mut group = c.benchmark_group("offers");
    group.measurement_time(Duration::from_secs(10));

    let encoded = OfferSet::standard(128, &["syslog", "eventlog"]).to_bytes();
    group.bench_function("decode", |b| {
        b.iter(|| OfferSet::decode(black_box(&encoded)).unwrap())
    });

    let mine = OfferSet::standard(128, &["syslog", "eventlog"]);
    let theirs = OfferSet::standard(32, &["syslog"]);
    group.bench_function("intersect", |b| {
        b.iter(|| black_box(&mine).intersect(black_box(&theirs)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_roundtrip,
    bench_message_sizes,
    bench_offers
);
criterion_main!(benches);
