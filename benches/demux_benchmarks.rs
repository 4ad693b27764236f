//! Demuxing performance benchmarks
//!
//! Benchmarks for index maintenance, timestamp reconciliation, packet
//! buffering and timestamp search

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use zvd_demux::codec::{CodecId, CodecParameters};
use zvd_demux::format::seek::generic_seek;
use zvd_demux::format::{
    DemuxFlags, IndexEntries, IndexEntry, Packet, PacketQueue, SearchBounds, SeekFlags, Stream,
    StreamInfo, TimestampReconciler,
};
use zvd_demux::util::{Buffer, Rational};

const RECORD_SIZE: i64 = 64;

/// Keyframe index with one entry every `gop` frames
fn build_index(frames: i64, gop: i64) -> IndexEntries {
    let mut index = IndexEntries::new();
    for ts in (0..frames).step_by(gop as usize) {
        let _ = index.add(IndexEntry::keyframe(ts * RECORD_SIZE, ts));
    }
    index
}

fn video_stream() -> Stream {
    let mut codec = CodecParameters::new(CodecId::Mpeg4);
    codec.width = 1280;
    codec.height = 720;
    let info = StreamInfo::new(codec)
        .with_time_base(Rational::new(1, 25))
        .with_frame_rate(Rational::new(25, 1));
    Stream::new(0, info, 0)
}

/// Benchmark in-order and shuffled index insertion
fn bench_index_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_add");

    for &count in &[100i64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("ascending", count), &count, |b, &count| {
            b.iter(|| black_box(build_index(count, 1)));
        });

        group.bench_with_input(BenchmarkId::new("interleaved", count), &count, |b, &count| {
            b.iter(|| {
                let mut index = IndexEntries::new();
                // odd timestamps first, then the even ones land in between
                for ts in (1..count).step_by(2).chain((0..count).step_by(2)) {
                    let _ = index.add(IndexEntry::keyframe(ts * RECORD_SIZE, ts));
                }
                black_box(index)
            });
        });
    }

    group.finish();
}

/// Benchmark index lookups in both directions
fn bench_index_search(c: &mut Criterion) {
    let index = build_index(100_000, 12);
    let mut group = c.benchmark_group("index_search");

    group.bench_function("backward", |b| {
        b.iter(|| index.search(black_box(54_321), SeekFlags::backward()));
    });
    group.bench_function("forward", |b| {
        b.iter(|| index.search(black_box(54_321), SeekFlags::default()));
    });
    group.bench_function("bounds", |b| {
        b.iter(|| SearchBounds::from_index(&index, black_box(54_321), SeekFlags::backward()));
    });

    group.finish();
}

/// Benchmark timestamp fill-in for packets with and without container timing
fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    let packets: i64 = 1_000;
    group.throughput(Throughput::Elements(packets as u64));

    for &(name, timed) in &[("timed", true), ("untimed", false)] {
        group.bench_function(name, |b| {
            let reconciler = TimestampReconciler::new(&DemuxFlags::default());
            b.iter(|| {
                let mut st = video_stream();
                let mut pending = PacketQueue::new();
                for i in 0..packets {
                    let mut pkt = Packet::new(0, Buffer::from_vec(vec![0u8; 32]));
                    if timed || i == 0 {
                        pkt = pkt.with_timestamps(i, i);
                    }
                    reconciler.reconcile(&mut st, &mut pkt, None, &mut pending);
                    black_box(&pkt);
                }
            });
        });
    }

    group.finish();
}

/// Benchmark buffering packets through a queue
fn bench_packet_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_queue");

    for &count in &[64usize, 1024] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let payload = Buffer::from_vec(vec![0u8; 188]);
            b.iter(|| {
                let mut queue = PacketQueue::new();
                for i in 0..count {
                    let pkt = Packet::new(0, payload.clone()).with_timestamps(i as i64, i as i64);
                    let _ = queue.push(pkt);
                }
                while let Ok(pkt) = queue.pop_front() {
                    black_box(pkt);
                }
            });
        });
    }

    group.finish();
}

/// Benchmark timestamp search over a synthetic constant bitrate file
fn bench_generic_seek(c: &mut Criterion) {
    let mut group = c.benchmark_group("generic_seek");

    for &frames in &[1_000i64, 100_000] {
        let file_size = (frames * RECORD_SIZE) as u64;
        group.bench_with_input(BenchmarkId::from_parameter(frames), &frames, |b, &frames| {
            b.iter(|| {
                generic_seek(
                    black_box(frames / 3),
                    SearchBounds::default(),
                    0,
                    Some(file_size),
                    SeekFlags::backward(),
                    |pos, limit| {
                        // keyframe every 10 records
                        let record = (pos + RECORD_SIZE - 1) / RECORD_SIZE;
                        let key = (record + 9) / 10 * 10;
                        let key_pos = key * RECORD_SIZE;
                        if key >= frames || key_pos > limit {
                            Ok(None)
                        } else {
                            Ok(Some((key, key_pos)))
                        }
                    },
                )
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_index_add,
    bench_index_search,
    bench_reconcile,
    bench_packet_queue,
    bench_generic_seek
);
criterion_main!(benches);
