/*!
 * Pipe Benchmark
 * Send/recv round trips and readiness waits across both transports
 */

use conduit::{make_pipe_with, wait, Backend, Connection};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

fn benchmark_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");

    for size in [64usize, 4 * 1024, 16 * 1024].iter() {
        let payload = vec![0xabu8; *size];
        group.throughput(Throughput::Bytes(*size as u64));

        for backend in [Backend::Native, Backend::Emulated] {
            let (a, b) = make_pipe_with(backend, true).unwrap();
            group.bench_with_input(BenchmarkId::new(backend.as_str(), size), size, |bench, _| {
                bench.iter(|| {
                    a.send_bytes(black_box(&payload)).unwrap();
                    black_box(b.recv_bytes().unwrap());
                });
            });
        }
    }

    group.finish();
}

fn benchmark_wait(c: &mut Criterion) {
    let mut group = c.benchmark_group("wait");

    for count in [2usize, 8, 32].iter() {
        let pairs: Vec<(Connection, Connection)> = (0..*count)
            .map(|i| {
                let backend = if i % 2 == 0 { Backend::Native } else { Backend::Emulated };
                make_pipe_with(backend, true).unwrap()
            })
            .collect();
        let readers: Vec<&Connection> = pairs.iter().map(|(r, _)| r).collect();
        let (last_reader, last_writer) = &pairs[*count - 1];

        group.bench_with_input(BenchmarkId::new("one_ready", count), count, |bench, _| {
            bench.iter(|| {
                last_writer.send_bytes(b"tick").unwrap();
                let ready = wait(black_box(&readers), Some(Duration::from_secs(1))).unwrap();
                black_box(ready.len());
                last_reader.recv_bytes().unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_round_trip, benchmark_wait);
criterion_main!(benches);
