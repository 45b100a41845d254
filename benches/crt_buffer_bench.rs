// SPDX-License-Identifier: MIT OR Apache-2.0
//! Benchmarks for inheritance planning and CRT side-buffer encoding.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use sp_winapi::{CONSOLE_DEVICE, CrtHandleBuffer, InheritancePlan};

fn handles(n: usize) -> Vec<usize> {
    (1..=n).map(|i| i * 4).collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("crt_buffer_encode");

    for size in [1, 3, 64, 1024] {
        let hs = handles(size);
        let flags = vec![CONSOLE_DEVICE; size];
        group.bench_with_input(BenchmarkId::from_parameter(size), &(flags, hs), |b, (f, h)| {
            b.iter(|| CrtHandleBuffer::encode(black_box(f), black_box(h)).unwrap());
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("crt_buffer_decode");

    for size in [3, 1024] {
        let buf = CrtHandleBuffer::encode(&vec![CONSOLE_DEVICE; size], &handles(size)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &buf, |b, buf| {
            b.iter(|| CrtHandleBuffer::decode(black_box(buf.as_bytes())).unwrap());
        });
    }

    group.finish();
}

fn bench_plan_from_streams(c: &mut Criterion) {
    c.bench_function("plan_from_aliased_streams", |b| {
        b.iter(|| {
            let slots = black_box([None, Some((8, true)), Some((8, true))]);
            let plan = InheritancePlan::from_streams(slots).unwrap();
            plan.crt_buffer().unwrap()
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_plan_from_streams);
criterion_main!(benches);
