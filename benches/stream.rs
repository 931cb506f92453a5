use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use std::{cell::Cell, thread, time::Duration};
use streamfile::{ReadAt, StreamFile, Whence};

// Number of bytes to append/read per iteration.
const BATCH_SIZE: usize = 64 * 1024;

// Number of batches in a stream before it's recycled.
const BATCHES: usize = 1024;

criterion_main!(benches);
criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_secs(3))
        .measurement_time(Duration::from_secs(15));
    targets = write_bench, read_bench, tail_bench
}

fn write_bench(c: &mut Criterion) {
    let batch = vec![7u8; BATCH_SIZE];

    let mut group = c.benchmark_group("StreamFile");
    group.throughput(Throughput::BytesDecimal(BATCH_SIZE as _));
    group.bench_function("write", |bencher| {
        bencher.iter_batched(
            || StreamFile::new().expect("Should create stream"),
            |stream| {
                // Append bytes into the stream.
                stream.write(&batch).expect("Should write");
                stream.remove().expect("Should remove");
            },
            BatchSize::PerIteration,
        )
    });
    group.finish();
}

fn read_bench(c: &mut Criterion) {
    // Stream that is done writing, so reads never block.
    let stream = StreamFile::new().expect("Should create stream");
    let batch = vec![7u8; BATCH_SIZE];
    for _ in 0..BATCHES {
        stream.write(&batch).expect("Should write");
    }
    stream.done_writing();

    let mut buf = vec![0u8; BATCH_SIZE];
    let next_batch = Cell::new(0);

    let mut group = c.benchmark_group("StreamFile");
    group.throughput(Throughput::BytesDecimal(BATCH_SIZE as _));
    group.bench_function("read_at", |bencher| {
        bencher.iter(|| {
            // Wrap around when the last batch is reached.
            let offset = (next_batch.get() % BATCHES * BATCH_SIZE) as u64;
            next_batch.set(next_batch.get() + 1);

            stream.read_at(&mut buf, offset).expect("Should read");
        })
    });
    group.bench_function("read", |bencher| {
        bencher.iter(|| {
            if stream.read(&mut buf).is_err() {
                stream.seek(0, Whence::Start).expect("Should seek");
            }
        })
    });
    group.finish();

    stream.remove().expect("Should remove");
}

fn tail_bench(c: &mut Criterion) {
    let batch = vec![7u8; BATCH_SIZE];

    let mut group = c.benchmark_group("StreamFile");
    group.throughput(Throughput::BytesDecimal((BATCH_SIZE * BATCHES) as _));
    group.sample_size(10);
    group.bench_function("tail", |bencher| {
        bencher.iter_batched(
            || StreamFile::new().expect("Should create stream"),
            |stream| {
                // Reader follows the writer from another thread.
                thread::scope(|s| {
                    s.spawn(|| {
                        let mut buf = vec![0u8; BATCH_SIZE];
                        while stream.read(&mut buf).is_ok() {}
                    });

                    for _ in 0..BATCHES {
                        stream.write(&batch).expect("Should write");
                    }
                    stream.done_writing();
                });

                stream.remove().expect("Should remove");
            },
            BatchSize::PerIteration,
        )
    });
    group.finish();
}
