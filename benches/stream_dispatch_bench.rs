// SPDX-License-Identifier: MIT OR Apache-2.0

//! Benchmarks for stream dispatch and pattern matching
//!
//! Run with: cargo bench --bench stream_dispatch_bench
//!
//! Benchmark groups:
//! - dispatch: sync vs async streams feeding one counting processor
//! - pattern: every(e1 -> e2) over alternating streams

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use wisdom_rust::core::event::Event;
use wisdom_rust::core::{
    every, sequence, Pattern, Processor, StreamConfig, WisdomApp, WisdomConfig, WisdomResult,
};

#[derive(Debug, Default)]
struct Counter(AtomicUsize);

impl Processor for Counter {
    fn process(&self, _event: Event) -> WisdomResult<()> {
        self.0.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn copy(self: Arc<Self>) -> Arc<dyn Processor> {
        self
    }
}

fn generate_events(count: usize) -> Vec<Event> {
    (0..count)
        .map(|i| {
            Event::new(i as i64)
                .attribute("symbol", if i % 2 == 0 { "IBM" } else { "WSO2" })
                .attribute("price", 50.0 + (i % 100) as f64)
                .attribute("volume", i as i64)
        })
        .collect()
}

fn dispatch_app(is_async: bool) -> (WisdomApp, Arc<Counter>) {
    let app = WisdomApp::new(WisdomConfig::new("DispatchBench")).unwrap();
    app.define_stream_with(
        "StockStream",
        StreamConfig::new().with_async(is_async).with_buffer_size(4096),
    )
    .unwrap();
    let counter = Arc::new(Counter::default());
    app.add_processor("StockStream", counter.clone()).unwrap();
    app.start().unwrap();
    (app, counter)
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    for size in [1_000, 10_000] {
        let events = generate_events(size);
        group.throughput(Throughput::Elements(size as u64));

        for is_async in [false, true] {
            let (app, counter) = dispatch_app(is_async);
            let mode = if is_async { "async" } else { "sync" };
            group.bench_with_input(BenchmarkId::new(mode, size), &events, |b, events| {
                b.iter(|| {
                    let target = counter.0.load(Ordering::Relaxed) + events.len();
                    for event in events {
                        app.send("StockStream", black_box(event.clone())).unwrap();
                    }
                    while counter.0.load(Ordering::Relaxed) < target {
                        thread::yield_now();
                    }
                })
            });
            app.shutdown();
        }
    }

    group.finish();
}

fn bench_pattern(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern");

    for size in [1_000, 10_000] {
        let events = generate_events(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("every_sequence", size), &events, |b, events| {
            b.iter(|| {
                let app = WisdomApp::new(WisdomConfig::new("PatternBench")).unwrap();
                app.define_stream("StockStream1").unwrap();
                app.define_stream("StockStream2").unwrap();
                let counter = Arc::new(Counter::default());
                let e1 = Pattern::new("e1", "StockStream1")
                    .filter(|e| e.get_f64("price") > Some(60.0));
                let e2 = Pattern::new("e2", "StockStream2")
                    .filter(|e| e.get_i64("volume").is_some_and(|v| v % 3 == 0));
                app.define_query("bench")
                    .from_pattern(every(sequence(e1, e2)))
                    .select(["e1.price", "e2.volume"])
                    .to_processor(counter.clone())
                    .unwrap();
                app.start().unwrap();

                for (i, event) in events.iter().enumerate() {
                    let stream = if i % 2 == 0 { "StockStream1" } else { "StockStream2" };
                    app.send(stream, black_box(event.clone())).unwrap();
                }
                app.shutdown();
                counter.0.load(Ordering::Relaxed)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_pattern);
criterion_main!(benches);
