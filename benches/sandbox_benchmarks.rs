//! Benchmarks for the JavaScript sandbox.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use quickjs_sandbox_rs::prelude::*;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn bench_config() -> RuntimeConfig {
    RuntimeConfig::builder()
        .max_memory(64 * 1024 * 1024)
        .node_module(
            "custom-module",
            FileTree::dir().with("index.js", "export default 'hi'"),
        )
        .build()
}

/// Benchmark runtime creation (engine bootstrap plus tree merge).
fn bench_cold_start(c: &mut Criterion) {
    let mut group = c.benchmark_group("cold_start");
    group.sample_size(20);

    group.bench_function("runtime_creation", |b| {
        b.iter(|| {
            let sandbox = JsSandbox::new(bench_config()).unwrap();
            black_box(sandbox)
        });
    });

    group.bench_function("runtime_creation_with_test_utils", |b| {
        b.iter(|| {
            let config = RuntimeConfig::builder().enable_test_utils(true).build();
            black_box(JsSandbox::new(config).unwrap())
        });
    });

    group.finish();
}

/// Benchmark evaluations against a warm runtime.
fn bench_execution(c: &mut Criterion) {
    let sandbox = JsSandbox::new(bench_config()).unwrap();
    let options = EvalOptions::from_millis(30_000);

    let mut group = c.benchmark_group("execution");

    group.bench_function("simple_export", |b| {
        b.iter(|| black_box(sandbox.evaluate("export default 1 + 1", options).unwrap()));
    });

    group.bench_function("loop_1000", |b| {
        b.iter(|| {
            let result = sandbox
                .evaluate(
                    "let n = 0\nfor (let i = 0; i < 1000; i++) n += i\nexport default n",
                    options,
                )
                .unwrap();
            black_box(result)
        });
    });

    group.bench_function("import_custom_module", |b| {
        b.iter(|| {
            let result = sandbox
                .evaluate("import m from 'custom-module'\nexport default m", options)
                .unwrap();
            black_box(result)
        });
    });

    group.bench_function("import_builtin_shims", |b| {
        b.iter(|| {
            let result = sandbox
                .evaluate(
                    "import path from 'path'\nimport assert from 'assert'\nassert.ok(path.sep)\nexport default path.join('a', 'b')",
                    options,
                )
                .unwrap();
            black_box(result)
        });
    });

    group.finish();
}

/// Benchmark filesystem bridge round trips.
fn bench_filesystem(c: &mut Criterion) {
    let fs = Arc::new(MemoryFs::new().with_file("/data.txt", "x".repeat(4096)).unwrap());
    let sandbox = JsSandbox::new(RuntimeConfig::builder().filesystem(fs).build()).unwrap();
    let options = EvalOptions::from_millis(30_000);

    let mut group = c.benchmark_group("filesystem");

    group.bench_function("read_sync", |b| {
        b.iter(|| {
            let result = sandbox
                .evaluate(
                    "import { readFileSync } from 'fs'\nexport default readFileSync('/data.txt').length",
                    options,
                )
                .unwrap();
            black_box(result)
        });
    });

    group.bench_function("read_promise", |b| {
        b.iter(|| {
            let result = sandbox
                .evaluate(
                    "import { readFile } from 'fs/promises'\nexport default (await readFile('/data.txt')).length",
                    options,
                )
                .unwrap();
            black_box(result)
        });
    });

    group.finish();
}

/// Benchmark independent runtimes evaluating in parallel.
fn bench_concurrent_execution(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("concurrent");
    group.sample_size(10);

    for concurrency in [1, 2, 4, 8].iter() {
        let sandboxes: Vec<JsSandbox> = (0..*concurrency)
            .map(|_| JsSandbox::new(bench_config()).unwrap())
            .collect();

        group.throughput(Throughput::Elements(*concurrency as u64));
        group.bench_with_input(
            BenchmarkId::new("evaluations", concurrency),
            concurrency,
            |b, _| {
                b.iter(|| {
                    rt.block_on(async {
                        let mut handles = Vec::new();
                        for sandbox in &sandboxes {
                            let sandbox = sandbox.clone();
                            handles.push(tokio::spawn(async move {
                                sandbox
                                    .evaluate_async("export default 1 + 1", EvalOptions::default())
                                    .await
                                    .unwrap()
                            }));
                        }
                        for handle in handles {
                            black_box(handle.await.unwrap());
                        }
                    });
                });
            },
        );
    }

    group.finish();
}

/// Benchmark the cost of an armed deadline against an unbounded call.
fn bench_limiting_mechanisms(c: &mut Criterion) {
    let sandbox = JsSandbox::new(bench_config()).unwrap();
    let code = "let n = 0\nfor (let i = 0; i < 100000; i++) n += i\nexport default n";

    let mut group = c.benchmark_group("limiting");

    group.bench_function("unbounded", |b| {
        b.iter(|| black_box(sandbox.evaluate(code, EvalOptions::default()).unwrap()));
    });

    group.bench_function("deadline_armed", |b| {
        let options = EvalOptions::from_millis(30_000);
        b.iter(|| black_box(sandbox.evaluate(code, options).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_cold_start,
    bench_execution,
    bench_filesystem,
    bench_concurrent_execution,
    bench_limiting_mechanisms,
);

criterion_main!(benches);
