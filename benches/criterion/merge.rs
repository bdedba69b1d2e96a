use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dirent_audit::{audit, AuditOptions, DiagnosticSink, MergeStream, RecordStream};
use futures::StreamExt;

/// Build `width` sorted inputs of `rows` lines each, with partially overlapping keys.
fn inputs(width: usize, rows: usize) -> Vec<String> {
    let mut rng = fastrand::Rng::with_seed(17);
    (0..width)
        .map(|source| {
            let mut names: Vec<String> = (0..rows)
                .map(|i| format!("\"dir/{:08}\"", i * width + source * rng.usize(0..2)))
                .collect();
            names.sort();
            names.dedup();
            names
                .into_iter()
                .map(|literal| format!("{} {literal}\n", rng.u32(1..100)))
                .collect()
        })
        .collect()
}

fn merge_rows(c: &mut Criterion) {
    let runtime = Arc::new(
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap(),
    );
    let options = AuditOptions::default();

    let mut group = c.benchmark_group("merge");
    for width in [2, 4, 8] {
        let data = inputs(width, 10_000);
        group.throughput(Throughput::Elements((width * 10_000) as u64));
        group.bench_with_input(BenchmarkId::new("join", width), &data, |b, data| {
            let r = runtime.clone();
            b.to_async(&*r).iter(|| async {
                let sources = data
                    .iter()
                    .enumerate()
                    .map(|(i, text)| RecordStream::new(format!("s{i}"), text.as_bytes(), &options))
                    .collect();
                let rows = MergeStream::new(sources).count().await;
                assert!(rows > 0);
            });
        });
    }
    group.finish();

    let data = inputs(2, 50_000);
    c.bench_function("audit/2x50000", |b| {
        let r = runtime.clone();
        b.to_async(&*r).iter(|| async {
            let sources = vec![
                RecordStream::new("raw", data[0].as_bytes(), &options),
                RecordStream::new("reported", data[1].as_bytes(), &options),
            ];
            let summary = audit(sources, DiagnosticSink::new(tokio::io::sink(), &options), &options)
                .await
                .unwrap();
            assert!(summary.rows > 0);
        });
    });
}

criterion_group!(benches, merge_rows);
criterion_main!(benches);
