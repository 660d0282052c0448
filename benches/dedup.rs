use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use dossier::similarity::similarity;
use dossier::storage::InMemoryCollectionStore;
use dossier::{ContentBundle, ContentHasher, DuplicateResolver, Entry, KnowledgeStoreMerger};

// Half the entries are near-duplicates of the other half.
fn corpus(n: usize) -> Vec<Entry> {
    (0..n)
        .map(|i| {
            let base = i / 2;
            let title = if i % 2 == 0 {
                format!("Senior Software Engineer {base}")
            } else {
                format!("Sr. Software Engineer {base}")
            };
            Entry::new()
                .with("title", title)
                .with("company", format!("Company {base}"))
                .with("skills", vec!["Rust", "Go"])
        })
        .collect()
}

fn bench_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("similarity");
    group.throughput(Throughput::Elements(1));
    group.bench_function("short_titles", |b| {
        b.iter(|| similarity(black_box("Senior Software Engineer"), black_box("Sr. Software Engineer")));
    });
    let long_a = "Designed and operated a multi-region storage service ".repeat(8);
    let long_b = "Designed and ran a multi region storage platform ".repeat(8);
    group.bench_function("long_descriptions", |b| {
        b.iter(|| similarity(black_box(&long_a), black_box(&long_b)));
    });
    group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
    let entry = corpus(1).remove(0);
    c.bench_function("fingerprint/entry", |b| {
        b.iter(|| ContentHasher::fingerprint(black_box(&entry)));
    });
}

fn bench_deduplicate(c: &mut Criterion) {
    let resolver = DuplicateResolver::default();
    let mut group = c.benchmark_group("deduplicate");
    for n in [16usize, 128, 512] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("n={n}"), |b| {
            b.iter_batched(|| corpus(n), |entries| resolver.deduplicate(entries), BatchSize::SmallInput);
        });
    }
    group.finish();
}

fn bench_merge_into_populated_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    group.throughput(Throughput::Elements(16));
    group.bench_function("16_into_256", |b| {
        b.iter_batched(
            || {
                let merger = KnowledgeStoreMerger::new(
                    Arc::new(InMemoryCollectionStore::new()),
                    DuplicateResolver::default(),
                );
                let seed = ContentBundle {
                    projects: corpus(512).into_iter().step_by(2).collect(),
                    ..ContentBundle::default()
                };
                merger.merge(&seed, None);
                merger
            },
            |merger| {
                let incoming = ContentBundle {
                    projects: corpus(32).into_iter().skip(1).step_by(2).collect(),
                    ..ContentBundle::default()
                };
                merger.merge(&incoming, None)
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(
    dedup,
    bench_similarity,
    bench_fingerprint,
    bench_deduplicate,
    bench_merge_into_populated_store
);
criterion_main!(dedup);
