use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use presence_sync::presence::{ConnectionId, PresenceHub, PresenceStats, Reconciler};
use presence_sync::store::{MemoryDurableStore, MemoryEphemeralStore, SqliteDurableStore};
use std::hint::black_box;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;

fn memory_reconciler(users: usize) -> Reconciler<MemoryEphemeralStore, MemoryDurableStore> {
    let ids: Vec<String> = (0..users).map(|i| format!("user-{}", i)).collect();
    Reconciler::new(
        Arc::new(MemoryEphemeralStore::new()),
        Arc::new(MemoryDurableStore::with_users(ids)),
        Arc::new(PresenceStats::default()),
    )
}

fn bench_reconcile_settled(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let reconciler = memory_reconciler(1);
    rt.block_on(reconciler.reconcile("user-0", true, 1)).unwrap();

    c.bench_function("reconcile_settled", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(reconciler.reconcile("user-0", true, 1).await.unwrap());
        });
    });
}

fn bench_reconcile_toggle(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let reconciler = memory_reconciler(1);

    c.bench_function("reconcile_toggle", |b| {
        b.to_async(&rt).iter(|| async {
            reconciler.reconcile("user-0", true, 1).await.unwrap();
            black_box(reconciler.reconcile("user-0", false, 2).await.unwrap());
        });
    });
}

fn bench_reconcile_sqlite(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let temp_dir = TempDir::new().unwrap();
    let durable = rt.block_on(async {
        let store = SqliteDurableStore::open(&temp_dir.path().join("bench.db"))
            .await
            .unwrap();
        store.insert_user("user-0").await.unwrap();
        store
    });
    let reconciler = Reconciler::new(
        Arc::new(MemoryEphemeralStore::new()),
        Arc::new(durable),
        Arc::new(PresenceStats::default()),
    );

    c.bench_function("reconcile_sqlite_toggle", |b| {
        b.to_async(&rt).iter(|| async {
            reconciler.reconcile("user-0", true, 1).await.unwrap();
            black_box(reconciler.reconcile("user-0", false, 2).await.unwrap());
        });
    });
}

fn bench_hub_churn(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("hub_churn");

    for users in [1usize, 16, 128] {
        let ids: Vec<String> = (0..users).map(|i| format!("user-{}", i)).collect();
        let hub = PresenceHub::new(
            Arc::new(MemoryEphemeralStore::new()),
            Arc::new(MemoryDurableStore::with_users(ids.clone())),
        );

        group.bench_with_input(BenchmarkId::from_parameter(users), &ids, |b, ids| {
            b.to_async(&rt).iter(|| async {
                let mut connections: Vec<ConnectionId> = Vec::with_capacity(ids.len());
                for id in ids {
                    let conn = hub.open_connection();
                    hub.bind(conn, id, 1).await.unwrap();
                    connections.push(conn);
                }
                for conn in connections {
                    hub.unbind(conn).await;
                }
                hub.settle().await;
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_reconcile_settled,
    bench_reconcile_toggle,
    bench_reconcile_sqlite,
    bench_hub_churn
);
criterion_main!(benches);
